use serde::{Deserialize, Serialize};

use super::rules::TaxYear;

pub const DEFAULT_DAYS_PER_WEEK: f64 = 5.0;
pub const DEFAULT_WEEKS_PER_YEAR: f64 = 46.5;
pub const DEFAULT_MARGINAL_TOLERANCE: f64 = 0.02;

/// Who carries employer NI and the apprenticeship levy under deemed employment.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmployerCostPolicy {
    /// Deducted from the contractor's net: the fee payer prices them into the rate.
    #[default]
    ContractorBorne,
    /// Reported for transparency but not deducted from net.
    ClientBorne,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Posture {
    Inside,
    Outside,
}

impl Posture {
    pub fn label(self) -> &'static str {
        match self {
            Posture::Inside => "insideIR35",
            Posture::Outside => "outsideIR35",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Inside,
    Outside,
    Marginal,
}

/// One calculation request. Built fresh per request and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct EarningsInput {
    pub day_rate: f64,
    pub days_per_week: f64,
    pub weeks_per_year: f64,
    pub tax_year: TaxYear,
    /// Allowable company expenses on the outside route.
    pub business_costs: f64,
    /// Director salary on the outside route; `None` uses the year's personal allowance.
    pub director_salary: Option<f64>,
}

impl EarningsInput {
    pub fn new(day_rate: f64, days_per_week: f64, weeks_per_year: f64, tax_year: TaxYear) -> Self {
        Self {
            day_rate,
            days_per_week,
            weeks_per_year,
            tax_year,
            business_costs: 0.0,
            director_salary: None,
        }
    }
}

/// Modelling knobs that are policy, not law.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub employer_cost_policy: EmployerCostPolicy,
    /// Share of gross under which the two nets count as equivalent.
    pub marginal_tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            employer_cost_policy: EmployerCostPolicy::default(),
            marginal_tolerance: DEFAULT_MARGINAL_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TakeHomeBreakdown {
    pub gross_annual: f64,
    pub taxable_income: f64,
    pub salary: f64,
    pub company_profit: f64,
    pub income_tax: f64,
    #[serde(rename = "employeeNI")]
    pub employee_ni: f64,
    #[serde(rename = "employerNI")]
    pub employer_ni: f64,
    pub apprenticeship_levy: f64,
    pub corporation_tax: f64,
    pub dividends: f64,
    pub dividend_tax: f64,
    pub net_annual: f64,
    pub net_monthly: f64,
    pub effective_tax_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub tax_year: TaxYear,
    pub gross_annual: f64,
    #[serde(rename = "insideIR35")]
    pub inside_ir35: TakeHomeBreakdown,
    #[serde(rename = "outsideIR35")]
    pub outside_ir35: TakeHomeBreakdown,
    pub annual_difference: f64,
    /// `annual_difference` over the inside net, as a fraction. Negative when inside pays more.
    pub percentage_saved: f64,
    pub recommendation: Recommendation,
    pub employer_cost_policy: EmployerCostPolicy,
    pub assumptions: Vec<String>,
}
