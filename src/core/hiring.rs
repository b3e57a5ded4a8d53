use serde::{Deserialize, Serialize};

use super::engine::round_currency;
use super::error::InvalidInputError;
use super::rules::TaxYearRules;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HiringAssumptions {
    /// Employer pension contribution as a share of salary.
    pub pension_rate: f64,
    /// Benefits, equipment and overheads as a share of salary.
    pub benefits_rate: f64,
    /// One-off recruitment fee as a share of salary.
    pub recruitment_fee_rate: f64,
    pub recruitment_amortisation_years: f64,
    pub working_weeks: f64,
}

impl Default for HiringAssumptions {
    fn default() -> Self {
        Self {
            pension_rate: 0.05,
            benefits_rate: 0.10,
            recruitment_fee_rate: 0.25,
            recruitment_amortisation_years: 3.0,
            working_weeks: 48.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HiringCostComparison {
    pub full_time_salary: f64,
    pub employer_ni: f64,
    pub pension: f64,
    pub benefits: f64,
    pub amortised_recruitment: f64,
    pub full_time_cost: f64,
    pub fractional_cost: f64,
    pub annual_saving: f64,
    /// Saving as a percentage of the full-time cost; negative when fractional costs more.
    pub saving_percent: f64,
}

pub fn compare_hiring_cost(
    full_time_salary: f64,
    fractional_day_rate: f64,
    days_per_week: f64,
    rules: &TaxYearRules,
    assumptions: &HiringAssumptions,
) -> Result<HiringCostComparison, InvalidInputError> {
    if !full_time_salary.is_finite() || full_time_salary <= 0.0 {
        return Err(InvalidInputError::new(
            "fullTimeSalary",
            "must be a positive amount",
        ));
    }
    if !fractional_day_rate.is_finite() || fractional_day_rate <= 0.0 {
        return Err(InvalidInputError::new("dayRate", "must be a positive amount"));
    }
    if !days_per_week.is_finite() || days_per_week <= 0.0 || days_per_week > 7.0 {
        return Err(InvalidInputError::new(
            "daysPerWeek",
            "must be greater than 0 and at most 7",
        ));
    }
    for (field, rate) in [
        ("pensionRate", assumptions.pension_rate),
        ("benefitsRate", assumptions.benefits_rate),
        ("recruitmentFeeRate", assumptions.recruitment_fee_rate),
    ] {
        if !rate.is_finite() || rate < 0.0 {
            return Err(InvalidInputError::new(field, "must be >= 0"));
        }
    }
    if !assumptions.recruitment_amortisation_years.is_finite()
        || assumptions.recruitment_amortisation_years <= 0.0
    {
        return Err(InvalidInputError::new(
            "recruitmentAmortisationYears",
            "must be > 0",
        ));
    }
    if !assumptions.working_weeks.is_finite()
        || assumptions.working_weeks <= 0.0
        || assumptions.working_weeks > 52.0
    {
        return Err(InvalidInputError::new(
            "workingWeeks",
            "must be greater than 0 and at most 52",
        ));
    }

    let ni = &rules.national_insurance;
    let employer_ni =
        (full_time_salary - ni.employer_secondary_threshold).max(0.0) * ni.employer_rate;
    let pension = full_time_salary * assumptions.pension_rate;
    let benefits = full_time_salary * assumptions.benefits_rate;
    let amortised_recruitment = full_time_salary * assumptions.recruitment_fee_rate
        / assumptions.recruitment_amortisation_years;
    let full_time_cost = full_time_salary + employer_ni + pension + benefits + amortised_recruitment;

    let fractional_cost = fractional_day_rate * days_per_week * assumptions.working_weeks;
    let annual_saving = full_time_cost - fractional_cost;

    Ok(HiringCostComparison {
        full_time_salary: round_currency(full_time_salary),
        employer_ni: round_currency(employer_ni),
        pension: round_currency(pension),
        benefits: round_currency(benefits),
        amortised_recruitment: round_currency(amortised_recruitment),
        full_time_cost: round_currency(full_time_cost),
        fractional_cost: round_currency(fractional_cost),
        annual_saving: round_currency(annual_saving),
        saving_percent: round_currency(annual_saving / full_time_cost * 100.0),
    })
}
