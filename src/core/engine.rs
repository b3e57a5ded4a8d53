use tracing::{debug, warn};

use super::error::{ArithmeticInvariantError, CalcResult, InvalidInputError};
use super::rules::{Band, NationalInsurance, RuleTable, TaxYearRules};
use super::types::{
    ComparisonResult, EarningsInput, EmployerCostPolicy, EngineConfig, Posture, Recommendation,
    TakeHomeBreakdown,
};

const MAX_DAYS_PER_WEEK: f64 = 7.0;
const MAX_WEEKS_PER_YEAR: f64 = 52.0;

pub fn compute_gross_annual(input: &EarningsInput) -> Result<f64, InvalidInputError> {
    validate_input(input)?;
    Ok(input.day_rate * input.days_per_week * input.weeks_per_year)
}

fn validate_input(input: &EarningsInput) -> Result<(), InvalidInputError> {
    if !input.day_rate.is_finite() || input.day_rate <= 0.0 {
        return Err(InvalidInputError::new("dayRate", "must be a positive amount"));
    }
    if !input.days_per_week.is_finite()
        || input.days_per_week <= 0.0
        || input.days_per_week > MAX_DAYS_PER_WEEK
    {
        return Err(InvalidInputError::new(
            "daysPerWeek",
            "must be greater than 0 and at most 7",
        ));
    }
    if !input.weeks_per_year.is_finite()
        || input.weeks_per_year <= 0.0
        || input.weeks_per_year > MAX_WEEKS_PER_YEAR
    {
        return Err(InvalidInputError::new(
            "weeksPerYear",
            "must be greater than 0 and at most 52",
        ));
    }
    if !input.business_costs.is_finite() || input.business_costs < 0.0 {
        return Err(InvalidInputError::new("businessCosts", "must be >= 0"));
    }
    if let Some(salary) = input.director_salary {
        if !salary.is_finite() || salary < 0.0 {
            return Err(InvalidInputError::new("directorSalary", "must be >= 0"));
        }
    }
    Ok(())
}

fn validate_config(config: &EngineConfig) -> Result<(), InvalidInputError> {
    if !(0.0..=1.0).contains(&config.marginal_tolerance) {
        return Err(InvalidInputError::new(
            "marginalTolerance",
            "must be between 0 and 1",
        ));
    }
    Ok(())
}

/// Tax on `amount` under a progressive schedule, one pass over the bands.
pub fn progressive_tax(amount: f64, bands: &[Band]) -> Result<f64, ArithmeticInvariantError> {
    if !amount.is_finite() {
        return Err(ArithmeticInvariantError::NonFinite {
            label: "taxable amount",
        });
    }
    let amount = amount.max(0.0);

    let mut tax = 0.0;
    let mut floor = 0.0;
    for band in bands {
        if amount <= floor {
            break;
        }
        let ceiling = band.upper();
        tax += (amount.min(ceiling) - floor) * band.rate;
        floor = ceiling;
    }
    if amount > floor {
        return Err(ArithmeticInvariantError::UncoveredBand { income: amount });
    }
    Ok(tax)
}

/// Tax each band levies on the income slice `[from, to)`, in band order.
pub fn band_contributions(
    from: f64,
    to: f64,
    bands: &[Band],
) -> Result<Vec<f64>, ArithmeticInvariantError> {
    if !from.is_finite() || !to.is_finite() {
        return Err(ArithmeticInvariantError::NonFinite {
            label: "income slice",
        });
    }
    let from = from.max(0.0);
    let to = to.max(from);

    let mut contributions = Vec::with_capacity(bands.len());
    let mut floor = 0.0;
    for band in bands {
        let ceiling = band.upper();
        let lo = from.max(floor);
        let hi = to.min(ceiling);
        contributions.push(if hi > lo { (hi - lo) * band.rate } else { 0.0 });
        floor = ceiling;
    }
    if to > floor {
        return Err(ArithmeticInvariantError::UncoveredBand { income: to });
    }
    Ok(contributions)
}

/// Tax on the slice `[from, to)` when it is stacked on top of `from` of other income.
pub fn tax_on_slice(from: f64, to: f64, bands: &[Band]) -> Result<f64, ArithmeticInvariantError> {
    Ok(band_contributions(from, to, bands)?.iter().sum())
}

/// Personal allowance after the high-income taper, floored at zero.
pub fn tapered_personal_allowance(income: f64, rules: &TaxYearRules) -> f64 {
    let excess = (income - rules.personal_allowance_taper_threshold).max(0.0);
    (rules.personal_allowance - excess * rules.personal_allowance_taper_rate).max(0.0)
}

fn employee_ni(pay: f64, ni: &NationalInsurance) -> f64 {
    let main_band = (pay.min(ni.employee_upper_threshold) - ni.employee_primary_threshold).max(0.0);
    let upper_band = (pay - ni.employee_upper_threshold).max(0.0);
    main_band * ni.employee_rate + upper_band * ni.employee_upper_rate
}

fn employer_ni(pay: f64, ni: &NationalInsurance) -> f64 {
    (pay - ni.employer_secondary_threshold).max(0.0) * ni.employer_rate
}

fn apprenticeship_levy(pay: f64, rules: &TaxYearRules) -> f64 {
    (pay - rules.apprenticeship_levy_threshold).max(0.0) * rules.apprenticeship_levy_rate
}

fn ensure_valid_net(posture: Posture, net: f64) -> Result<f64, ArithmeticInvariantError> {
    if !net.is_finite() {
        return Err(ArithmeticInvariantError::NonFinite {
            label: posture.label(),
        });
    }
    if net < 0.0 {
        warn!(posture = posture.label(), net, "negative net take-home");
        return Err(ArithmeticInvariantError::NegativeNet {
            posture: posture.label(),
            value: net,
        });
    }
    Ok(net)
}

/// Deemed employment: the whole gross is treated as PAYE salary.
pub(crate) fn simulate_inside(
    gross: f64,
    rules: &TaxYearRules,
    policy: EmployerCostPolicy,
) -> CalcResult<TakeHomeBreakdown> {
    let ni = &rules.national_insurance;

    let allowance = tapered_personal_allowance(gross, rules);
    let taxable_income = (gross - allowance).max(0.0);
    let income_tax = progressive_tax(taxable_income, &rules.income_tax_bands)?;
    let employee_ni = employee_ni(gross, ni);
    let employer_ni = employer_ni(gross, ni);
    let apprenticeship_levy = apprenticeship_levy(gross, rules);

    let employer_costs = match policy {
        EmployerCostPolicy::ContractorBorne => employer_ni + apprenticeship_levy,
        EmployerCostPolicy::ClientBorne => 0.0,
    };
    let net_annual = ensure_valid_net(
        Posture::Inside,
        gross - income_tax - employee_ni - employer_costs,
    )?;

    Ok(TakeHomeBreakdown {
        gross_annual: gross,
        taxable_income,
        salary: gross,
        income_tax,
        employee_ni,
        employer_ni,
        apprenticeship_levy,
        net_annual,
        ..TakeHomeBreakdown::default()
    })
}

/// Largest salary up to `target` whose cost, including employer NI, fits in `available`.
fn affordable_salary(target: f64, available: f64, ni: &NationalInsurance) -> f64 {
    let target = target.max(0.0);
    if target + employer_ni(target, ni) <= available {
        return target;
    }
    let threshold = ni.employer_secondary_threshold;
    if available <= threshold {
        available
    } else {
        (available + ni.employer_rate * threshold) / (1.0 + ni.employer_rate)
    }
}

/// Personal service company: a director salary, the rest extracted as dividends.
pub(crate) fn simulate_outside(
    gross: f64,
    input: &EarningsInput,
    rules: &TaxYearRules,
) -> CalcResult<TakeHomeBreakdown> {
    let ni = &rules.national_insurance;

    let available = gross - input.business_costs;
    if available < 0.0 {
        return Err(InvalidInputError::new(
            "businessCosts",
            "cannot exceed gross annual revenue",
        )
        .into());
    }

    let target_salary = input.director_salary.unwrap_or(rules.personal_allowance);
    let salary = affordable_salary(target_salary, available, ni);
    let employer_ni = employer_ni(salary, ni);

    let company_profit = (available - salary - employer_ni).max(0.0);
    let corporation_tax = progressive_tax(company_profit, &rules.corporation_tax_bands)?;
    let dividends = company_profit - corporation_tax;

    // Allowance is spent on salary first; dividends sit on top of salary in the bands.
    let allowance = tapered_personal_allowance(salary + dividends, rules);
    let salary_taxable = (salary - allowance).max(0.0);
    let allowance_left = (allowance - salary).max(0.0);
    let income_tax = progressive_tax(salary_taxable, &rules.income_tax_bands)?;
    let employee_ni = employee_ni(salary, ni);

    let dividends_taxable = (dividends - allowance_left).max(0.0);
    let allowance_used = dividends_taxable.min(rules.dividend_allowance);
    let dividend_tax = tax_on_slice(
        salary_taxable + allowance_used,
        salary_taxable + dividends_taxable,
        &rules.dividend_tax_bands,
    )?;

    let net_annual = ensure_valid_net(
        Posture::Outside,
        salary - income_tax - employee_ni + dividends - dividend_tax,
    )?;

    Ok(TakeHomeBreakdown {
        gross_annual: gross,
        taxable_income: salary_taxable + dividends_taxable,
        salary,
        company_profit,
        income_tax,
        employee_ni,
        employer_ni,
        corporation_tax,
        dividends,
        dividend_tax,
        net_annual,
        ..TakeHomeBreakdown::default()
    })
}

/// Unrounded net take-home for one posture.
pub(crate) fn net_annual_for(
    posture: Posture,
    input: &EarningsInput,
    table: &RuleTable,
    config: &EngineConfig,
) -> CalcResult<f64> {
    let gross = compute_gross_annual(input)?;
    let rules = table.get_rules(input.tax_year)?;
    let breakdown = match posture {
        Posture::Inside => simulate_inside(gross, rules, config.employer_cost_policy)?,
        Posture::Outside => simulate_outside(gross, input, rules)?,
    };
    Ok(breakdown.net_annual)
}

pub fn compare(
    input: &EarningsInput,
    table: &RuleTable,
    config: &EngineConfig,
) -> CalcResult<ComparisonResult> {
    validate_config(config)?;
    let gross = compute_gross_annual(input)?;
    let rules = table.get_rules(input.tax_year)?;

    let inside = simulate_inside(gross, rules, config.employer_cost_policy)?;
    let outside = simulate_outside(gross, input, rules)?;

    let annual_difference = outside.net_annual - inside.net_annual;
    let recommendation = classify(annual_difference, gross, config.marginal_tolerance);

    debug!(
        tax_year = %input.tax_year,
        gross,
        inside_net = inside.net_annual,
        outside_net = outside.net_annual,
        ?recommendation,
        "compared IR35 postures"
    );

    let inside_ir35 = finalize(inside);
    let outside_ir35 = finalize(outside);
    // Taken from the rounded nets, so the reported difference equals their difference.
    let displayed_difference = outside_ir35.net_annual - inside_ir35.net_annual;
    let percentage_saved = if inside_ir35.net_annual > 0.0 {
        displayed_difference / inside_ir35.net_annual
    } else {
        0.0
    };

    Ok(ComparisonResult {
        tax_year: input.tax_year,
        gross_annual: round_currency(gross),
        inside_ir35,
        outside_ir35,
        annual_difference: round_currency(displayed_difference),
        percentage_saved: round_rate(percentage_saved),
        recommendation,
        employer_cost_policy: config.employer_cost_policy,
        assumptions: assumptions(config.employer_cost_policy, input, &outside),
    })
}

fn classify(difference: f64, gross: f64, tolerance: f64) -> Recommendation {
    if difference.abs() < tolerance * gross {
        Recommendation::Marginal
    } else if difference > 0.0 {
        Recommendation::Outside
    } else {
        Recommendation::Inside
    }
}

fn assumptions(
    policy: EmployerCostPolicy,
    input: &EarningsInput,
    outside: &TakeHomeBreakdown,
) -> Vec<String> {
    let employer_costs = match policy {
        EmployerCostPolicy::ContractorBorne => {
            "Inside IR35, employer NI and the apprenticeship levy are borne by the contractor \
             and deducted from take-home pay."
        }
        EmployerCostPolicy::ClientBorne => {
            "Inside IR35, employer NI and the apprenticeship levy are shown but borne by the \
             client, so they are not deducted from take-home pay."
        }
    };
    vec![
        employer_costs.to_string(),
        format!(
            "Outside IR35, the director takes a salary of £{:.2} and extracts the remaining \
             profit as dividends.",
            outside.salary
        ),
        format!(
            "Allowable business costs of £{:.2} are deducted before corporation tax.",
            input.business_costs
        ),
        "The apprenticeship levy is not charged on the personal service company payroll."
            .to_string(),
        "Pension contributions, student loans and Scottish income tax rates are not modelled."
            .to_string(),
    ]
}

/// Nearest penny. Adding zero folds `-0.0` into `0.0`.
pub(crate) fn round_currency(value: f64) -> f64 {
    (value * 100.0).round() / 100.0 + 0.0
}

pub(crate) fn round_rate(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0 + 0.0
}

/// Derives monthly and rate fields, then rounds every field for display.
fn finalize(breakdown: TakeHomeBreakdown) -> TakeHomeBreakdown {
    let effective_tax_rate = if breakdown.gross_annual > 0.0 {
        (1.0 - breakdown.net_annual / breakdown.gross_annual).clamp(0.0, 1.0)
    } else {
        0.0
    };
    TakeHomeBreakdown {
        gross_annual: round_currency(breakdown.gross_annual),
        taxable_income: round_currency(breakdown.taxable_income),
        salary: round_currency(breakdown.salary),
        company_profit: round_currency(breakdown.company_profit),
        income_tax: round_currency(breakdown.income_tax),
        employee_ni: round_currency(breakdown.employee_ni),
        employer_ni: round_currency(breakdown.employer_ni),
        apprenticeship_levy: round_currency(breakdown.apprenticeship_levy),
        corporation_tax: round_currency(breakdown.corporation_tax),
        dividends: round_currency(breakdown.dividends),
        dividend_tax: round_currency(breakdown.dividend_tax),
        net_annual: round_currency(breakdown.net_annual),
        net_monthly: round_currency(breakdown.net_annual / 12.0),
        effective_tax_rate: round_rate(effective_tax_rate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{CalcError, ConfigurationError};
    use crate::core::rules::TaxYear;
    use proptest::prelude::{any, prop_assert, prop_assume, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn table() -> RuleTable {
        RuleTable::builtin().expect("builtin rules are valid")
    }

    fn rules_2025() -> TaxYearRules {
        table()
            .get_rules(TaxYear::new(2025))
            .expect("2025-26 is built in")
            .clone()
    }

    fn sample_input(day_rate: f64, days_per_week: f64, weeks_per_year: f64) -> EarningsInput {
        EarningsInput::new(day_rate, days_per_week, weeks_per_year, TaxYear::new(2025))
    }

    fn breakdown_fields(b: &TakeHomeBreakdown) -> [(&'static str, f64); 14] {
        [
            ("gross_annual", b.gross_annual),
            ("taxable_income", b.taxable_income),
            ("salary", b.salary),
            ("company_profit", b.company_profit),
            ("income_tax", b.income_tax),
            ("employee_ni", b.employee_ni),
            ("employer_ni", b.employer_ni),
            ("apprenticeship_levy", b.apprenticeship_levy),
            ("corporation_tax", b.corporation_tax),
            ("dividends", b.dividends),
            ("dividend_tax", b.dividend_tax),
            ("net_annual", b.net_annual),
            ("net_monthly", b.net_monthly),
            ("effective_tax_rate", b.effective_tax_rate),
        ]
    }

    fn has_two_decimals(value: f64) -> bool {
        let cents = value * 100.0;
        (cents - cents.round()).abs() <= 1e-6
    }

    #[test]
    fn gross_annual_multiplies_rate_by_pattern() {
        let gross = compute_gross_annual(&sample_input(500.0, 5.0, 46.0)).expect("valid input");
        assert_approx(gross, 115_000.0);

        let gross = compute_gross_annual(&sample_input(1_200.0, 2.0, 46.0)).expect("valid input");
        assert_approx(gross, 110_400.0);
    }

    #[test]
    fn gross_annual_rejects_bad_fields_by_name() {
        for (input, field) in [
            (sample_input(0.0, 5.0, 46.0), "dayRate"),
            (sample_input(-1.0, 5.0, 46.0), "dayRate"),
            (sample_input(f64::NAN, 5.0, 46.0), "dayRate"),
            (sample_input(500.0, 0.0, 46.0), "daysPerWeek"),
            (sample_input(500.0, 7.5, 46.0), "daysPerWeek"),
            (sample_input(500.0, 5.0, 0.0), "weeksPerYear"),
            (sample_input(500.0, 5.0, 52.5), "weeksPerYear"),
            (sample_input(500.0, 5.0, f64::INFINITY), "weeksPerYear"),
        ] {
            let err = compute_gross_annual(&input).expect_err("must reject input");
            assert_eq!(err.field, field);
        }

        let mut input = sample_input(500.0, 5.0, 46.0);
        input.business_costs = -10.0;
        assert_eq!(
            compute_gross_annual(&input).expect_err("negative costs").field,
            "businessCosts"
        );

        let mut input = sample_input(500.0, 5.0, 46.0);
        input.director_salary = Some(f64::NAN);
        assert_eq!(
            compute_gross_annual(&input).expect_err("nan salary").field,
            "directorSalary"
        );
    }

    #[test]
    fn gross_annual_accepts_upper_bounds() {
        let gross = compute_gross_annual(&sample_input(100.0, 7.0, 52.0)).expect("valid input");
        assert_approx(gross, 36_400.0);
    }

    #[test]
    fn income_tax_at_band_edge_taxes_only_the_marginal_slice() {
        let rules = rules_2025();
        let at_edge = progressive_tax(37_700.0, &rules.income_tax_bands).expect("covered");
        assert_approx(at_edge, 7_540.0);

        let above_edge = progressive_tax(37_701.0, &rules.income_tax_bands).expect("covered");
        assert_approx(above_edge, 7_540.4);

        let at_additional = progressive_tax(125_140.0, &rules.income_tax_bands).expect("covered");
        assert_approx(at_additional, 7_540.0 + 87_440.0 * 0.40);
        let above_additional =
            progressive_tax(125_141.0, &rules.income_tax_bands).expect("covered");
        assert_approx(above_additional - at_additional, 0.45);
    }

    #[test]
    fn progressive_tax_is_zero_for_non_positive_income() {
        let rules = rules_2025();
        assert_eq!(progressive_tax(0.0, &rules.income_tax_bands), Ok(0.0));
        assert_eq!(progressive_tax(-5_000.0, &rules.income_tax_bands), Ok(0.0));
    }

    #[test]
    fn progressive_tax_reports_uncovered_income() {
        let bands = [Band::capped(10_000.0, 0.1)];
        assert_approx(progressive_tax(10_000.0, &bands).expect("covered"), 1_000.0);
        assert_eq!(
            progressive_tax(10_001.0, &bands),
            Err(ArithmeticInvariantError::UncoveredBand { income: 10_001.0 })
        );
        assert!(band_contributions(0.0, 10_001.0, &bands).is_err());
        assert!(matches!(
            progressive_tax(f64::NAN, &bands),
            Err(ArithmeticInvariantError::NonFinite { .. })
        ));
    }

    #[test]
    fn corporation_tax_bands_reproduce_marginal_relief() {
        let rules = rules_2025();
        let bands = &rules.corporation_tax_bands;
        assert_approx(progressive_tax(50_000.0, bands).expect("covered"), 9_500.0);
        assert_approx(progressive_tax(100_000.0, bands).expect("covered"), 22_750.0);
        assert_approx(progressive_tax(250_000.0, bands).expect("covered"), 62_500.0);
        assert_approx(progressive_tax(300_000.0, bands).expect("covered"), 75_000.0);
    }

    #[test]
    fn allowance_taper_withdraws_one_pound_per_two() {
        let rules = rules_2025();
        assert_approx(tapered_personal_allowance(90_000.0, &rules), 12_570.0);
        assert_approx(tapered_personal_allowance(100_000.0, &rules), 12_570.0);
        assert_approx(tapered_personal_allowance(110_000.0, &rules), 7_570.0);
        assert_approx(tapered_personal_allowance(125_140.0, &rules), 0.0);
        assert_approx(tapered_personal_allowance(400_000.0, &rules), 0.0);
    }

    #[test]
    fn allowance_taper_midpoint_halves_the_allowance() {
        let rules = rules_2025();
        let midpoint = rules.personal_allowance_taper_threshold + rules.personal_allowance;
        assert_approx(
            tapered_personal_allowance(midpoint, &rules),
            rules.personal_allowance / 2.0,
        );
    }

    #[test]
    fn employee_ni_uses_main_and_upper_rates() {
        let rules = rules_2025();
        let ni = &rules.national_insurance;
        assert_approx(employee_ni(12_000.0, ni), 0.0);
        assert_approx(employee_ni(30_000.0, ni), (30_000.0 - 12_570.0) * 0.08);
        assert_approx(employee_ni(60_000.0, ni), 3_016.0 + 9_730.0 * 0.02);
    }

    #[test]
    fn oracle_inside_ir35_at_115k_matches_hand_calculation() {
        // Allowance 12,570 - (115,000 - 100,000) / 2 = 5,070; taxable 109,930.
        // Income tax: 37,700 @ 20% + 72,230 @ 40% = 36,432.
        // Employee NI: 37,700 @ 8% + 64,730 @ 2% = 4,310.60.
        // Employer NI: (115,000 - 5,000) @ 15% = 16,500; levy 0.5% = 575.
        let rules = rules_2025();
        let inside =
            simulate_inside(115_000.0, &rules, EmployerCostPolicy::ContractorBorne).expect("ok");
        assert_approx(inside.taxable_income, 109_930.0);
        assert_approx(inside.income_tax, 36_432.0);
        assert_approx(inside.employee_ni, 4_310.6);
        assert_approx(inside.employer_ni, 16_500.0);
        assert_approx(inside.apprenticeship_levy, 575.0);
        assert_approx(inside.net_annual, 57_182.4);

        let client_borne =
            simulate_inside(115_000.0, &rules, EmployerCostPolicy::ClientBorne).expect("ok");
        assert_approx(client_borne.employer_ni, 16_500.0);
        assert_approx(client_borne.net_annual, 74_257.4);
    }

    #[test]
    fn oracle_outside_ir35_at_115k_matches_hand_calculation() {
        // Salary 12,570; employer NI (12,570 - 5,000) @ 15% = 1,135.50.
        // Profit 101,294.50; corporation tax 9,500 + 51,294.50 @ 26.5% = 23,093.0425.
        // Dividends 78,201.4575; 500 allowance, then 37,200 @ 8.75% + 40,501.4575 @ 33.75%.
        let rules = rules_2025();
        let input = sample_input(500.0, 5.0, 46.0);
        let outside = simulate_outside(115_000.0, &input, &rules).expect("ok");
        assert_approx(outside.salary, 12_570.0);
        assert_approx(outside.employer_ni, 1_135.5);
        assert_approx(outside.company_profit, 101_294.5);
        assert_approx(outside.corporation_tax, 23_093.0425);
        assert_approx(outside.dividends, 78_201.4575);
        assert_approx(outside.income_tax, 0.0);
        assert_approx(outside.employee_ni, 0.0);
        assert_approx(outside.dividend_tax, 3_255.0 + 13_669.241_906_25);
        assert_approx(outside.net_annual, 73_847.215_593_75);
    }

    #[test]
    fn dividends_stack_on_top_of_salary_income() {
        // A salary at the basic rate limit fills the basic band, so every taxable
        // dividend above the allowance lands in the higher band.
        let rules = rules_2025();
        let mut input = sample_input(500.0, 5.0, 40.0);
        input.director_salary = Some(50_270.0);
        let outside = simulate_outside(100_000.0, &input, &rules).expect("ok");

        assert_approx(outside.employer_ni, 6_790.5);
        assert_approx(outside.company_profit, 42_939.5);
        assert_approx(outside.corporation_tax, 8_158.505);
        assert_approx(outside.income_tax, 7_540.0);
        assert_approx(outside.employee_ni, 3_016.0);
        assert_approx(outside.dividend_tax, (outside.dividends - 500.0) * 0.3375);
    }

    #[test]
    fn unused_personal_allowance_shelters_dividends() {
        let rules = rules_2025();
        let mut input = sample_input(500.0, 5.0, 40.0);
        input.director_salary = Some(0.0);
        let outside = simulate_outside(40_000.0, &input, &rules).expect("ok");

        // Profit 40,000 @ 19% leaves 32,400 of dividends; 12,570 is covered by the
        // personal allowance, 500 by the dividend allowance, the rest at 8.75%.
        assert_approx(outside.salary, 0.0);
        assert_approx(outside.dividends, 32_400.0);
        assert_approx(outside.dividend_tax, (32_400.0 - 12_570.0 - 500.0) * 0.0875);
    }

    #[test]
    fn small_revenue_caps_director_salary() {
        let rules = rules_2025();
        let input = sample_input(100.0, 1.0, 40.0);

        let outside = simulate_outside(4_000.0, &input, &rules).expect("ok");
        assert_approx(outside.salary, 4_000.0);
        assert_approx(outside.employer_ni, 0.0);
        assert_approx(outside.company_profit, 0.0);
        assert_approx(outside.net_annual, 4_000.0);

        let outside = simulate_outside(10_000.0, &input, &rules).expect("ok");
        assert_approx(outside.salary + outside.employer_ni, 10_000.0);
        assert!(outside.company_profit.abs() <= EPS);
    }

    #[test]
    fn business_costs_reduce_profit_and_cannot_exceed_gross() {
        let rules = rules_2025();
        let mut input = sample_input(500.0, 5.0, 46.0);
        let base = simulate_outside(115_000.0, &input, &rules).expect("ok");

        input.business_costs = 3_000.0;
        let with_costs = simulate_outside(115_000.0, &input, &rules).expect("ok");
        assert_approx(base.company_profit - with_costs.company_profit, 3_000.0);
        assert!(with_costs.net_annual < base.net_annual);

        input.business_costs = 120_000.0;
        let err = simulate_outside(115_000.0, &input, &rules).expect_err("costs exceed gross");
        assert!(matches!(
            err,
            CalcError::InvalidInput(InvalidInputError {
                field: "businessCosts",
                ..
            })
        ));
    }

    #[test]
    fn broken_rule_set_surfaces_negative_net_instead_of_clamping() {
        let mut rules = rules_2025();
        rules.income_tax_bands = vec![Band::open(0.9)];
        rules.national_insurance.employer_rate = 0.5;
        let err = simulate_inside(200_000.0, &rules, EmployerCostPolicy::ContractorBorne)
            .expect_err("net must go negative");
        assert!(matches!(
            err,
            CalcError::Invariant(ArithmeticInvariantError::NegativeNet {
                posture: "insideIR35",
                ..
            })
        ));
    }

    #[test]
    fn annual_difference_matches_displayed_nets() {
        let result = compare(
            &sample_input(300.49, 3.0, 44.0),
            &table(),
            &EngineConfig::default(),
        )
        .expect("valid comparison");

        let shown = result.outside_ir35.net_annual - result.inside_ir35.net_annual;
        assert_eq!(result.annual_difference, round_currency(shown));
    }

    #[test]
    fn currency_rounding_never_yields_negative_zero() {
        let rounded = round_currency(-0.001);
        assert_eq!(rounded, 0.0);
        assert!(rounded.is_sign_positive());
    }

    #[test]
    fn compare_rounds_and_recommends_outside_at_115k() {
        let result = compare(
            &sample_input(500.0, 5.0, 46.0),
            &table(),
            &EngineConfig::default(),
        )
        .expect("valid comparison");

        assert_eq!(result.tax_year, TaxYear::new(2025));
        assert_eq!(result.gross_annual, 115_000.0);
        assert_eq!(result.inside_ir35.net_annual, 57_182.4);
        assert_eq!(result.outside_ir35.net_annual, 73_847.22);
        assert_eq!(result.outside_ir35.corporation_tax, 23_093.04);
        assert_eq!(result.annual_difference, 16_664.82);
        assert_eq!(result.percentage_saved, 0.2914);
        assert_eq!(result.inside_ir35.net_monthly, 4_765.2);
        assert_eq!(result.inside_ir35.effective_tax_rate, 0.5028);
        assert!(result.inside_ir35.net_annual < result.outside_ir35.net_annual);
        assert_eq!(result.recommendation, Recommendation::Outside);
        assert_eq!(
            result.employer_cost_policy,
            EmployerCostPolicy::ContractorBorne
        );
        assert!(result.assumptions[0].contains("borne by the contractor"));
        assert!(result.assumptions[1].contains("£12570.00"));
    }

    #[test]
    fn compare_fractional_ciso_default_is_finite_and_below_gross() {
        let result = compare(
            &sample_input(1_200.0, 2.0, 46.0),
            &table(),
            &EngineConfig::default(),
        )
        .expect("valid comparison");
        assert_eq!(result.gross_annual, 110_400.0);
        for breakdown in [&result.inside_ir35, &result.outside_ir35] {
            assert!(breakdown.net_annual.is_finite());
            assert!(breakdown.net_annual > 0.0);
            assert!(breakdown.net_annual < result.gross_annual);
        }
    }

    #[test]
    fn compare_rejects_unsupported_year() {
        let mut input = sample_input(500.0, 5.0, 46.0);
        input.tax_year = TaxYear::new(2010);
        let err = compare(&input, &table(), &EngineConfig::default()).expect_err("unsupported");
        assert_eq!(
            err,
            CalcError::Configuration(ConfigurationError::UnsupportedTaxYear(TaxYear::new(2010)))
        );
    }

    #[test]
    fn compare_rejects_out_of_range_tolerance() {
        let config = EngineConfig {
            marginal_tolerance: 1.5,
            ..EngineConfig::default()
        };
        let err = compare(&sample_input(500.0, 5.0, 46.0), &table(), &config)
            .expect_err("bad tolerance");
        assert!(err.to_string().contains("marginalTolerance"));
    }

    #[test]
    fn classify_uses_share_of_gross_as_tolerance() {
        assert_eq!(classify(1_999.0, 100_000.0, 0.02), Recommendation::Marginal);
        assert_eq!(classify(-1_999.0, 100_000.0, 0.02), Recommendation::Marginal);
        assert_eq!(classify(2_000.0, 100_000.0, 0.02), Recommendation::Outside);
        assert_eq!(classify(-2_000.0, 100_000.0, 0.02), Recommendation::Inside);
        assert_eq!(classify(0.0, 100_000.0, 0.0), Recommendation::Inside);
    }

    #[test]
    fn client_borne_policy_narrows_the_gap() {
        let input = sample_input(500.0, 5.0, 46.0);
        let contractor = compare(&input, &table(), &EngineConfig::default()).expect("ok");
        let client = compare(
            &input,
            &table(),
            &EngineConfig {
                employer_cost_policy: EmployerCostPolicy::ClientBorne,
                ..EngineConfig::default()
            },
        )
        .expect("ok");
        assert!(client.annual_difference < contractor.annual_difference);
        assert_eq!(client.outside_ir35, contractor.outside_ir35);
        assert!(client.assumptions[0].contains("borne by the client"));
    }

    #[test]
    fn later_tax_years_raise_dividend_tax() {
        let mut input = sample_input(500.0, 5.0, 46.0);
        let y2025 = compare(&input, &table(), &EngineConfig::default()).expect("ok");
        input.tax_year = TaxYear::new(2026);
        let y2026 = compare(&input, &table(), &EngineConfig::default()).expect("ok");
        assert!(y2026.outside_ir35.dividend_tax > y2025.outside_ir35.dividend_tax);
        assert_eq!(y2026.inside_ir35, y2025.inside_ir35);
    }

    #[test]
    fn comparison_serializes_with_display_keys() {
        let result = compare(
            &sample_input(500.0, 5.0, 46.0),
            &table(),
            &EngineConfig::default(),
        )
        .expect("valid comparison");
        let json = serde_json::to_string(&result).expect("result should serialize");
        assert!(json.contains("\"taxYear\":\"2025-26\""));
        assert!(json.contains("\"insideIR35\""));
        assert!(json.contains("\"outsideIR35\""));
        assert!(json.contains("\"annualDifference\""));
        assert!(json.contains("\"recommendation\":\"outside\""));
        assert!(json.contains("\"employerCostPolicy\":\"contractor-borne\""));
        assert!(json.contains("\"netMonthly\""));
        assert!(json.contains("\"effectiveTaxRate\""));
        assert!(json.contains("\"employeeNI\""));
        assert!(json.contains("\"employerNI\""));
    }

    #[test]
    fn compare_is_idempotent() {
        let input = sample_input(875.0, 3.5, 44.0);
        let a = compare(&input, &table(), &EngineConfig::default()).expect("ok");
        let b = compare(&input, &table(), &EngineConfig::default()).expect("ok");
        assert_eq!(a, b);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_net_is_non_decreasing_in_day_rate(
            day_rate in 50u32..3_000,
            step in 1u32..500,
            days_half in 1u32..15,
            weeks in 10u32..53,
        ) {
            let table = table();
            let config = EngineConfig::default();
            let days = days_half as f64 / 2.0;
            let low = compare(&sample_input(day_rate as f64, days, weeks as f64), &table, &config)
                .expect("low rate compares");
            let high = compare(
                &sample_input((day_rate + step) as f64, days, weeks as f64),
                &table,
                &config,
            )
            .expect("high rate compares");

            prop_assert!(high.inside_ir35.net_annual >= low.inside_ir35.net_annual);
            prop_assert!(high.outside_ir35.net_annual >= low.outside_ir35.net_annual);
        }

        #[test]
        fn prop_band_contributions_sum_to_single_pass_tax(amount in 0.0f64..600_000.0) {
            let rules = rules_2025();
            for bands in [
                &rules.income_tax_bands,
                &rules.corporation_tax_bands,
                &rules.dividend_tax_bands,
            ] {
                let single_pass = progressive_tax(amount, bands).expect("covered");
                let by_band: f64 = band_contributions(0.0, amount, bands)
                    .expect("covered")
                    .iter()
                    .sum();
                prop_assert!((single_pass - by_band).abs() <= 1e-6);
            }
        }

        #[test]
        fn prop_stacked_slices_add_up(
            a in 0.0f64..200_000.0,
            b in 0.0f64..200_000.0,
            c in 0.0f64..200_000.0,
        ) {
            let mut points = [a, b, c];
            points.sort_by(|x, y| x.total_cmp(y));
            let [lo, mid, hi] = points;
            let bands = rules_2025().dividend_tax_bands;
            let whole = tax_on_slice(lo, hi, &bands).expect("covered");
            let parts = tax_on_slice(lo, mid, &bands).expect("covered")
                + tax_on_slice(mid, hi, &bands).expect("covered");
            prop_assert!((whole - parts).abs() <= 1e-6);
        }

        #[test]
        fn prop_breakdowns_are_non_negative_and_rounded(
            day_rate in 1u32..5_000,
            days_half in 1u32..15,
            weeks in 1u32..53,
            costs in 0u32..20_000,
            client_borne in any::<bool>(),
        ) {
            let mut input = sample_input(day_rate as f64, days_half as f64 / 2.0, weeks as f64);
            input.business_costs = costs as f64;
            let gross = compute_gross_annual(&input).expect("valid input");
            prop_assume!(input.business_costs <= gross);

            let config = EngineConfig {
                employer_cost_policy: if client_borne {
                    EmployerCostPolicy::ClientBorne
                } else {
                    EmployerCostPolicy::ContractorBorne
                },
                ..EngineConfig::default()
            };
            let result = compare(&input, &table(), &config).expect("valid comparison");

            prop_assert!(has_two_decimals(result.gross_annual));
            prop_assert!(has_two_decimals(result.annual_difference));
            let shown = result.outside_ir35.net_annual - result.inside_ir35.net_annual;
            prop_assert!(
                (result.annual_difference - shown).abs() < 0.005,
                "annual difference {} does not match displayed nets ({})",
                result.annual_difference,
                shown
            );
            for breakdown in [&result.inside_ir35, &result.outside_ir35] {
                for (label, value) in breakdown_fields(breakdown) {
                    prop_assert!(value.is_finite(), "{} must be finite", label);
                    prop_assert!(value >= 0.0, "{} must be non-negative, got {}", label, value);
                    if label != "effective_tax_rate" {
                        prop_assert!(has_two_decimals(value), "{} has more than 2 d.p.", label);
                    }
                }
                prop_assert!(breakdown.effective_tax_rate <= 1.0);
                prop_assert!(breakdown.net_annual <= result.gross_annual);
            }
        }
    }
}
