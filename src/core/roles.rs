use serde::Serialize;

use super::engine::round_currency;
use super::error::InvalidInputError;

/// UK market figures for a fractional executive role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleProfile {
    pub key: &'static str,
    pub label: &'static str,
    pub avg_day_rate: f64,
    pub min_day_rate: f64,
    pub max_day_rate: f64,
    pub avg_salary: f64,
}

const fn role(
    key: &'static str,
    label: &'static str,
    avg_day_rate: f64,
    avg_salary: f64,
    min_day_rate: f64,
    max_day_rate: f64,
) -> RoleProfile {
    RoleProfile {
        key,
        label,
        avg_day_rate,
        min_day_rate,
        max_day_rate,
        avg_salary,
    }
}

pub const ROLES: &[RoleProfile] = &[
    role("cmo", "CMO", 950.0, 130_000.0, 700.0, 1_400.0),
    role("cfo", "CFO", 1_050.0, 145_000.0, 800.0, 1_500.0),
    role("cto", "CTO", 1_100.0, 155_000.0, 850.0, 1_600.0),
    role("coo", "COO", 950.0, 140_000.0, 750.0, 1_400.0),
    role("ciso", "CISO", 1_150.0, 150_000.0, 900.0, 1_600.0),
    role("chro", "CHRO", 850.0, 125_000.0, 650.0, 1_200.0),
    role("cpo", "CPO", 1_000.0, 145_000.0, 800.0, 1_400.0),
    role("ceo", "CEO", 1_200.0, 180_000.0, 900.0, 1_800.0),
    role("cco", "CCO", 1_000.0, 140_000.0, 800.0, 1_200.0),
];

/// Case-insensitive lookup by key (`"cfo"`) or label (`"CFO"`).
pub fn find_role(key: &str) -> Option<&'static RoleProfile> {
    let key = key.trim();
    ROLES
        .iter()
        .find(|r| r.key.eq_ignore_ascii_case(key) || r.label.eq_ignore_ascii_case(key))
}

/// An explicit day rate wins; otherwise the named role's average seeds it.
pub fn resolve_day_rate(day_rate: Option<f64>, role: Option<&str>) -> Result<f64, InvalidInputError> {
    match (day_rate, role) {
        (Some(rate), _) => Ok(rate),
        (None, Some(key)) => find_role(key)
            .map(|r| r.avg_day_rate)
            .ok_or_else(|| InvalidInputError::new("role", format!("'{key}' is not a known role"))),
        (None, None) => Err(InvalidInputError::new(
            "dayRate",
            "is required unless a role is given",
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioProjection {
    pub weekly: f64,
    pub monthly: f64,
    pub annual: f64,
}

/// Gross earnings from running several fractional engagements side by side.
pub fn project_portfolio(
    day_rate: f64,
    days_per_client: f64,
    clients: u32,
    weeks_per_year: f64,
) -> Result<PortfolioProjection, InvalidInputError> {
    if !day_rate.is_finite() || day_rate <= 0.0 {
        return Err(InvalidInputError::new("dayRate", "must be a positive amount"));
    }
    if !days_per_client.is_finite() || days_per_client <= 0.0 {
        return Err(InvalidInputError::new("daysPerClient", "must be > 0"));
    }
    if clients == 0 {
        return Err(InvalidInputError::new("clients", "must be at least 1"));
    }
    if days_per_client * f64::from(clients) > 7.0 {
        return Err(InvalidInputError::new(
            "daysPerClient",
            "total days across clients cannot exceed 7 per week",
        ));
    }
    if !weeks_per_year.is_finite() || weeks_per_year <= 0.0 || weeks_per_year > 52.0 {
        return Err(InvalidInputError::new(
            "weeksPerYear",
            "must be greater than 0 and at most 52",
        ));
    }

    let weekly = day_rate * days_per_client * f64::from(clients);
    let annual = weekly * weeks_per_year;
    Ok(PortfolioProjection {
        weekly: round_currency(weekly),
        monthly: round_currency(annual / 12.0),
        annual: round_currency(annual),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_has_ordered_day_rates() {
        assert_eq!(ROLES.len(), 9);
        for r in ROLES {
            assert!(
                r.min_day_rate <= r.avg_day_rate && r.avg_day_rate <= r.max_day_rate,
                "{} rates out of order",
                r.key
            );
            assert!(r.avg_salary > 0.0);
        }
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(find_role("CISO").map(|r| r.avg_day_rate), Some(1_150.0));
        assert_eq!(find_role(" cfo ").map(|r| r.label), Some("CFO"));
        assert!(find_role("cxo").is_none());
    }

    #[test]
    fn explicit_rate_beats_role_default() {
        assert_eq!(resolve_day_rate(Some(700.0), Some("ceo")), Ok(700.0));
        assert_eq!(resolve_day_rate(None, Some("ceo")), Ok(1_200.0));
        assert_eq!(
            resolve_day_rate(None, Some("wizard")).map_err(|e| e.field),
            Err("role")
        );
        assert_eq!(
            resolve_day_rate(None, None).map_err(|e| e.field),
            Err("dayRate")
        );
    }

    #[test]
    fn portfolio_projection_matches_hand_calculation() {
        let p = project_portfolio(950.0, 2.5, 2, 48.0).expect("valid");
        assert_eq!(p.weekly, 4_750.0);
        assert_eq!(p.annual, 228_000.0);
        assert_eq!(p.monthly, 19_000.0);
    }

    #[test]
    fn portfolio_rejects_overbooked_week() {
        let err = project_portfolio(1_000.0, 3.0, 3, 48.0).expect_err("9 days a week");
        assert_eq!(err.field, "daysPerClient");
        assert!(project_portfolio(1_000.0, 1.0, 0, 48.0).is_err());
    }
}
