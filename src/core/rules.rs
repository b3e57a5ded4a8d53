use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ConfigurationError;

/// A UK tax year, keyed by the calendar year in which it starts (6 April).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaxYear {
    start_year: i16,
}

impl TaxYear {
    pub const fn new(start_year: i16) -> Self {
        Self { start_year }
    }

    pub fn start_year(self) -> i16 {
        self.start_year
    }

    /// The tax year in force on `date`.
    pub fn containing(date: jiff::civil::Date) -> Self {
        let year = date.year();
        if date >= jiff::civil::date(year, 4, 6) {
            Self::new(year)
        } else {
            Self::new(year - 1)
        }
    }
}

impl fmt::Display for TaxYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = (i32::from(self.start_year) + 1).rem_euclid(100);
        write!(f, "{}-{end:02}", self.start_year)
    }
}

impl FromStr for TaxYear {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (start, end) = match s.split_once(['-', '/']) {
            Some((start, end)) => (start, Some(end)),
            None => (s, None),
        };
        let start_year: i16 = start
            .parse()
            .map_err(|_| format!("'{s}' is not a tax year like 2025-26"))?;
        if let Some(end) = end {
            let expected_long = i32::from(start_year) + 1;
            let matches = match end.len() {
                2 => end.parse::<i32>().ok() == Some(expected_long.rem_euclid(100)),
                4 => end.parse::<i32>().ok() == Some(expected_long),
                _ => false,
            };
            if !matches {
                return Err(format!("'{s}' does not name consecutive years"));
            }
        }
        Ok(Self::new(start_year))
    }
}

impl TryFrom<String> for TaxYear {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaxYear> for String {
    fn from(value: TaxYear) -> Self {
        value.to_string()
    }
}

/// One slice of a progressive schedule. `up_to: None` is the open-ended top band.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Band {
    pub up_to: Option<f64>,
    pub rate: f64,
}

impl Band {
    pub const fn capped(up_to: f64, rate: f64) -> Self {
        Self {
            up_to: Some(up_to),
            rate,
        }
    }

    pub const fn open(rate: f64) -> Self {
        Self { up_to: None, rate }
    }

    pub fn upper(&self) -> f64 {
        self.up_to.unwrap_or(f64::INFINITY)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NationalInsurance {
    pub employee_primary_threshold: f64,
    pub employee_upper_threshold: f64,
    pub employee_rate: f64,
    pub employee_upper_rate: f64,
    pub employer_secondary_threshold: f64,
    pub employer_rate: f64,
}

/// Every rate and threshold the engine uses for one tax year.
///
/// Income tax and dividend bands are measured on taxable income, i.e. after the
/// personal allowance. Corporation tax bands are measured on company profit; marginal
/// relief is a middle band at the marginal rate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxYearRules {
    pub year: TaxYear,
    pub personal_allowance: f64,
    pub personal_allowance_taper_threshold: f64,
    /// Allowance withdrawn per pound of income over the threshold.
    pub personal_allowance_taper_rate: f64,
    pub income_tax_bands: Vec<Band>,
    pub national_insurance: NationalInsurance,
    pub apprenticeship_levy_rate: f64,
    pub apprenticeship_levy_threshold: f64,
    pub corporation_tax_bands: Vec<Band>,
    pub dividend_allowance: f64,
    pub dividend_tax_bands: Vec<Band>,
}

impl TaxYearRules {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidRules {
            year: self.year,
            reason,
        };

        let ni = &self.national_insurance;
        for (label, value) in [
            ("personalAllowance", self.personal_allowance),
            (
                "personalAllowanceTaperThreshold",
                self.personal_allowance_taper_threshold,
            ),
            (
                "apprenticeshipLevyThreshold",
                self.apprenticeship_levy_threshold,
            ),
            ("dividendAllowance", self.dividend_allowance),
            (
                "employeePrimaryThreshold",
                ni.employee_primary_threshold,
            ),
            ("employeeUpperThreshold", ni.employee_upper_threshold),
            (
                "employerSecondaryThreshold",
                ni.employer_secondary_threshold,
            ),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{label} must be a finite amount >= 0")));
            }
        }

        for (label, rate) in [
            (
                "personalAllowanceTaperRate",
                self.personal_allowance_taper_rate,
            ),
            ("apprenticeshipLevyRate", self.apprenticeship_levy_rate),
            ("employeeRate", ni.employee_rate),
            ("employeeUpperRate", ni.employee_upper_rate),
            ("employerRate", ni.employer_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(invalid(format!("{label} must be between 0 and 1")));
            }
        }

        if ni.employee_upper_threshold < ni.employee_primary_threshold {
            return Err(invalid(
                "employeeUpperThreshold must be >= employeePrimaryThreshold".to_string(),
            ));
        }

        for (label, bands) in [
            ("incomeTaxBands", &self.income_tax_bands),
            ("corporationTaxBands", &self.corporation_tax_bands),
            ("dividendTaxBands", &self.dividend_tax_bands),
        ] {
            validate_bands(bands).map_err(|reason| invalid(format!("{label}: {reason}")))?;
        }

        Ok(())
    }
}

fn validate_bands(bands: &[Band]) -> Result<(), String> {
    let Some(last) = bands.last() else {
        return Err("at least one band is required".to_string());
    };
    if last.up_to.is_some() {
        return Err("the last band must be unbounded".to_string());
    }

    let mut floor = 0.0;
    for (i, band) in bands.iter().enumerate() {
        if !(0.0..=1.0).contains(&band.rate) {
            return Err(format!("band {i} rate must be between 0 and 1"));
        }
        match band.up_to {
            Some(up_to) => {
                if !up_to.is_finite() || up_to <= floor {
                    return Err(format!(
                        "band {i} upper bound must be finite and above {floor}"
                    ));
                }
                floor = up_to;
            }
            None if i + 1 != bands.len() => {
                return Err(format!("band {i} is unbounded but is not the last band"));
            }
            None => {}
        }
    }
    Ok(())
}

/// Validated, read-only rule sets for every supported tax year.
#[derive(Clone, Debug)]
pub struct RuleTable {
    years: BTreeMap<TaxYear, TaxYearRules>,
}

impl RuleTable {
    pub fn new(rules: Vec<TaxYearRules>) -> Result<Self, ConfigurationError> {
        if rules.is_empty() {
            return Err(ConfigurationError::EmptyTable);
        }
        let mut years = BTreeMap::new();
        for rule_set in rules {
            rule_set.validate()?;
            let year = rule_set.year;
            if years.insert(year, rule_set).is_some() {
                return Err(ConfigurationError::DuplicateYear(year));
            }
        }
        Ok(Self { years })
    }

    pub fn builtin() -> Result<Self, ConfigurationError> {
        Self::new(builtin_rules())
    }

    /// Parses a JSON array of rule sets.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let rules: Vec<TaxYearRules> =
            serde_json::from_str(json).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        Self::new(rules)
    }

    pub fn get_rules(&self, year: TaxYear) -> Result<&TaxYearRules, ConfigurationError> {
        self.years
            .get(&year)
            .ok_or(ConfigurationError::UnsupportedTaxYear(year))
    }

    pub fn years(&self) -> impl Iterator<Item = TaxYear> + '_ {
        self.years.keys().copied()
    }
}

fn builtin_rules() -> Vec<TaxYearRules> {
    let income_tax_bands = vec![
        Band::capped(37_700.0, 0.20),
        Band::capped(125_140.0, 0.40),
        Band::open(0.45),
    ];
    let corporation_tax_bands = vec![
        Band::capped(50_000.0, 0.19),
        Band::capped(250_000.0, 0.265),
        Band::open(0.25),
    ];

    let y2024 = TaxYearRules {
        year: TaxYear::new(2024),
        personal_allowance: 12_570.0,
        personal_allowance_taper_threshold: 100_000.0,
        personal_allowance_taper_rate: 0.5,
        income_tax_bands: income_tax_bands.clone(),
        national_insurance: NationalInsurance {
            employee_primary_threshold: 12_570.0,
            employee_upper_threshold: 50_270.0,
            employee_rate: 0.08,
            employee_upper_rate: 0.02,
            employer_secondary_threshold: 9_100.0,
            employer_rate: 0.138,
        },
        apprenticeship_levy_rate: 0.005,
        apprenticeship_levy_threshold: 0.0,
        corporation_tax_bands: corporation_tax_bands.clone(),
        dividend_allowance: 500.0,
        dividend_tax_bands: vec![
            Band::capped(37_700.0, 0.0875),
            Band::capped(125_140.0, 0.3375),
            Band::open(0.3935),
        ],
    };

    let y2025 = TaxYearRules {
        year: TaxYear::new(2025),
        national_insurance: NationalInsurance {
            employer_secondary_threshold: 5_000.0,
            employer_rate: 0.15,
            ..y2024.national_insurance
        },
        ..y2024.clone()
    };

    let y2026 = TaxYearRules {
        year: TaxYear::new(2026),
        dividend_tax_bands: vec![
            Band::capped(37_700.0, 0.1075),
            Band::capped(125_140.0, 0.3575),
            Band::open(0.3935),
        ],
        ..y2025.clone()
    };

    vec![y2024, y2025, y2026]
}
