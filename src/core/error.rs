use thiserror::Error;

use super::rules::TaxYear;

/// A caller-supplied value failed validation. Safe to show to the user.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field} {reason}")]
pub struct InvalidInputError {
    pub field: &'static str,
    pub reason: String,
}

impl InvalidInputError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// The rule table is missing a year or a rule set is malformed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("tax year {0} is not supported")]
    UnsupportedTaxYear(TaxYear),
    #[error("invalid rules for tax year {year}: {reason}")]
    InvalidRules { year: TaxYear, reason: String },
    #[error("tax year {0} is defined more than once")]
    DuplicateYear(TaxYear),
    #[error("rule table is empty")]
    EmptyTable,
    #[error("could not parse rule table: {0}")]
    Parse(String),
}

/// An internal computation broke one of its own guarantees. Always a bug.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArithmeticInvariantError {
    #[error("{posture} net annual came out negative ({value})")]
    NegativeNet { posture: &'static str, value: f64 },
    #[error("band sequence does not cover income of {income}")]
    UncoveredBand { income: f64 },
    #[error("{label} is not finite")]
    NonFinite { label: &'static str },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Invariant(#[from] ArithmeticInvariantError),
}

pub type CalcResult<T> = Result<T, CalcError>;
