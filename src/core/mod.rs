pub mod engine;
pub mod error;
pub mod hiring;
pub mod roles;
pub mod rules;
pub mod solver;
pub mod types;

pub use engine::{
    band_contributions, compare, compute_gross_annual, progressive_tax, tapered_personal_allowance,
    tax_on_slice,
};
pub use error::{
    ArithmeticInvariantError, CalcError, CalcResult, ConfigurationError, InvalidInputError,
};
pub use hiring::{HiringAssumptions, HiringCostComparison, compare_hiring_cost};
pub use roles::{
    PortfolioProjection, ROLES, RoleProfile, find_role, project_portfolio, resolve_day_rate,
};
pub use rules::{Band, NationalInsurance, RuleTable, TaxYear, TaxYearRules};
pub use solver::{SolveConfig, SolveGoal, SolveIteration, SolveResult, solve_day_rate};
pub use types::{
    ComparisonResult, DEFAULT_DAYS_PER_WEEK, DEFAULT_MARGINAL_TOLERANCE, DEFAULT_WEEKS_PER_YEAR,
    EarningsInput, EmployerCostPolicy, EngineConfig, Posture, Recommendation, TakeHomeBreakdown,
};
