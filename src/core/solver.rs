use serde::{Deserialize, Serialize};

use super::engine::{net_annual_for, round_currency};
use super::error::{CalcResult, InvalidInputError};
use super::rules::RuleTable;
use super::types::{EarningsInput, EngineConfig, Posture};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SolveGoal {
    /// Lowest day rate whose net take-home reaches `net_annual`.
    #[serde(rename_all = "camelCase")]
    TargetNet { posture: Posture, net_annual: f64 },
    /// Inside-IR35 day rate that pays the same net as the input rate outside IR35.
    MatchOutsideNet,
}

#[derive(Debug, Clone, Copy)]
pub struct SolveConfig {
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            search_min: 1.0,
            search_max: 10_000.0,
            tolerance: 0.01,
            max_iterations: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_day_rate: f64,
    pub net_annual: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveResult {
    pub goal: SolveGoal,
    pub posture: Posture,
    pub target_net_annual: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub solved_day_rate: Option<f64>,
    pub achieved_net_annual: Option<f64>,
    pub iterations: Vec<SolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

/// Bisects on day rate. Net take-home is non-decreasing in day rate for both
/// postures, so the lowest rate meeting the target is well defined.
pub fn solve_day_rate(
    input: &EarningsInput,
    table: &RuleTable,
    engine: &EngineConfig,
    config: SolveConfig,
    goal: SolveGoal,
) -> CalcResult<SolveResult> {
    validate_config(config)?;

    let (posture, target) = match goal {
        SolveGoal::TargetNet {
            posture,
            net_annual,
        } => {
            if !net_annual.is_finite() || net_annual < 0.0 {
                return Err(InvalidInputError::new("netAnnual", "must be >= 0").into());
            }
            (posture, net_annual)
        }
        SolveGoal::MatchOutsideNet => (
            Posture::Inside,
            net_annual_for(Posture::Outside, input, table, engine)?,
        ),
    };

    let net_at = |day_rate: f64| {
        let candidate = EarningsInput {
            day_rate,
            ..input.clone()
        };
        net_annual_for(posture, &candidate, table, engine)
    };

    // Outside IR35 the rate must at least cover business costs.
    let working_days = input.days_per_week * input.weeks_per_year;
    let covers_costs =
        posture == Posture::Outside && working_days > 0.0 && input.business_costs > 0.0;
    let search_min = if covers_costs {
        config
            .search_min
            .max(input.business_costs / working_days * (1.0 + 1e-12))
    } else {
        config.search_min
    };

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let mut solved_day_rate = None;
    let mut converged = false;
    let feasible;
    let message;

    if search_min >= config.search_max {
        feasible = false;
        message = "Business costs exceed revenue at every day rate within the search bounds."
            .to_string();
    } else if net_at(search_min)? + 1e-9 >= target {
        solved_day_rate = Some(search_min);
        converged = true;
        feasible = true;
        message = "Already meets target at the lower day rate bound.".to_string();
    } else if net_at(config.search_max)? + 1e-9 < target {
        feasible = false;
        message = "No day rate within the search bounds reaches the target.".to_string();
    } else {
        let mut lo = search_min;
        let mut hi = config.search_max;
        let mut it = 0;
        while it < config.max_iterations {
            it += 1;
            let mid = (lo + hi) * 0.5;
            let net = net_at(mid)?;
            iterations.push(SolveIteration {
                iteration: it,
                lower_bound: lo,
                upper_bound: hi,
                candidate_day_rate: mid,
                net_annual: net,
            });

            if net + 1e-9 >= target {
                hi = mid;
            } else {
                lo = mid;
            }

            if (hi - lo).abs() <= config.tolerance {
                converged = true;
                break;
            }
        }
        solved_day_rate = Some(hi);
        feasible = true;
        message = if converged {
            "Solved day rate.".to_string()
        } else {
            "Reached max iterations before tolerance was met; returning best estimate."
                .to_string()
        };
    }

    // Rounding down to the penny could land below the target, so round up.
    let solved_day_rate = solved_day_rate.map(|rate| (rate * 100.0).ceil() / 100.0);
    let achieved_net_annual = match solved_day_rate {
        Some(rate) => Some(round_currency(net_at(rate)?)),
        None => None,
    };

    Ok(SolveResult {
        goal,
        posture,
        target_net_annual: round_currency(target),
        search_min,
        search_max: config.search_max,
        solved_day_rate,
        achieved_net_annual,
        iterations,
        converged,
        feasible,
        message,
    })
}

fn validate_config(config: SolveConfig) -> Result<(), InvalidInputError> {
    if !config.search_min.is_finite() || config.search_min <= 0.0 {
        return Err(InvalidInputError::new("searchMin", "must be > 0"));
    }
    if !config.search_max.is_finite() || config.search_max <= config.search_min {
        return Err(InvalidInputError::new(
            "searchMax",
            "must be greater than searchMin",
        ));
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err(InvalidInputError::new("tolerance", "must be > 0"));
    }
    if config.max_iterations == 0 {
        return Err(InvalidInputError::new("maxIterations", "must be > 0"));
    }
    Ok(())
}
