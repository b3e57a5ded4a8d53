use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Json, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Settings;
use crate::core::{
    CalcError, ComparisonResult, ConfigurationError, DEFAULT_DAYS_PER_WEEK,
    DEFAULT_WEEKS_PER_YEAR, EarningsInput, HiringAssumptions, HiringCostComparison,
    InvalidInputError, PortfolioProjection, Posture, ROLES, RoleProfile, SolveConfig, SolveGoal,
    SolveResult, TaxYear, compare, compare_hiring_cost, find_role, project_portfolio,
    resolve_day_rate, solve_day_rate,
};

type AppState = Arc<Settings>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Calc(#[from] CalcError),
    #[error("{0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
}

impl From<InvalidInputError> for ApiError {
    fn from(value: InvalidInputError) -> Self {
        ApiError::Calc(value.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        ApiError::BadRequest(format!("invalid JSON payload: {}", value.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(value: QueryRejection) -> Self {
        ApiError::BadRequest(format!("invalid query string: {}", value.body_text()))
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Calc(CalcError::InvalidInput(_)) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            ApiError::Calc(CalcError::Configuration(ConfigurationError::UnsupportedTaxYear(_))) => {
                (StatusCode::BAD_REQUEST, "UNSUPPORTED_TAX_YEAR")
            }
            ApiError::Calc(CalcError::Configuration(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
            }
            ApiError::Calc(CalcError::Invariant(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CALCULATION_ERROR")
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status.is_server_error() {
            error!(error = %self, code, "calculation failed");
            "An internal calculation error occurred".to_string()
        } else {
            self.to_string()
        };
        json_response(
            status,
            json!({ "error": { "code": code, "message": message } }),
        )
    }
}

/// Query/body fields shared by the compare endpoint. All optional; defaults are
/// 5 days, 46.5 weeks and the server's default tax year.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ComparePayload {
    day_rate: Option<f64>,
    role: Option<String>,
    days_per_week: Option<f64>,
    weeks_per_year: Option<f64>,
    tax_year: Option<String>,
    business_costs: Option<f64>,
    director_salary: Option<f64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SolvePayload {
    day_rate: Option<f64>,
    role: Option<String>,
    days_per_week: Option<f64>,
    weeks_per_year: Option<f64>,
    tax_year: Option<String>,
    business_costs: Option<f64>,
    director_salary: Option<f64>,
    target_net: Option<f64>,
    posture: Option<Posture>,
    search_min: Option<f64>,
    search_max: Option<f64>,
}

impl SolvePayload {
    fn split(self) -> (ComparePayload, SolveOptions) {
        (
            ComparePayload {
                day_rate: self.day_rate,
                role: self.role,
                days_per_week: self.days_per_week,
                weeks_per_year: self.weeks_per_year,
                tax_year: self.tax_year,
                business_costs: self.business_costs,
                director_salary: self.director_salary,
            },
            SolveOptions {
                target_net: self.target_net,
                posture: self.posture,
                search_min: self.search_min,
                search_max: self.search_max,
            },
        )
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SolveOptions {
    target_net: Option<f64>,
    posture: Option<Posture>,
    search_min: Option<f64>,
    search_max: Option<f64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PortfolioPayload {
    day_rate: Option<f64>,
    role: Option<String>,
    days_per_client: Option<f64>,
    clients: Option<u32>,
    weeks_per_year: Option<f64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct HiringPayload {
    full_time_salary: Option<f64>,
    day_rate: Option<f64>,
    role: Option<String>,
    days_per_week: Option<f64>,
    tax_year: Option<String>,
    pension_rate: Option<f64>,
    benefits_rate: Option<f64>,
    recruitment_fee_rate: Option<f64>,
    recruitment_amortisation_years: Option<f64>,
    working_weeks: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaxYearsResponse {
    years: Vec<TaxYear>,
    default_tax_year: TaxYear,
}

pub fn router(settings: Settings) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/compare", get(compare_get_handler).post(compare_post_handler))
        .route("/api/solve", get(solve_get_handler).post(solve_post_handler))
        .route("/api/roles", get(roles_handler))
        .route("/api/tax-years", get(tax_years_handler))
        .route("/api/portfolio", get(portfolio_handler))
        .route(
            "/api/hiring-cost",
            get(hiring_get_handler).post(hiring_post_handler),
        )
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(settings))
}

pub async fn run_http_server(settings: Settings, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(
        default_tax_year = %settings.default_tax_year,
        policy = ?settings.engine.employer_cost_policy,
        "starting IR35 API"
    );
    let app = router(settings);

    let listener = TcpListener::bind(addr).await?;
    info!("listening on http://{addr}");

    axum::serve(listener, app).await
}

async fn health_handler() -> Response {
    json_response(
        StatusCode::OK,
        json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }),
    )
}

async fn not_found_handler() -> ApiError {
    ApiError::NotFound
}

async fn compare_get_handler(
    State(settings): State<AppState>,
    payload: Result<Query<ComparePayload>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(payload) = payload?;
    let result = run_compare(&settings, payload)?;
    Ok(json_response(StatusCode::OK, result))
}

async fn compare_post_handler(
    State(settings): State<AppState>,
    payload: Result<Json<ComparePayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let result = run_compare(&settings, payload)?;
    Ok(json_response(StatusCode::OK, result))
}

async fn solve_get_handler(
    State(settings): State<AppState>,
    payload: Result<Query<SolvePayload>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(payload) = payload?;
    let result = run_solve(&settings, payload)?;
    Ok(json_response(StatusCode::OK, result))
}

async fn solve_post_handler(
    State(settings): State<AppState>,
    payload: Result<Json<SolvePayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let result = run_solve(&settings, payload)?;
    Ok(json_response(StatusCode::OK, result))
}

async fn roles_handler() -> Response {
    json_response(StatusCode::OK, ROLES)
}

async fn tax_years_handler(State(settings): State<AppState>) -> Response {
    json_response(
        StatusCode::OK,
        TaxYearsResponse {
            years: settings.table.years().collect(),
            default_tax_year: settings.default_tax_year,
        },
    )
}

async fn portfolio_handler(
    payload: Result<Query<PortfolioPayload>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(payload) = payload?;
    let result = run_portfolio(payload)?;
    Ok(json_response(StatusCode::OK, result))
}

async fn hiring_get_handler(
    State(settings): State<AppState>,
    payload: Result<Query<HiringPayload>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(payload) = payload?;
    let result = run_hiring(&settings, payload)?;
    Ok(json_response(StatusCode::OK, result))
}

async fn hiring_post_handler(
    State(settings): State<AppState>,
    payload: Result<Json<HiringPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let result = run_hiring(&settings, payload)?;
    Ok(json_response(StatusCode::OK, result))
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn resolve_tax_year(settings: &Settings, raw: Option<&str>) -> Result<TaxYear, InvalidInputError> {
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|reason: String| InvalidInputError::new("taxYear", reason)),
        None => Ok(settings.default_tax_year),
    }
}

fn input_from_payload(
    settings: &Settings,
    payload: ComparePayload,
) -> Result<EarningsInput, InvalidInputError> {
    let day_rate = resolve_day_rate(payload.day_rate, payload.role.as_deref())?;
    let tax_year = resolve_tax_year(settings, payload.tax_year.as_deref())?;
    Ok(EarningsInput {
        business_costs: payload.business_costs.unwrap_or(0.0),
        director_salary: payload.director_salary,
        ..EarningsInput::new(
            day_rate,
            payload.days_per_week.unwrap_or(DEFAULT_DAYS_PER_WEEK),
            payload.weeks_per_year.unwrap_or(DEFAULT_WEEKS_PER_YEAR),
            tax_year,
        )
    })
}

fn run_compare(settings: &Settings, payload: ComparePayload) -> Result<ComparisonResult, ApiError> {
    let input = input_from_payload(settings, payload)?;
    Ok(compare(&input, &settings.table, &settings.engine)?)
}

fn run_solve(settings: &Settings, payload: SolvePayload) -> Result<SolveResult, ApiError> {
    let (earnings, options) = payload.split();
    let goal = match options.target_net {
        Some(net_annual) => SolveGoal::TargetNet {
            posture: options.posture.unwrap_or(Posture::Inside),
            net_annual,
        },
        None => SolveGoal::MatchOutsideNet,
    };
    let defaults = SolveConfig::default();
    let config = SolveConfig {
        search_min: options.search_min.unwrap_or(defaults.search_min),
        search_max: options.search_max.unwrap_or(defaults.search_max),
        ..defaults
    };

    // A target-net solve never reads the request day rate, so any placeholder will do.
    let needs_placeholder = matches!(goal, SolveGoal::TargetNet { .. })
        && earnings.day_rate.is_none()
        && earnings.role.is_none();
    let earnings = if needs_placeholder {
        ComparePayload {
            day_rate: Some(config.search_min),
            ..earnings
        }
    } else {
        earnings
    };
    let input = input_from_payload(settings, earnings)?;
    Ok(solve_day_rate(
        &input,
        &settings.table,
        &settings.engine,
        config,
        goal,
    )?)
}

fn run_portfolio(payload: PortfolioPayload) -> Result<PortfolioProjection, ApiError> {
    let day_rate = resolve_day_rate(payload.day_rate, payload.role.as_deref())?;
    Ok(project_portfolio(
        day_rate,
        payload.days_per_client.unwrap_or(2.5),
        payload.clients.unwrap_or(2),
        payload.weeks_per_year.unwrap_or(48.0),
    )?)
}

fn run_hiring(settings: &Settings, payload: HiringPayload) -> Result<HiringCostComparison, ApiError> {
    let role: Option<&RoleProfile> = match payload.role.as_deref() {
        Some(key) => Some(find_role(key).ok_or_else(|| {
            InvalidInputError::new("role", format!("'{key}' is not a known role"))
        })?),
        None => None,
    };
    let full_time_salary = payload
        .full_time_salary
        .or(role.map(|r| r.avg_salary))
        .ok_or_else(|| InvalidInputError::new("fullTimeSalary", "is required unless a role is given"))?;
    let day_rate = resolve_day_rate(payload.day_rate, payload.role.as_deref())?;
    let tax_year = resolve_tax_year(settings, payload.tax_year.as_deref())?;
    let rules = settings
        .table
        .get_rules(tax_year)
        .map_err(CalcError::from)?;

    let defaults = HiringAssumptions::default();
    let assumptions = HiringAssumptions {
        pension_rate: payload.pension_rate.unwrap_or(defaults.pension_rate),
        benefits_rate: payload.benefits_rate.unwrap_or(defaults.benefits_rate),
        recruitment_fee_rate: payload
            .recruitment_fee_rate
            .unwrap_or(defaults.recruitment_fee_rate),
        recruitment_amortisation_years: payload
            .recruitment_amortisation_years
            .unwrap_or(defaults.recruitment_amortisation_years),
        working_weeks: payload.working_weeks.unwrap_or(defaults.working_weeks),
    };

    Ok(compare_hiring_cost(
        full_time_salary,
        day_rate,
        payload.days_per_week.unwrap_or(2.0),
        rules,
        &assumptions,
    )?)
}

#[cfg(test)]
fn compare_payload_from_json(json: &str) -> Result<ComparePayload, String> {
    serde_json::from_str::<ComparePayload>(json).map_err(|e| format!("Invalid API JSON payload: {e}"))
}
