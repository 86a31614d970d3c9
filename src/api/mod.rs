use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::AppConfig;
use crate::core::{
    BUSINESS_EXPENSE_CATEGORIES, ConversionRates, ExpenseCategory, PERSONAL_EXPENSE_CATEGORIES,
    PlanInput, PlanIssue, PlanTargets, PlannerConfig, RatePath, RawNumber,
    calculate_plan_targets_with, create_initial_plan_for_current_year,
    get_default_conversion_rates, merge_saved_plan, update_conversion_rate, validate_plan,
};
use crate::error::AppError;

#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub planner: Arc<PlannerConfig>,
}

impl AppState {
    pub fn new(planner: PlannerConfig) -> Self {
        Self {
            planner: Arc::new(planner),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DefaultsResponse {
    plan: PlanInput,
    conversion_rates: ConversionRates,
    personal_expense_categories: &'static [ExpenseCategory],
    business_expense_categories: &'static [ExpenseCategory],
}

#[derive(Debug, Serialize)]
struct ValidationResponse {
    valid: bool,
    issues: Vec<PlanIssue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RestorePayload {
    saved: Option<PlanInput>,
}

#[derive(Debug, Deserialize)]
struct RateUpdatePayload {
    #[serde(default)]
    rates: Option<ConversionRates>,
    path: String,
    #[serde(default)]
    value: Option<RawNumber>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/defaults", get(defaults_handler))
        .route("/api/plan/targets", post(targets_handler))
        .route("/api/plan/validate", post(validate_handler))
        .route("/api/plan/restore", post(restore_handler))
        .route("/api/conversion-rates", post(conversion_rate_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn run_http_server(config: &AppConfig) -> Result<(), AppError> {
    let addr = config.server.socket_addr()?;
    let app = router(AppState::new(config.planner.clone()));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, rounding = %config.planner.rounding, "production planner API listening");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn defaults_handler() -> Response {
    json_response(
        StatusCode::OK,
        DefaultsResponse {
            plan: create_initial_plan_for_current_year(),
            conversion_rates: get_default_conversion_rates(),
            personal_expense_categories: PERSONAL_EXPENSE_CATEGORIES,
            business_expense_categories: BUSINESS_EXPENSE_CATEGORIES,
        },
    )
}

async fn targets_handler(State(state): State<AppState>, Json(plan): Json<PlanInput>) -> Response {
    let targets: PlanTargets = calculate_plan_targets_with(&plan, &state.planner);
    info!(
        gci_required = targets.gci_required,
        total_deals = targets.total_deals_needed,
        "plan targets requested"
    );
    json_response(StatusCode::OK, targets)
}

async fn validate_handler(Json(plan): Json<PlanInput>) -> Response {
    let issues = validate_plan(&plan);
    json_response(
        StatusCode::OK,
        ValidationResponse {
            valid: issues.is_empty(),
            issues,
        },
    )
}

async fn restore_handler(Json(payload): Json<RestorePayload>) -> Response {
    let merged = merge_saved_plan(payload.saved, create_initial_plan_for_current_year());
    json_response(StatusCode::OK, merged)
}

async fn conversion_rate_handler(
    Json(payload): Json<RateUpdatePayload>,
) -> Result<Response, AppError> {
    let path: RatePath = payload.path.parse()?;
    let rates = payload.rates.unwrap_or_else(get_default_conversion_rates);
    let updated = update_conversion_rate(&rates, path, payload.value.as_ref());
    Ok(json_response(StatusCode::OK, updated))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

pub(crate) fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
