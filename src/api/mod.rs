use axum::{
    Router,
    extract::{Json, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    AllocationPlan, ContributionRequest, Goal, GoalPlanner, HeuristicEstimator, HouseholdInput,
    HouseholdPlanner, OracleClient, PlanError, PlannerConfig, Profile, allocate, available_budget,
};

#[derive(Debug, Deserialize)]
struct RecommendPayload {
    profile: Profile,
    goal: Goal,
    #[serde(default)]
    target_probability: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AllocatePayload {
    profile: Profile,
    requests: Vec<ContributionRequest>,
    /// Overrides the budget derived from the profile.
    #[serde(default)]
    available_budget: Option<f64>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared handler state. The runtime oracle is the heuristic estimator; a
/// real simulator is plugged in through [`AppState::with_oracle`].
#[derive(Clone)]
pub struct AppState {
    planner: Arc<GoalPlanner>,
}

impl AppState {
    pub fn new(config: PlannerConfig) -> Self {
        let oracle = OracleClient::from_config(
            Arc::new(HeuristicEstimator::new(config.projection.clone())),
            &config,
        );
        Self::with_oracle(oracle, config)
    }

    pub fn with_oracle(oracle: OracleClient, config: PlannerConfig) -> Self {
        Self {
            planner: Arc::new(GoalPlanner::new(oracle, Arc::new(config))),
        }
    }

    pub fn planner(&self) -> Arc<GoalPlanner> {
        Arc::clone(&self.planner)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/recommend", post(recommend_post_handler))
        .route("/api/allocate", post(allocate_post_handler))
        .route("/api/plan", post(plan_post_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn run_http_server(port: u16, config: PlannerConfig) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(AppState::new(config));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "goal planner HTTP API listening");

    axum::serve(listener, app).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn recommend_post_handler(State(state): State<AppState>, body: String) -> Response {
    recommend_handler_impl(&state, &body).await
}

async fn allocate_post_handler(State(state): State<AppState>, body: String) -> Response {
    allocate_handler_impl(&state, &body)
}

async fn plan_post_handler(State(state): State<AppState>, body: String) -> Response {
    plan_handler_impl(&state, &body).await
}

async fn recommend_handler_impl(state: &AppState, body: &str) -> Response {
    let payload: RecommendPayload = match payload_from_json(body) {
        Ok(payload) => payload,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match state
        .planner
        .recommend(&payload.goal, &payload.profile, payload.target_probability)
        .await
    {
        Ok(recommendation) => json_response(StatusCode::OK, recommendation),
        Err(err) => plan_error_response(&err),
    }
}

fn allocate_handler_impl(state: &AppState, body: &str) -> Response {
    let payload: AllocatePayload = match payload_from_json(body) {
        Ok(payload) => payload,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match build_allocation(state.planner.config(), payload) {
        Ok(plan) => json_response(StatusCode::OK, plan),
        Err(err) => plan_error_response(&err),
    }
}

async fn plan_handler_impl(state: &AppState, body: &str) -> Response {
    let input: HouseholdInput = match payload_from_json(body) {
        Ok(input) => input,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    let plan = HouseholdPlanner::new(state.planner())
        .plan(input.goals, input.profile)
        .await;
    json_response(StatusCode::OK, plan)
}

fn build_allocation(
    config: &PlannerConfig,
    payload: AllocatePayload,
) -> Result<AllocationPlan, PlanError> {
    let budget = match payload.available_budget {
        Some(budget) if !budget.is_finite() || budget < 0.0 => {
            return Err(PlanError::InvalidConfig(
                "available_budget must be a non-negative number".to_string(),
            ));
        }
        Some(budget) => budget,
        None => available_budget(&payload.profile, &config.allocation),
    };
    Ok(allocate(
        &payload.requests,
        budget,
        &config.categories,
        &config.allocation,
    ))
}

fn payload_from_json<T: DeserializeOwned>(json: &str) -> Result<T, String> {
    serde_json::from_str::<T>(json).map_err(|e| format!("Invalid API JSON payload: {e}"))
}

fn plan_error_response(err: &PlanError) -> Response {
    let status = match err {
        PlanError::InvalidGoalData { .. } | PlanError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        PlanError::OracleUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PlanError::InfeasibleBudget { .. } | PlanError::NoViableAdjustment { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    };
    error_response(status, &err.to_string())
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
