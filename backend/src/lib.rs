use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use santa_core::{decode, reveal_link, validate, AllocationError, EventError, EventRequest, PayloadRecord};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub mod config;

pub use config::{Config, ConfigError};

/// Shared, read-only service state. Events and draws are never stored.
#[derive(Clone, Default)]
pub struct AppState {
    config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/event", post(create_event))
        .route("/reveal", get(reveal))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Deserialize)]
struct DrawParams {
    seed: Option<u64>,
}

#[derive(Serialize)]
struct AssignmentView {
    giver: String,
    token: String,
    link: String,
}

#[derive(Serialize)]
struct CreateEventResponse {
    assignments: Vec<AssignmentView>,
}

#[derive(Deserialize)]
struct RevealParams {
    data: Option<String>,
}

#[derive(Serialize)]
struct RevealResponse {
    title: String,
    description: String,
    giver: String,
    receiver: String,
}

impl From<PayloadRecord> for RevealResponse {
    fn from(record: PayloadRecord) -> Self {
        Self {
            title: record.title,
            description: record.description,
            giver: record.giver,
            receiver: record.receiver,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error(transparent)]
    Event(#[from] EventError),
    #[error("invalid or corrupted link")]
    InvalidLink,
    #[error("draw did not complete")]
    DrawTask(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Event(EventError::Allocation(AllocationError::Infeasible)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Event(EventError::Codec(_)) | ApiError::DrawTask(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Event(_) | ApiError::InvalidLink => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

async fn create_event(
    State(state): State<AppState>,
    Query(params): Query<DrawParams>,
    Json(payload): Json<EventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let event = validate(&payload).inspect_err(|err| warn!(error = %err, "rejected event"))?;

    let participants = event.participants().len();

    // The fallback search is CPU-bound; keep it off the async workers.
    let seed = params.seed;
    let assignments = tokio::task::spawn_blocking(move || {
        let mut rng = seed
            .map(ChaCha8Rng::seed_from_u64)
            .unwrap_or_else(ChaCha8Rng::from_entropy);
        event.draw(&mut rng)
    })
    .await
    .inspect_err(|err| warn!(error = %err, "draw task failed"))?
    .inspect_err(|err| warn!(error = %err, "draw failed"))?;

    info!(participants, seeded = seed.is_some(), "event drawn");

    let base = &state.config.public_base_url;
    let assignments = assignments
        .into_iter()
        .map(|a| AssignmentView {
            link: reveal_link(base, &a.token),
            giver: a.giver,
            token: a.token,
        })
        .collect();

    Ok((StatusCode::CREATED, Json(CreateEventResponse { assignments })))
}

async fn reveal(Query(params): Query<RevealParams>) -> Result<Json<RevealResponse>, ApiError> {
    let token = params.data.ok_or_else(|| {
        warn!("reveal request without a token");
        ApiError::InvalidLink
    })?;
    let record = decode(&token).map_err(|err| {
        warn!(error = %err, "rejected reveal token");
        ApiError::InvalidLink
    })?;
    Ok(Json(record.into()))
}

async fn health() -> &'static str {
    "ok"
}
