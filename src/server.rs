use crate::error::{PipelineError, StoreError};
use crate::model::Artifact;
use crate::pipeline::{ModelOrigin, Pipeline, RankedPost};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

pub fn build_router(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health))
        .route("/recommendation/train/{account_id}", get(train_handler))
        .route("/recommendation/rank/{account_id}", get(rank_handler))
        .route("/models/{account_id}/model.json", get(model_json_handler))
        .route("/models/{account_id}/weights.bin", get(weights_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { pipeline })
}

/// JSON error body with a status derived from the failure.
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PipelineError::Graph(_) | PipelineError::Posts(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Training(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::NoModel(_) => StatusCode::NOT_FOUND,
            PipelineError::Store(StoreError::InvalidAccount(_)) => StatusCode::BAD_REQUEST,
            PipelineError::Store(_) | PipelineError::ModelLoad(_) | PipelineError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        tracing::warn!(status = status.as_u16(), error = %self.0, "request failed");
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct TrainResponse {
    res: &'static str,
    account: String,
    source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    training: Option<crate::pipeline::TrainingOutcome>,
}

async fn train_handler(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<TrainResponse>, ApiError> {
    let loaded = state.pipeline.load_or_train(&account_id).await?;
    let response = match loaded.origin {
        ModelOrigin::Stored => TrainResponse {
            res: "Model was loaded",
            account: account_id,
            source: "stored",
            training: None,
        },
        ModelOrigin::Trained(outcome) => TrainResponse {
            res: "Model was trained",
            account: account_id,
            source: "trained",
            training: Some(outcome),
        },
    };
    Ok(Json(response))
}

async fn rank_handler(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<Vec<RankedPost>>, ApiError> {
    Ok(Json(state.pipeline.rank_recent(&account_id).await?))
}

async fn serve_artifact(state: &AppState, account_id: &str, artifact: Artifact) -> Response {
    match state.pipeline.store().read_artifact(account_id, artifact).await {
        Ok(Some(bytes)) => {
            ([(header::CONTENT_TYPE, artifact.content_type())], bytes).into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no {} for {}", artifact.file_name(), account_id) })),
        )
            .into_response(),
        Err(e) => ApiError(PipelineError::Store(e)).into_response(),
    }
}

async fn model_json_handler(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Response {
    serve_artifact(&state, &account_id, Artifact::ModelJson).await
}

async fn weights_handler(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Response {
    serve_artifact(&state, &account_id, Artifact::Weights).await
}
