use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use std::{sync::Arc, time::Instant};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::engine::PredictionEngine;
use crate::error::AppError;
use crate::features::DefaultsTable;
use crate::types::{GlobalExplanation, PredictRequest, PredictionResult};

pub type AppState = Arc<PredictionEngine>;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route(
            "/explanations/global/:model_type",
            get(global_explanation_handler),
        )
        .route("/defaults", get(defaults_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn predict_handler(
    State(engine): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictionResult>, AppError> {
    let start = Instant::now();

    metrics::counter!("requests_total", 1);

    let result = engine.predict(&request.model_type, &request.student_data)?;

    let latency = start.elapsed().as_millis() as f64;
    metrics::histogram!("request_duration_ms", latency);

    info!(
        "Prediction {:?} for model {} ({:.1}ms)",
        result.prediction, result.model_type, latency
    );

    Ok(Json(result))
}

async fn global_explanation_handler(
    State(engine): State<AppState>,
    Path(model_type): Path<String>,
) -> Result<Json<GlobalExplanation>, AppError> {
    let explanation = engine.global_explanation(&model_type)?;
    Ok(Json((*explanation).clone()))
}

async fn defaults_handler(State(engine): State<AppState>) -> Json<DefaultsTable> {
    Json(engine.defaults().clone())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
