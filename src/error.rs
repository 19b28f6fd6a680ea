use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unknown model_type \"{0}\"")]
    UnknownModel(String),

    #[error("Missing feature \"{0}\" after normalization")]
    MissingFeature(String),

    #[error("Model weights/feature length mismatch for {model} (coef={coef}, features={features})")]
    SchemaMismatch {
        model: String,
        coef: usize,
        features: usize,
    },

    #[error("Missing explanation reference: {0}")]
    MissingReference(String),

    #[error("Invalid model file: {0}")]
    InvalidModel(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::UnknownModel(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            // Everything else is a deployment/config defect, not a request problem.
            _ => {
                tracing::error!("Internal server error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}
