//! Maps `EngineError` onto HTTP status codes and the `{kind, message}`
//! error frame (§6.3).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use retrieval_types::EngineError;
use serde_json::json;

pub struct AppError(pub EngineError);

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "kind": self.0.kind_str(),
            "message": self.0.user_message(),
        });
        (status, Json(body)).into_response()
    }
}
