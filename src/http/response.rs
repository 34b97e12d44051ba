use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::debug;

use crate::error::{BridgeError, ErrorKind};

/// `{code, message, data}` envelope used by every JSON endpoint
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub message: String,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

/// Successful envelope with `code: 0`
pub fn ok<T: Serialize>(data: T) -> Response {
    Json(ApiResponse {
        code: 0,
        message: "success".to_string(),
        data,
        error: None,
    })
    .into_response()
}

/// A [`BridgeError`] rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub BridgeError);

impl From<BridgeError> for ApiError {
    fn from(error: BridgeError) -> Self {
        Self(error)
    }
}

#[must_use]
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Configuration => StatusCode::BAD_REQUEST,
        ErrorKind::Connect | ErrorKind::SessionSetup => StatusCode::BAD_GATEWAY,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Io | ErrorKind::Resource | ErrorKind::Credential => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        let message = self.0.to_string();
        debug!(status = status.as_u16(), %kind, "Request failed");
        let body = ApiResponse {
            code: status.as_u16(),
            message: message.clone(),
            data: serde_json::Value::Null,
            error: Some(ErrorBody { kind, message }),
        };
        (status, Json(body)).into_response()
    }
}
