//! Error → HTTP response mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::NoloError;
use crate::protocol::ApiErrorBody;

/// Handler error carrying a [`NoloError`]
#[derive(Debug)]
pub struct ApiError(pub NoloError);

impl From<NoloError> for ApiError {
    fn from(e: NoloError) -> Self {
        Self(e)
    }
}

pub fn status_for(error: &NoloError) -> StatusCode {
    match error {
        NoloError::NotFound(_) => StatusCode::NOT_FOUND,
        NoloError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        NoloError::Forbidden(_) => StatusCode::FORBIDDEN,
        NoloError::MalformedInput(_) | NoloError::InvalidKey(_) | NoloError::Query(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "request rejected");
        }
        (status, Json(ApiErrorBody { error: self.0.to_string() })).into_response()
    }
}
