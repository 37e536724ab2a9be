//! JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use geo_common::GeoError;
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

/// Handler error carrying a [`GeoError`].
#[derive(Debug)]
pub struct ApiError(pub GeoError);

pub type ApiResult<T> = Result<T, ApiError>;

impl<E: Into<GeoError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, code = self.0.error_code(), "Request failed");
        } else {
            warn!(error = %self.0, code = self.0.error_code(), "Rejected request");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            code: self.0.error_code(),
        };
        (status, Json(body)).into_response()
    }
}
