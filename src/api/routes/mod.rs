pub mod alerts;
pub mod state;
pub mod triggers;

use axum::{http::StatusCode, Json};
use log::error;
use serde::Serialize;

use crate::error::AlertError;

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Maps domain errors to client errors; everything else is logged and reported as a 500
pub fn error_response(context: &str, e: AlertError) -> ApiError {
    let status = match &e {
        AlertError::NotFound(_) => StatusCode::NOT_FOUND,
        AlertError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        _ => {
            error!("{}: {}", context, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: context.to_string(),
                }),
            );
        }
    };

    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}
