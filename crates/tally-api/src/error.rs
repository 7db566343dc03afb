use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use tally_core::Error as CoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("Unauthorized: {0}")]
    MissingToken(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken(_) => StatusCode::UNAUTHORIZED,
            Self::Core(error) => match error {
                CoreError::InvalidPin | CoreError::Expired | CoreError::Unauthorized(_) => {
                    StatusCode::UNAUTHORIZED
                }
                CoreError::AlreadyActive | CoreError::AlreadyIngested => StatusCode::CONFLICT,
                CoreError::Validation(_) | CoreError::IncompleteResolution(_) => {
                    StatusCode::BAD_REQUEST
                }
                CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                CoreError::Storage(_) | CoreError::Serialization(_) | CoreError::Io(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
