/*
 *  Copyright 2025-2026 Runnerd Contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Maps internal errors to the HTTP status/body the API surface returns.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use runnerd::error::{QueueError, SupervisorError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Queue(QueueError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Queue(QueueError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            ApiError::Queue(QueueError::Conflict) => StatusCode::CONFLICT,
            ApiError::Queue(QueueError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Queue(QueueError::StorageUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Queue(QueueError::Database(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Supervisor(SupervisorError::LockUnavailable) => StatusCode::CONFLICT,
            ApiError::Supervisor(SupervisorError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Supervisor(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
