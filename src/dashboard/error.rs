/*
 *  Pheme - Discord bot for tallying and rewarding community activity.
 *  Copyright (C) 2025  Manuel de Castro
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use crate::leaderboard::CycleError;
use crate::moderation::ModerationError;
use crate::mute::MuteError;
use crate::platform::PlatformError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/**
 * Every way a dashboard request can fail. Rendered as `{"error": "..."}`.
 */
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Moderation(#[from] ModerationError),
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

fn platform_status(error: &PlatformError) -> StatusCode {
    match error {
        PlatformError::NotFound(_) => StatusCode::NOT_FOUND,
        PlatformError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        PlatformError::Discord(_) | PlatformError::Rejected(_) => StatusCode::BAD_GATEWAY,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Moderation(e) => match e {
                ModerationError::PermissionDenied(_) | ModerationError::Hierarchy(_) => {
                    StatusCode::FORBIDDEN
                }
                ModerationError::UnknownTarget(_)
                | ModerationError::InvalidDuration
                | ModerationError::InvalidAmount => StatusCode::BAD_REQUEST,
                ModerationError::Mute(MuteError::Platform(e)) | ModerationError::Platform(e) => {
                    platform_status(e)
                }
                ModerationError::Mute(_) => StatusCode::CONFLICT,
            },
            ApiError::Cycle(CycleError::AlreadyRunning) => StatusCode::CONFLICT,
            ApiError::Cycle(CycleError::Destination(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Platform(e) => platform_status(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = %status, error = %self, "Dashboard request failed.");
        }
        let body = serde_json::json!({ "error": self.to_string() });

        (status, Json(body)).into_response()
    }
}
