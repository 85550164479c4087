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

/*
 * HTTP dashboard: read-only status endpoints, plus bearer-authenticated actions sharing the bot's
 * state.
 */
mod actions;
mod auth;
mod error;
mod status;

use crate::Data;
use axum::{
    routing::{get, post},
    Router,
};
use tracing::info;

pub fn router(data: Data) -> Router {
    Router::new()
        .route("/", get(status::index))
        .route("/health", get(status::health))
        .route("/api/status", get(status::status))
        .route("/api/leaderboard", get(status::leaderboard))
        .route("/api/members", get(status::members))
        .route("/api/logs", get(status::logs))
        .route("/api/test-leaderboard", post(actions::test_leaderboard))
        .route("/api/reset-leaderboard", post(actions::reset_leaderboard))
        .route("/api/announcement", post(actions::announcement))
        .route("/api/moderation/kick", post(actions::kick))
        .route("/api/moderation/ban", post(actions::ban))
        .route("/api/moderation/unban", post(actions::unban))
        .route("/api/moderation/timeout", post(actions::timeout))
        .route("/api/moderation/untimeout", post(actions::untimeout))
        .route("/api/moderation/mute", post(actions::mute))
        .route("/api/moderation/unmute", post(actions::unmute))
        .route("/api/moderation/clear", post(actions::clear))
        .with_state(data)
}

/**
 * Serves the dashboard on every interface, on the configured port, until the process ends.
 */
pub async fn serve(data: Data) -> std::io::Result<()> {
    let port = data.config.port;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Dashboard listening.");
    axum::serve(listener, router(data)).await
}
