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

use crate::dashboard::auth::Authorized;
use crate::dashboard::error::ApiError;
use crate::leaderboard::CycleReport;
use crate::moderation::Actor;
use crate::utils::{parse_user, MESSAGE_LIMIT};
use crate::Data;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use poise::serenity_prelude::{ChannelId, UserId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::info;

/**
 * The request body, with malformed JSON turned into a 400 carrying the usual error shape.
 */
fn body<T: DeserializeOwned>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn user_id(raw: &str) -> Result<UserId, ApiError> {
    parse_user(raw).ok_or_else(|| ApiError::BadRequest(format!("`{raw}` is not a user id")))
}

#[derive(Serialize)]
pub struct Done {
    success: bool,
    message: String,
}

fn done(message: impl Into<String>) -> Json<Done> {
    Json(Done {
        success: true,
        message: message.into(),
    })
}

pub async fn test_leaderboard(
    _: Authorized,
    State(data): State<Data>,
) -> Result<Json<CycleReport>, ApiError> {
    info!("Leaderboard cycle requested from the dashboard.");
    Ok(Json(data.leaderboard.run_cycle().await?))
}

pub async fn reset_leaderboard(_: Authorized, State(data): State<Data>) -> Json<Done> {
    data.tally.reset();
    data.audit.note("Leaderboard reset from the dashboard.");
    done("Leaderboard reset.")
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnnouncementChannel {
    Leaderboard,
    Suggestions,
    Logs,
}

#[derive(Deserialize)]
pub struct AnnouncementRequest {
    channel: AnnouncementChannel,
    message: String,
}

pub async fn announcement(
    _: Authorized,
    State(data): State<Data>,
    payload: Result<Json<AnnouncementRequest>, JsonRejection>,
) -> Result<Json<Done>, ApiError> {
    let request = body(payload)?;
    let message = request.message.trim();
    if message.is_empty() || message.chars().count() > MESSAGE_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "the message must have between 1 and {MESSAGE_LIMIT} characters"
        )));
    }
    let channel = match request.channel {
        AnnouncementChannel::Leaderboard => data.config.leaderboard_channel(),
        AnnouncementChannel::Suggestions => data.config.suggestions_channel(),
        AnnouncementChannel::Logs => data.config.logs_channel(),
    };

    data.platform.send_message(channel, message, &[]).await?;
    data.audit
        .note(format!("Announcement sent to the {:?} channel from the dashboard.", request.channel));

    Ok(done("Announcement sent."))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRequest {
    user_id: String,
    reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutRequest {
    user_id: String,
    duration: i64,
    reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearRequest {
    channel_id: String,
    amount: i64,
}

pub async fn kick(
    _: Authorized,
    State(data): State<Data>,
    payload: Result<Json<TargetRequest>, JsonRejection>,
) -> Result<Json<Done>, ApiError> {
    let request = body(payload)?;
    let user = user_id(&request.user_id)?;
    data.moderator
        .kick(&Actor::Dashboard, user, request.reason.as_deref())
        .await?;
    Ok(done(format!("Kicked {user}.")))
}

pub async fn ban(
    _: Authorized,
    State(data): State<Data>,
    payload: Result<Json<TargetRequest>, JsonRejection>,
) -> Result<Json<Done>, ApiError> {
    let request = body(payload)?;
    let user = user_id(&request.user_id)?;
    data.moderator
        .ban(&Actor::Dashboard, user, request.reason.as_deref())
        .await?;
    Ok(done(format!("Banned {user}.")))
}

pub async fn unban(
    _: Authorized,
    State(data): State<Data>,
    payload: Result<Json<TargetRequest>, JsonRejection>,
) -> Result<Json<Done>, ApiError> {
    let request = body(payload)?;
    let user = user_id(&request.user_id)?;
    data.moderator
        .unban(&Actor::Dashboard, user, request.reason.as_deref())
        .await?;
    Ok(done(format!("Unbanned {user}.")))
}

pub async fn timeout(
    _: Authorized,
    State(data): State<Data>,
    payload: Result<Json<TimeoutRequest>, JsonRejection>,
) -> Result<Json<Done>, ApiError> {
    let request = body(payload)?;
    let user = user_id(&request.user_id)?;
    data.moderator
        .timeout(
            &Actor::Dashboard,
            user,
            request.duration,
            request.reason.as_deref(),
        )
        .await?;
    Ok(done(format!(
        "Timed out {user} for {} minutes.",
        request.duration
    )))
}

pub async fn untimeout(
    _: Authorized,
    State(data): State<Data>,
    payload: Result<Json<TargetRequest>, JsonRejection>,
) -> Result<Json<Done>, ApiError> {
    let request = body(payload)?;
    let user = user_id(&request.user_id)?;
    data.moderator
        .untimeout(&Actor::Dashboard, user, request.reason.as_deref())
        .await?;
    Ok(done(format!("Lifted the timeout of {user}.")))
}

pub async fn mute(
    _: Authorized,
    State(data): State<Data>,
    payload: Result<Json<TargetRequest>, JsonRejection>,
) -> Result<Json<Done>, ApiError> {
    let request = body(payload)?;
    let user = user_id(&request.user_id)?;
    data.moderator
        .mute(&Actor::Dashboard, user, request.reason.as_deref())
        .await?;
    Ok(done(format!("Muted {user}.")))
}

pub async fn unmute(
    _: Authorized,
    State(data): State<Data>,
    payload: Result<Json<TargetRequest>, JsonRejection>,
) -> Result<Json<Done>, ApiError> {
    let request = body(payload)?;
    let user = user_id(&request.user_id)?;
    data.moderator
        .unmute(&Actor::Dashboard, user, request.reason.as_deref())
        .await?;
    Ok(done(format!("Unmuted {user}.")))
}

pub async fn clear(
    _: Authorized,
    State(data): State<Data>,
    payload: Result<Json<ClearRequest>, JsonRejection>,
) -> Result<Json<Done>, ApiError> {
    let request = body(payload)?;
    let channel = match request.channel_id.trim().parse::<u64>() {
        Ok(id) if id != 0 => ChannelId::new(id),
        _ => {
            return Err(ApiError::BadRequest(format!(
                "`{}` is not a channel id",
                request.channel_id
            )))
        }
    };
    let deleted = data
        .moderator
        .clear(&Actor::Dashboard, channel, request.amount)
        .await?;
    Ok(done(format!("Deleted {deleted} messages.")))
}
