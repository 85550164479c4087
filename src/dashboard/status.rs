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

use crate::dashboard::error::ApiError;
use crate::platform::MemberSummary;
use crate::tally::Tally;
use crate::Data;
use axum::{extract::State, response::Html, Json};
use serde::Serialize;
use std::fs;

/**
 * Resident memory of the process in bytes, where the platform exposes it.
 */
pub fn resident_memory() -> Option<u64> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kilobytes: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kilobytes * 1024)
}

pub async fn index(State(data): State<Data>) -> Html<String> {
    let snapshot = data.tally.snapshot();
    let bot = data
        .platform
        .bot_tag()
        .unwrap_or_else(|| String::from("offline"));
    Html(format!(
        "<!DOCTYPE html>
<html>
<head><meta charset=\"utf-8\"><title>Pheme</title></head>
<body>
<h1>Pheme is running</h1>
<ul>
<li>Bot: {bot}</li>
<li>Active users this week: {}</li>
<li>Messages this week: {}</li>
<li>Uptime: {} s</li>
</ul>
</body>
</html>",
        snapshot.entries.len(),
        snapshot.total,
        data.started.elapsed().as_secs()
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    status: &'static str,
    uptime: u64,
    users: usize,
    bot_online: bool,
    memory: Option<u64>,
}

pub async fn health(State(data): State<Data>) -> Json<Health> {
    Json(Health {
        status: "ok",
        uptime: data.started.elapsed().as_secs(),
        users: data.tally.snapshot().entries.len(),
        bot_online: data.platform.bot_tag().is_some(),
        memory: resident_memory(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    online: bool,
    members: Option<u64>,
    users: usize,
    messages: u64,
    uptime: u64,
    bot_tag: Option<String>,
    muted_users: usize,
}

pub async fn status(State(data): State<Data>) -> Json<Status> {
    let snapshot = data.tally.snapshot();
    let bot_tag = data.platform.bot_tag();
    Json(Status {
        online: bot_tag.is_some(),
        members: data.platform.member_count(),
        users: snapshot.entries.len(),
        messages: snapshot.total,
        uptime: data.started.elapsed().as_secs(),
        bot_tag,
        muted_users: data.moderator.mutes().muted_count(),
    })
}

pub async fn leaderboard(State(data): State<Data>) -> Json<Tally> {
    Json(data.tally.snapshot().entries)
}

pub async fn members(State(data): State<Data>) -> Result<Json<Vec<MemberSummary>>, ApiError> {
    Ok(Json(data.platform.members().await?))
}

#[derive(Serialize)]
pub struct Logs {
    logs: Vec<String>,
}

pub async fn logs(State(data): State<Data>) -> Json<Logs> {
    Json(Logs {
        logs: data.audit.recent(),
    })
}
