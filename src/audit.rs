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

use crate::platform::Platform;
use chrono::{DateTime, Utc};
use getset::Getters;
use poise::serenity_prelude::ChannelId;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use tracing::{info, warn};

/// Number of recent lines kept for the dashboard.
const RECENT_LINES: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModAction {
    Kick,
    Ban,
    Unban,
    Timeout,
    Untimeout,
    Mute,
    Unmute,
    Clear,
}

impl fmt::Display for ModAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModAction::Kick => "kick",
            ModAction::Ban => "ban",
            ModAction::Unban => "unban",
            ModAction::Timeout => "timeout",
            ModAction::Untimeout => "untimeout",
            ModAction::Mute => "mute",
            ModAction::Unmute => "unmute",
            ModAction::Clear => "clear",
        };
        f.write_str(name)
    }
}

/**
 * Record of a moderation action, as written to the logs channel.
 */
#[derive(Clone, Debug, Getters)]
pub struct AuditRecord {
    #[getset(get = "pub")]
    action: ModAction,
    #[getset(get = "pub")]
    actor: String,
    #[getset(get = "pub")]
    target: String,
    #[getset(get = "pub")]
    reason: String,
    #[getset(get = "pub")]
    timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(action: ModAction, actor: String, target: String, reason: String) -> AuditRecord {
        Self {
            action,
            actor,
            target,
            reason,
            timestamp: Utc::now(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "🛡️ **{}** | Moderator: {} | Target: {} | Reason: {} | <t:{}:f>",
            self.action,
            self.actor,
            self.target,
            self.reason,
            self.timestamp.timestamp()
        )
    }
}

/**
 * Sink for audit records, and short memory of what the bot did lately.
 */
pub struct AuditLog {
    channel: ChannelId,
    recent: Mutex<VecDeque<String>>,
}

impl AuditLog {
    pub fn new(channel: ChannelId) -> AuditLog {
        Self {
            channel,
            recent: Mutex::new(VecDeque::with_capacity(RECENT_LINES)),
        }
    }

    /**
     * Remembers a line for the dashboard, dropping the oldest one if needed.
     */
    pub fn note(&self, line: impl Into<String>) {
        let line = format!("[{}] {}", Utc::now().to_rfc3339(), line.into());
        let mut recent = self
            .recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if recent.len() == RECENT_LINES {
            recent.pop_front();
        }
        recent.push_back(line);
    }

    /**
     * The remembered lines, oldest first.
     */
    pub fn recent(&self) -> Vec<String> {
        self.recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /**
     * Logs a moderation record, and posts it to the logs channel. Failing to post it doesn't undo
     * nor fail the action it describes.
     */
    pub async fn emit(&self, platform: &dyn Platform, record: &AuditRecord) {
        info!(
            action = %record.action,
            actor = %record.actor,
            target = %record.target,
            reason = %record.reason,
            "Moderation action applied."
        );
        self.note(format!(
            "{} by {} on {}: {}",
            record.action, record.actor, record.target, record.reason
        ));
        if let Err(e) = platform
            .send_message(self.channel, &record.render(), &[])
            .await
        {
            warn!(channel = %self.channel, error = %e, "Could not post the audit record.");
        }
    }
}
