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

use poise::serenity_prelude::{ChannelId, GuildId, RoleId, UserId};
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Maximum length of a Discord message.
pub const MESSAGE_LIMIT: usize = 2000;

/* Configuration: */

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read the configuration from the environment: {0}")]
    Env(#[from] envy::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/**
 * Data structure encapsulating the configuration of the bot, read from the environment.
 *
 * Each field maps to the upper-case environment variable of the same name (e.g. `guild_id` is read
 * from `GUILD_ID`).
 */
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Clone, Deserialize)]
pub struct BotConfig {
    /// The token used to authenticate against Discord.
    pub discord_token: String,
    /// The guild the bot serves.
    pub guild_id: u64,
    /// The channel where the weekly leaderboard is announced.
    pub leaderboard_channel_id: u64,
    /// The channel where user suggestions are posted for review.
    pub suggestions_channel_id: u64,
    /// The channel receiving the moderation audit log.
    pub logs_channel_id: u64,
    /// The role handed to the most active member of each cycle.
    pub reward_role_id: u64,
    /// The bearer secret required by the dashboard's mutating endpoints.
    pub dashboard_secret: String,
    /// The port the dashboard listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Where the message tally is persisted.
    #[serde(default = "default_tally_path")]
    pub tally_path: PathBuf,
    /// Cron expression (with a leading seconds field, evaluated in UTC) for the leaderboard cycle.
    #[serde(default = "default_leaderboard_schedule")]
    pub leaderboard_schedule: String,
    /// The marker that starts a chat command.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// The name of the role used to mute members. It is created when first needed.
    #[serde(default = "default_muted_role_name")]
    pub muted_role_name: String,
    /// How often the tally is written to disk regardless of activity.
    #[serde(default = "default_flush_interval_minutes")]
    pub flush_interval_minutes: u64,
    /// Upper bound for every single call to Discord.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_port() -> u16 {
    3000
}

fn default_tally_path() -> PathBuf {
    PathBuf::from("tally.json")
}

fn default_leaderboard_schedule() -> String {
    String::from("0 0 0 * * Sun")
}

fn default_command_prefix() -> String {
    String::from("!")
}

fn default_muted_role_name() -> String {
    String::from("Muted")
}

fn default_flush_interval_minutes() -> u64 {
    5
}

fn default_call_timeout_secs() -> u64 {
    15
}

impl BotConfig {
    /**
     * Loads the configuration from the environment, and validates it.
     */
    pub fn from_env() -> Result<BotConfig, ConfigError> {
        let config: BotConfig = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /**
     * Checks the invariants the rest of the bot relies on: non-zero identifiers (Discord
     * identifiers can't be zero), non-empty secrets and prefix, and a parseable schedule.
     */
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ids = [
            ("GUILD_ID", self.guild_id),
            ("LEADERBOARD_CHANNEL_ID", self.leaderboard_channel_id),
            ("SUGGESTIONS_CHANNEL_ID", self.suggestions_channel_id),
            ("LOGS_CHANNEL_ID", self.logs_channel_id),
            ("REWARD_ROLE_ID", self.reward_role_id),
        ];
        if let Some((name, _)) = ids.iter().find(|(_, id)| *id == 0) {
            return Err(ConfigError::Invalid(format!("{name} must not be zero")));
        }
        if self.dashboard_secret.trim().is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "DASHBOARD_SECRET must not be empty",
            )));
        }
        if self.command_prefix.chars().count() != 1 {
            return Err(ConfigError::Invalid(String::from(
                "COMMAND_PREFIX must be a single character",
            )));
        }
        if self.flush_interval_minutes == 0 || self.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid(String::from(
                "FLUSH_INTERVAL_MINUTES and CALL_TIMEOUT_SECS must be positive",
            )));
        }
        self.schedule()?;

        Ok(())
    }

    pub fn schedule(&self) -> Result<cron::Schedule, ConfigError> {
        cron::Schedule::from_str(&self.leaderboard_schedule).map_err(|e| {
            ConfigError::Invalid(format!(
                "LEADERBOARD_SCHEDULE `{}` is not a valid cron expression: {e}",
                self.leaderboard_schedule
            ))
        })
    }

    pub fn prefix(&self) -> char {
        self.command_prefix.chars().next().unwrap_or('!')
    }

    pub fn guild(&self) -> GuildId {
        GuildId::new(self.guild_id)
    }

    pub fn leaderboard_channel(&self) -> ChannelId {
        ChannelId::new(self.leaderboard_channel_id)
    }

    pub fn suggestions_channel(&self) -> ChannelId {
        ChannelId::new(self.suggestions_channel_id)
    }

    pub fn logs_channel(&self) -> ChannelId {
        ChannelId::new(self.logs_channel_id)
    }

    pub fn reward_role(&self) -> RoleId {
        RoleId::new(self.reward_role_id)
    }
}

/* Logging macros: */

/**
 * Macro for logging the usage of a command.
 */
macro_rules! elog_cmd {
    ($ctx:ident) => {
        tracing::info!(
            invocation = %$ctx.invocation_string(),
            author_id = %$ctx.author().id,
            author = %$ctx.author().tag(),
            "Executing command."
        );
    };
}
pub(crate) use elog_cmd;

/**
 * Macro for logging a command that returned an error.
 */
macro_rules! elog_cmd_failure {
    ($ctx:ident, $error:expr) => {
        tracing::warn!(
            invocation = %$ctx.invocation_string(),
            author_id = %$ctx.author().id,
            error = %$error,
            "Command failed."
        );
    };
}
pub(crate) use elog_cmd_failure;

/* Helpers: */

fn mention_regex() -> &'static Regex {
    static MENTION: OnceLock<Regex> = OnceLock::new();
    MENTION.get_or_init(|| Regex::new(r"^(?:<@!?(\d+)>|(\d+))$").expect("valid mention regex"))
}

/**
 * Parses a user given either as a mention (`<@id>`, `<@!id>`) or as a bare identifier.
 */
pub fn parse_user(arg: &str) -> Option<UserId> {
    let captures = mention_regex().captures(arg.trim())?;
    let digits = captures.get(1).or_else(|| captures.get(2))?;
    match digits.as_str().parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(id) => Some(UserId::new(id)),
    }
}

/**
 * Splits text into chunks that fit in a Discord message, breaking at line boundaries whenever
 * possible.
 */
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        // Lines longer than the limit are cut at character boundaries:
        let mut line = line;
        while line.chars().count() > limit {
            let cut = line
                .char_indices()
                .nth(limit)
                .map(|(i, _)| i)
                .unwrap_or(line.len());
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.push(line[..cut].to_string());
            line = &line[cut..];
        }
        let needed = if current.is_empty() { 0 } else { 1 } + line.chars().count();
        if current.chars().count() + needed > limit {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
