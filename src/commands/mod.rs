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

pub mod help;
pub mod leaderboard;
pub mod moderation;
pub mod suggestion;

use crate::cooldown::Cooldown;
use crate::moderation::Actor;
use crate::{Data, Error};
use poise::serenity_prelude::{ChannelId, Message, User};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/**
 * Errors specific to chat commands (the moderation and leaderboard errors pass through as is).
 */
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("usage: `{0}`")]
    Usage(String),
    #[error("{0}")]
    Rejected(String),
}

/**
 * Every chat command the bot understands. Names are matched exactly.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatCommand {
    TestLeaderboard,
    Suggestion,
    Kick,
    Ban,
    Unban,
    Timeout,
    Untimeout,
    Mute,
    Unmute,
    Clear,
    Help,
}

impl FromStr for ChatCommand {
    type Err = ();

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "testlb" => Ok(ChatCommand::TestLeaderboard),
            "suggestion" => Ok(ChatCommand::Suggestion),
            "kick" => Ok(ChatCommand::Kick),
            "ban" => Ok(ChatCommand::Ban),
            "unban" => Ok(ChatCommand::Unban),
            "timeout" => Ok(ChatCommand::Timeout),
            "untimeout" => Ok(ChatCommand::Untimeout),
            "mute" => Ok(ChatCommand::Mute),
            "unmute" => Ok(ChatCommand::Unmute),
            "clear" => Ok(ChatCommand::Clear),
            "help" => Ok(ChatCommand::Help),
            _ => Err(()),
        }
    }
}

/**
 * Splits a prefixed message into its command name and arguments. Returns `None` for messages
 * that don't start with the prefix, or that only contain it.
 */
pub fn parse(prefix: char, content: &str) -> Option<(&str, Vec<&str>)> {
    let rest = content.strip_prefix(prefix)?;
    let mut words = rest.split_whitespace();
    // "! kick" is not a command:
    if rest.starts_with(char::is_whitespace) {
        return None;
    }
    let name = words.next()?;
    Some((name, words.collect()))
}

/**
 * A chat command being handled: who sent it, where, and with which arguments.
 */
pub struct Invocation<'a> {
    pub data: &'a Data,
    pub author: &'a User,
    pub channel: ChannelId,
    pub args: Vec<&'a str>,
    content: &'a str,
}

impl Invocation<'_> {
    pub fn invocation_string(&self) -> &str {
        self.content
    }

    pub fn author(&self) -> &User {
        self.author
    }

    /**
     * Answers in the channel the command was sent from, without pinging anybody.
     */
    pub async fn reply(&self, text: impl AsRef<str>) -> Result<(), Error> {
        self.data
            .platform
            .send_message(self.channel, text.as_ref(), &[])
            .await?;
        Ok(())
    }

    /**
     * The author as a moderation actor, with their current roles and permissions.
     */
    pub async fn actor(&self) -> Result<Actor, Error> {
        let profile = self.data.platform.member_profile(self.author.id).await?;
        Ok(Actor::Member(profile))
    }

    /**
     * The arguments from the `n`-th onwards, joined back with spaces.
     */
    pub fn rest(&self, n: usize) -> Option<String> {
        let rest = self.args.get(n..)?;
        if rest.is_empty() {
            None
        } else {
            Some(rest.join(" "))
        }
    }
}

/**
 * Entry point for every message the bot sees: counts it, and runs it if it's a command.
 */
pub async fn handle_message(data: &Data, message: &Message) {
    if message.author.bot || message.guild_id != Some(data.config.guild()) {
        return;
    }
    data.tally.record_activity(message.author.id);

    if let Err(e) = route(
        data,
        &message.author,
        message.channel_id,
        &message.content,
    )
    .await
    {
        warn!(author = %message.author.id, error = %e, "Could not answer a chat command.");
    }
}

/**
 * Parses, rate limits and dispatches a chat command. Unknown commands are ignored.
 *
 * Only failures to answer are returned: a failing command is reported to its author instead.
 */
pub async fn route(
    data: &Data,
    author: &User,
    channel: ChannelId,
    content: &str,
) -> Result<(), Error> {
    let Some((name, args)) = parse(data.config.prefix(), content) else {
        return Ok(());
    };
    let Ok(command) = name.parse::<ChatCommand>() else {
        debug!(name, "Ignoring unknown command.");
        return Ok(());
    };

    let invocation = Invocation {
        data,
        author,
        channel,
        args,
        content,
    };

    if let Cooldown::Wait(remaining) = data.cooldowns.check_and_stamp(author.id, name) {
        return invocation
            .reply(format!(
                "⏳ Please wait {:.1} more seconds before using `{}{name}` again.",
                remaining.as_secs_f32(),
                data.config.prefix()
            ))
            .await;
    }

    let result = match command {
        ChatCommand::TestLeaderboard => leaderboard::testlb(&invocation).await,
        ChatCommand::Suggestion => suggestion::suggestion(&invocation).await,
        ChatCommand::Kick => moderation::kick(&invocation).await,
        ChatCommand::Ban => moderation::ban(&invocation).await,
        ChatCommand::Unban => moderation::unban(&invocation).await,
        ChatCommand::Timeout => moderation::timeout(&invocation).await,
        ChatCommand::Untimeout => moderation::untimeout(&invocation).await,
        ChatCommand::Mute => moderation::mute(&invocation).await,
        ChatCommand::Unmute => moderation::unmute(&invocation).await,
        ChatCommand::Clear => moderation::clear(&invocation).await,
        ChatCommand::Help => help::help_text(&invocation).await,
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) => invocation.reply(format!("**Error:** {e}.")).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_data, test_user as user};
    use poise::serenity_prelude::UserId;
    use tempfile::tempdir;

    #[test]
    fn parses_name_and_arguments() {
        assert_eq!(
            parse('!', "!kick <@2>  being rude"),
            Some(("kick", vec!["<@2>", "being", "rude"]))
        );
        assert_eq!(parse('!', "!help"), Some(("help", vec![])));
        assert_eq!(parse('!', "hello !kick"), None);
        assert_eq!(parse('!', "!"), None);
        assert_eq!(parse('!', "! kick"), None);
    }

    #[test]
    fn command_names_match_exactly() {
        assert_eq!("kick".parse::<ChatCommand>(), Ok(ChatCommand::Kick));
        assert_eq!("testlb".parse::<ChatCommand>(), Ok(ChatCommand::TestLeaderboard));
        assert!("Kick".parse::<ChatCommand>().is_err());
        assert!("kickme".parse::<ChatCommand>().is_err());
    }

    #[tokio::test]
    async fn unknown_commands_are_ignored() {
        let dir = tempdir().unwrap();
        let (platform, data) = test_data(dir.path());

        route(&data, &user(5), ChannelId::new(50), "!dance")
            .await
            .unwrap();

        assert!(platform.sent().is_empty());
    }

    #[tokio::test]
    async fn repeated_commands_hit_the_cooldown() {
        let dir = tempdir().unwrap();
        let (platform, data) = test_data(dir.path());
        let channel = ChannelId::new(50);

        route(&data, &user(5), channel, "!help")
            .await
            .unwrap();
        route(&data, &user(5), channel, "!help")
            .await
            .unwrap();

        let sent = platform.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].content.starts_with("⏳"));
        assert!(sent[1].content.contains("`!help`"));
    }

    #[tokio::test]
    async fn failures_are_reported_to_the_author() {
        let dir = tempdir().unwrap();
        let (platform, data) = test_data(dir.path());
        platform.add_member(UserId::new(5), &[]);

        route(&data, &user(5), ChannelId::new(50), "!kick <@6>")
            .await
            .unwrap();

        let sent = platform.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].content.starts_with("**Error:**"));
        assert!(sent[0].content.contains("Kick Members"));
    }
}
