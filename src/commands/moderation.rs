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

use crate::commands::{CommandError, Invocation};
use crate::moderation::{parse_clear_amount, require, DEFAULT_TIMEOUT_MINUTES};
use crate::utils::parse_user;
use crate::Error;
use poise::serenity_prelude::{Permissions, UserId};

/**
 * The user named by the first argument, or a usage error showing `usage`.
 */
fn target(inv: &Invocation<'_>, usage: &str) -> Result<UserId, CommandError> {
    inv.args
        .first()
        .and_then(|arg| parse_user(arg))
        .ok_or_else(|| CommandError::Usage(format!("{}{usage}", inv.data.config.prefix())))
}

#[pheme::log_cmd]
pub async fn kick(inv: &Invocation<'_>) -> Result<(), Error> {
    let user = target(inv, "kick @user [reason]")?;
    let actor = inv.actor().await?;
    let reason = inv.rest(1);

    inv.data
        .moderator
        .kick(&actor, user, reason.as_deref())
        .await?;

    inv.reply(format!("👢 <@{user}> was kicked.")).await
}

#[pheme::log_cmd]
pub async fn ban(inv: &Invocation<'_>) -> Result<(), Error> {
    let user = target(inv, "ban @user [reason]")?;
    let actor = inv.actor().await?;
    let reason = inv.rest(1);

    inv.data
        .moderator
        .ban(&actor, user, reason.as_deref())
        .await?;

    inv.reply(format!("🔨 <@{user}> was banned.")).await
}

#[pheme::log_cmd]
pub async fn unban(inv: &Invocation<'_>) -> Result<(), Error> {
    let user = target(inv, "unban <id> [reason]")?;
    let actor = inv.actor().await?;
    let reason = inv.rest(1);

    inv.data
        .moderator
        .unban(&actor, user, reason.as_deref())
        .await?;

    inv.reply(format!("🕊️ <@{user}> was unbanned.")).await
}

/**
 * `timeout @user [minutes] [reason]`: when the second argument isn't a number, it's part of the
 * reason and the default duration applies.
 */
#[pheme::log_cmd]
pub async fn timeout(inv: &Invocation<'_>) -> Result<(), Error> {
    let user = target(inv, "timeout @user [minutes] [reason]")?;
    let actor = inv.actor().await?;
    let (minutes, reason) = match inv.args.get(1).map(|arg| arg.parse::<i64>()) {
        Some(Ok(minutes)) => (minutes, inv.rest(2)),
        _ => (DEFAULT_TIMEOUT_MINUTES as i64, inv.rest(1)),
    };

    inv.data
        .moderator
        .timeout(&actor, user, minutes, reason.as_deref())
        .await?;

    inv.reply(format!("⏲️ <@{user}> was timed out for {minutes} minutes."))
        .await
}

#[pheme::log_cmd]
pub async fn untimeout(inv: &Invocation<'_>) -> Result<(), Error> {
    let user = target(inv, "untimeout @user [reason]")?;
    let actor = inv.actor().await?;
    let reason = inv.rest(1);

    inv.data
        .moderator
        .untimeout(&actor, user, reason.as_deref())
        .await?;

    inv.reply(format!("🔔 <@{user}>'s timeout was lifted.")).await
}

#[pheme::log_cmd]
pub async fn mute(inv: &Invocation<'_>) -> Result<(), Error> {
    let user = target(inv, "mute @user [reason]")?;
    let actor = inv.actor().await?;
    let reason = inv.rest(1);

    inv.data
        .moderator
        .mute(&actor, user, reason.as_deref())
        .await?;

    inv.reply(format!("🔇 <@{user}> was muted.")).await
}

#[pheme::log_cmd]
pub async fn unmute(inv: &Invocation<'_>) -> Result<(), Error> {
    let user = target(inv, "unmute @user [reason]")?;
    let actor = inv.actor().await?;
    let reason = inv.rest(1);

    inv.data
        .moderator
        .unmute(&actor, user, reason.as_deref())
        .await?;

    inv.reply(format!("🔊 <@{user}> was unmuted.")).await
}

#[pheme::log_cmd]
pub async fn clear(inv: &Invocation<'_>) -> Result<(), Error> {
    let actor = inv.actor().await?;
    require(&actor, Permissions::MANAGE_MESSAGES, "Manage Messages")?;
    let Some(arg) = inv.args.first() else {
        return Err(CommandError::Usage(format!("{}clear <amount>", inv.data.config.prefix())).into());
    };
    let amount = parse_clear_amount(arg)?;

    let deleted = inv
        .data
        .moderator
        .clear(&actor, inv.channel, amount as i64)
        .await?;

    inv.reply(format!("🧹 Deleted {deleted} messages.")).await
}

#[cfg(test)]
mod tests {
    use crate::commands::route;
    use crate::test_utils::{test_data, test_user, FakePlatform};
    use crate::Data;
    use poise::serenity_prelude::{ChannelId, Permissions, RoleId, UserId};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    const HERE: ChannelId = ChannelId::new(50);

    /// A guild with a moderator (5, position 10) and a regular member (6, position 1).
    fn guild(permissions: Permissions) -> (TempDir, Arc<FakePlatform>, Data) {
        let dir = tempdir().unwrap();
        let (platform, data) = test_data(dir.path());
        platform.add_member(UserId::new(5), &[RoleId::new(105)]);
        platform.set_position(RoleId::new(105), 10);
        platform.grant(UserId::new(5), permissions);
        platform.add_member(UserId::new(6), &[RoleId::new(106)]);
        platform.set_position(RoleId::new(106), 1);
        (dir, platform, data)
    }

    async fn run(data: &Data, content: &str) {
        route(data, &test_user(5), HERE, content)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn kick_by_mention_with_reason() {
        let (_dir, platform, data) = guild(Permissions::KICK_MEMBERS);

        run(&data, "!kick <@!6> posting spam").await;

        assert_eq!(platform.kicked(), vec![UserId::new(6)]);
        let sent = platform.sent();
        let audit = sent
            .iter()
            .find(|m| m.channel == data.config.logs_channel())
            .unwrap();
        assert!(audit.content.contains("posting spam"));
        assert!(sent.last().unwrap().content.contains("was kicked"));
    }

    #[tokio::test]
    async fn missing_target_shows_the_usage() {
        let (_dir, platform, data) = guild(Permissions::BAN_MEMBERS);

        run(&data, "!ban someone").await;

        assert!(platform.banned().is_empty());
        assert!(platform.sent()[0]
            .content
            .contains("usage: `!ban @user [reason]`"));
    }

    #[tokio::test]
    async fn timeout_defaults_to_ten_minutes() {
        let (_dir, platform, data) = guild(Permissions::MODERATE_MEMBERS);

        run(&data, "!timeout <@6> calm down").await;

        assert_eq!(platform.timeouts(), vec![UserId::new(6)]);
        let sent = platform.sent();
        assert!(sent.iter().any(|m| m.content.contains("calm down (10 min)")));
        assert!(sent.last().unwrap().content.contains("10 minutes"));
    }

    #[tokio::test]
    async fn timeout_rejects_out_of_range_durations() {
        let (_dir, platform, data) = guild(Permissions::MODERATE_MEMBERS);

        run(&data, "!timeout <@6> 2000").await;

        assert!(platform.timeouts().is_empty());
        assert!(platform.sent()[0].content.starts_with("**Error:**"));
    }

    #[tokio::test]
    async fn mute_then_unmute_restores_roles() {
        let (_dir, platform, data) = guild(Permissions::MANAGE_ROLES);

        run(&data, "!mute 6").await;
        assert!(data.moderator.mutes().is_muted(UserId::new(6)));
        assert!(!platform.roles_of(UserId::new(6)).contains(&RoleId::new(106)));

        // The cooldown applies per command, so unmuting right away is fine:
        run(&data, "!unmute 6 served their time").await;
        assert_eq!(platform.roles_of(UserId::new(6)), vec![RoleId::new(106)]);
        assert!(platform.sent().iter().any(|m| {
            m.channel == data.config.logs_channel() && m.content.contains("served their time")
        }));
    }

    #[tokio::test]
    async fn clear_checks_the_permission_before_the_amount() {
        let (_dir, platform, data) = guild(Permissions::empty());

        run(&data, "!clear 101").await;

        assert!(platform.purged().is_empty());
        let sent = platform.sent();
        assert!(sent[0].content.contains("Manage Messages"));
        assert!(!sent[0].content.contains("between 1 and 100"));
    }

    #[tokio::test]
    async fn clear_rejects_out_of_range_amounts() {
        let (_dir, platform, data) = guild(Permissions::MANAGE_MESSAGES);

        run(&data, "!clear 101").await;

        assert!(platform.purged().is_empty());
        assert!(platform.sent()[0].content.contains("between 1 and 100"));
    }

    #[tokio::test]
    async fn clear_purges_the_current_channel() {
        let (_dir, platform, data) = guild(Permissions::MANAGE_MESSAGES);

        run(&data, "!clear 20").await;

        assert_eq!(platform.purged(), vec![(HERE, 20)]);
        assert!(platform.sent().last().unwrap().content.contains("Deleted 20"));
    }
}
