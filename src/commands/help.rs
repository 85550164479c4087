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

use crate::commands::Invocation;
use crate::{Context, Error};

/**
 * The command list, with `prefix` in front of every chat command.
 */
pub fn help_message(prefix: char) -> String {
    format!(
        "📖 **Pheme commands**
`{p}help`: shows this message.
`{p}suggestion <text>`: sends a suggestion to the staff.
`{p}testlb`: runs the leaderboard cycle now (Manage Server).
`{p}kick @user [reason]`: kicks a member (Kick Members).
`{p}ban @user [reason]`: bans a user (Ban Members).
`{p}unban <id> [reason]`: lifts a ban (Ban Members).
`{p}timeout @user [minutes] [reason]`: times a member out, 10 minutes by default (Timeout Members).
`{p}untimeout @user [reason]`: lifts a timeout (Timeout Members).
`{p}mute @user [reason]`: mutes a member, keeping their roles aside (Manage Roles).
`{p}unmute @user [reason]`: unmutes a member and gives their roles back (Manage Roles).
`{p}clear <amount>`: deletes the last 1 to 100 messages of the channel (Manage Messages).
Slash commands: `/leaderboard` shows the current standings, `/help` shows this message.",
        p = prefix
    )
}

#[pheme::log_cmd]
pub async fn help_text(inv: &Invocation<'_>) -> Result<(), Error> {
    inv.reply(help_message(inv.data.config.prefix())).await
}

#[poise::command(
    slash_command,
    guild_only,
    ephemeral,
    description_localized("en-US", "Get help for using Pheme.")
)]
#[pheme::log_cmd]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    ctx.reply(help_message(ctx.data().config.prefix())).await?;

    Ok(())
}
