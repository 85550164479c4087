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
use crate::leaderboard::{CycleReport, LEADERBOARD_SIZE};
use crate::moderation::require;
use crate::tally::RankedEntry;
use crate::{Context, Error};
use poise::serenity_prelude::Permissions;

/**
 * Current standings, as shown by `/leaderboard`.
 */
pub fn standings(ranking: &[RankedEntry], total: u64) -> String {
    if ranking.is_empty() {
        return String::from("📭 Nobody has posted anything this week yet.");
    }
    let mut text = String::from("📊 **Current standings**\n");
    for entry in ranking {
        text += format!("**{}.** <@{}>: {}\n", entry.rank, entry.user, entry.count).as_str();
    }
    text += format!("Total messages so far: **{total}**").as_str();
    text
}

fn summary(report: &CycleReport) -> String {
    let mut text = match report.winner {
        Some(winner) => format!(
            "✅ Leaderboard cycle done: {} members ranked, {} messages, reward role given to <@{winner}>.",
            report.ranking.len(),
            report.total_messages
        ),
        None if report.ranking.is_empty() => {
            String::from("✅ Leaderboard cycle done: no activity was recorded, nothing was reset.")
        }
        None => format!(
            "⚠️ Leaderboard cycle done: {} members ranked, but the reward role could not be given.",
            report.ranking.len()
        ),
    };
    if !report.strip_failures.is_empty() {
        text += format!(
            "\n⚠️ The reward role could not be removed from {} member(s).",
            report.strip_failures.len()
        )
        .as_str();
    }
    if !report.announced {
        text += "\n⚠️ The announcement could not be posted.";
    }
    text
}

#[pheme::log_cmd]
pub async fn testlb(inv: &Invocation<'_>) -> Result<(), Error> {
    let actor = inv.actor().await?;
    require(&actor, Permissions::MANAGE_GUILD, "Manage Server")?;

    let report = inv.data.leaderboard.run_cycle().await?;

    inv.reply(summary(&report)).await
}

#[poise::command(
    slash_command,
    guild_only,
    ephemeral,
    description_localized("en-US", "Show this week's message leaderboard so far.")
)]
#[pheme::log_cmd]
pub async fn leaderboard(ctx: Context<'_>) -> Result<(), Error> {
    let snapshot = ctx.data().tally.snapshot();
    let ranking = snapshot.ranked(LEADERBOARD_SIZE);

    ctx.reply(standings(&ranking, snapshot.total)).await?;

    Ok(())
}
