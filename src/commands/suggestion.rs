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
use crate::platform::Platform;
use crate::utils::MESSAGE_LIMIT;
use crate::Error;
use poise::serenity_prelude::{ChannelId, MessageId, UserId};
use tracing::warn;

/// Reactions added to every suggestion, for voting.
pub const VOTES: [&str; 2] = ["👍", "👎"];

/// Room kept for the header of the posted suggestion.
const HEADER_ROOM: usize = 100;

/**
 * Posts a suggestion to the review channel and adds the voting reactions. The author is
 * mentioned, but not pinged.
 *
 * Failing to react doesn't fail the suggestion, which was already posted.
 */
pub async fn submit_suggestion(
    platform: &dyn Platform,
    channel: ChannelId,
    author: UserId,
    text: &str,
) -> Result<MessageId, Error> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CommandError::Rejected(String::from("the suggestion is empty")).into());
    }
    if text.chars().count() > MESSAGE_LIMIT - HEADER_ROOM {
        return Err(CommandError::Rejected(format!(
            "suggestions can't be longer than {} characters",
            MESSAGE_LIMIT - HEADER_ROOM
        ))
        .into());
    }

    let posted = platform
        .send_message(
            channel,
            &format!("💡 **New suggestion** from <@{author}>:\n{text}"),
            &[],
        )
        .await?;
    for vote in VOTES {
        if let Err(e) = platform.react(channel, posted, vote).await {
            warn!(message = %posted, error = %e, "Could not add a voting reaction.");
        }
    }

    Ok(posted)
}

#[pheme::log_cmd]
pub async fn suggestion(inv: &Invocation<'_>) -> Result<(), Error> {
    let Some(text) = inv.rest(0) else {
        return Err(CommandError::Usage(format!(
            "{}suggestion <text>",
            inv.data.config.prefix()
        ))
        .into());
    };

    submit_suggestion(
        inv.data.platform.as_ref(),
        inv.data.config.suggestions_channel(),
        inv.author.id,
        &text,
    )
    .await?;

    inv.reply("✅ Thanks! Your suggestion was sent to the staff.")
        .await
}
