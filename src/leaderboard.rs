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

use crate::audit::AuditLog;
use crate::platform::{Platform, PlatformError};
use crate::tally::{RankedEntry, TallyStore};
use crate::utils::{split_message, MESSAGE_LIMIT};
use poise::serenity_prelude::{ChannelId, RoleId, UserId};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// How many members make it to the leaderboard.
pub const LEADERBOARD_SIZE: usize = 10;

const MEDALS: [&str; 3] = ["🥇", "🥈", "🥉"];

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("a leaderboard cycle is already running")]
    AlreadyRunning,
    #[error("the leaderboard channel is unavailable: {0}")]
    Destination(PlatformError),
}

/**
 * What a cycle did. Best-effort steps report their failures here instead of aborting the cycle.
 */
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// Members the reward role was taken from.
    pub stripped: Vec<UserId>,
    /// Members the reward role could not be taken from.
    pub strip_failures: Vec<UserId>,
    /// Whether the current holders could be listed at all.
    pub holders_listed: bool,
    pub ranking: Vec<RankedEntry>,
    pub total_messages: u64,
    pub announced: bool,
    /// The member that received the reward role, if granting it worked.
    pub winner: Option<UserId>,
    pub reset: bool,
}

/**
 * The text of a leaderboard announcement.
 */
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Announcement {
    /// Header plus the top three, with their medals.
    pub podium: String,
    /// Ranks four to ten, and the total of messages.
    pub details: String,
}

impl Announcement {
    pub fn new(ranking: &[RankedEntry], total: u64) -> Announcement {
        let mut podium = String::from("🏆 **Weekly activity leaderboard** 🏆\n");
        for (entry, medal) in ranking.iter().zip(MEDALS) {
            podium += format!(
                "{medal} <@{}> with **{}** {}\n",
                entry.user,
                entry.count,
                messages(entry.count)
            )
            .as_str();
        }
        if let Some(winner) = ranking.first() {
            podium += format!("Congratulations <@{}>, enjoy your reward role this week!", winner.user)
                .as_str();
        }

        let mut details = String::new();
        for entry in ranking.iter().skip(MEDALS.len()) {
            details += format!(
                "**{}.** <@{}>: {} {}\n",
                entry.rank,
                entry.user,
                entry.count,
                messages(entry.count)
            )
            .as_str();
        }
        details += format!("Total messages this week: **{total}**").as_str();

        Self {
            podium: podium.trim_end().to_string(),
            details,
        }
    }

    /**
     * The announcement, cut into messages Discord accepts.
     */
    pub fn messages(&self) -> Vec<String> {
        let mut chunks = split_message(&self.podium, MESSAGE_LIMIT);
        chunks.extend(split_message(&self.details, MESSAGE_LIMIT));
        chunks
    }
}

fn messages(count: u64) -> &'static str {
    if count == 1 {
        "message"
    } else {
        "messages"
    }
}

/**
 * Marks a cycle as running for as long as it lives.
 */
pub(crate) struct CycleGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/**
 * The weekly leaderboard: ranks the tally, moves the reward role to the most active member,
 * announces the results and starts a new week.
 */
pub struct Leaderboard {
    platform: Arc<dyn Platform>,
    tally: Arc<TallyStore>,
    audit: Arc<AuditLog>,
    channel: ChannelId,
    reward_role: RoleId,
    running: AtomicBool,
}

impl Leaderboard {
    pub fn new(
        platform: Arc<dyn Platform>,
        tally: Arc<TallyStore>,
        audit: Arc<AuditLog>,
        channel: ChannelId,
        reward_role: RoleId,
    ) -> Leaderboard {
        Self {
            platform,
            tally,
            audit,
            channel,
            reward_role,
            running: AtomicBool::new(false),
        }
    }

    pub(crate) fn begin(&self) -> Option<CycleGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard {
                running: &self.running,
            })
    }

    /**
     * Runs a full cycle. Only one cycle runs at a time: overlapping calls are rejected.
     */
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let Some(_guard) = self.begin() else {
            warn!("Leaderboard cycle requested while another one is running.");
            return Err(CycleError::AlreadyRunning);
        };

        if let Err(e) = self.platform.resolve_channel(self.channel).await {
            error!(channel = %self.channel, error = %e, "Leaderboard channel unavailable, cycle aborted.");
            return Err(CycleError::Destination(e));
        }

        let mut report = CycleReport::default();
        self.strip_reward_role(&mut report).await;

        // Counts are taken, not copied: messages posted while the results go out belong to the
        // new week.
        let snapshot = self.tally.take();
        report.reset = !snapshot.entries.is_empty();
        report.ranking = snapshot.ranked(LEADERBOARD_SIZE);
        report.total_messages = snapshot.total;

        if report.ranking.is_empty() {
            report.announced = self
                .deliver(
                    "📭 No activity was recorded this week, so there is no leaderboard.",
                    &[],
                )
                .await;
            self.audit.note("Leaderboard cycle: no activity recorded.");
            info!("Leaderboard cycle finished without activity.");
            return Ok(report);
        }

        let announcement = Announcement::new(&report.ranking, report.total_messages);
        let mentioned: Vec<UserId> = report.ranking.iter().map(|e| e.user).collect();
        report.announced = true;
        for message in announcement.messages() {
            report.announced &= self.deliver(&message, &mentioned).await;
        }

        let winner = report.ranking[0].user;
        match self
            .platform
            .add_role(winner, self.reward_role, "Most active member of the week.")
            .await
        {
            Ok(()) => report.winner = Some(winner),
            Err(e) => {
                warn!(user = %winner, error = %e, "Could not grant the reward role.")
            }
        }

        self.audit.note(format!(
            "Leaderboard cycle: {} members ranked, {} messages, winner <@{}>.",
            report.ranking.len(),
            report.total_messages,
            winner
        ));
        info!(
            ranked = report.ranking.len(),
            total = report.total_messages,
            winner = %winner,
            strip_failures = report.strip_failures.len(),
            "Leaderboard cycle finished."
        );

        Ok(report)
    }

    /**
     * Takes the reward role from everyone holding it. Failures are collected, not fatal.
     */
    async fn strip_reward_role(&self, report: &mut CycleReport) {
        let holders = match self.platform.role_holders(self.reward_role).await {
            Ok(holders) => holders,
            Err(e) => {
                warn!(role = %self.reward_role, error = %e, "Could not list the reward role holders.");
                return;
            }
        };
        report.holders_listed = true;

        for holder in holders {
            match self
                .platform
                .remove_role(holder, self.reward_role, "New leaderboard cycle.")
                .await
            {
                Ok(()) => report.stripped.push(holder),
                Err(e) => {
                    warn!(user = %holder, error = %e, "Could not remove the reward role.");
                    report.strip_failures.push(holder);
                }
            }
        }
    }

    async fn deliver(&self, content: &str, notify: &[UserId]) -> bool {
        match self.platform.send_message(self.channel, content, notify).await {
            Ok(_) => true,
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "Could not post the leaderboard.");
                false
            }
        }
    }
}
