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

use crate::tally::TallyStore;
use crate::Data;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Wait used when the schedule yields no future occurrence.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/**
 * Time to wait from `now` until the next occurrence of the schedule, if any.
 */
pub fn until_next(schedule: &Schedule, now: DateTime<Utc>) -> Option<(DateTime<Utc>, Duration)> {
    let next = schedule.after(&now).next()?;
    let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
    Some((next, wait))
}

/**
 * Runs the leaderboard cycle on every occurrence of the schedule, forever.
 */
pub async fn leaderboard_schedule(data: Data, schedule: Schedule) {
    loop {
        let Some((next, wait)) = until_next(&schedule, Utc::now()) else {
            warn!("The leaderboard schedule has no upcoming occurrence.");
            tokio::time::sleep(IDLE_WAIT).await;
            continue;
        };
        info!(next = %next, "Next leaderboard cycle scheduled.");
        tokio::time::sleep(wait).await;

        match data.leaderboard.run_cycle().await {
            Ok(report) => info!(
                ranked = report.ranking.len(),
                reset = report.reset,
                "Scheduled leaderboard cycle done."
            ),
            Err(e) => error!(error = %e, "Scheduled leaderboard cycle failed."),
        }
    }
}

/**
 * Forces the tally to disk every `period`, and forgets the expired cooldowns.
 */
pub async fn periodic_flush(data: Data, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes right away:
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let written = data.tally.flush(true);
        let pruned = data.cooldowns.prune();
        debug!(written, pruned, "Periodic flush done.");
    }
}

/**
 * Resolves on the first Ctrl-C or, on Unix, SIGTERM.
 */
pub async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

/**
 * Waits for `signal`, then writes the tally one last time. Returns whether the bot should shut
 * down, which is not the case if the signal could not be listened for.
 */
pub async fn flush_on_shutdown<S>(signal: S, tally: &TallyStore) -> bool
where
    S: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!(error = %e, "Could not listen for the shutdown signal.");
        return false;
    }
    info!("Shutting down.");
    tally.flush(true);
    true
}
