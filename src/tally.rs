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

use indexmap::IndexMap;
use poise::serenity_prelude::UserId;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, TryLockError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Minimum time between two unforced writes of the snapshot.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Message count per user, in the order users first posted.
pub type Tally = IndexMap<UserId, u64>;

/**
 * A user's position in the ranking.
 */
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    pub rank: usize,
    pub user: UserId,
    pub count: u64,
}

/**
 * Immutable copy of the tally at some point in time.
 */
#[derive(Clone, Debug, Default, Serialize)]
pub struct TallySnapshot {
    pub entries: Tally,
    pub total: u64,
}

impl TallySnapshot {
    /**
     * Sorts the entries by count, descending. The sort is stable, so ties keep the order in which
     * the users first posted.
     */
    pub fn ranked(&self, limit: usize) -> Vec<RankedEntry> {
        let mut entries: Vec<(UserId, u64)> = self.entries.iter().map(|(u, c)| (*u, *c)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, (user, count))| RankedEntry {
                rank: i + 1,
                user,
                count,
            })
            .collect()
    }
}

struct TallyState {
    counts: Tally,
    last_flush: Option<Instant>,
}

/**
 * The message counter store.
 *
 * The in-memory tally is the source of truth; the file at `path` is a snapshot written at most
 * once per `interval`, unless a write is forced.
 */
pub struct TallyStore {
    path: PathBuf,
    interval: Duration,
    state: Mutex<TallyState>,
    // Held for the whole snapshot write. Never acquired while `state` is locked.
    writer: Mutex<()>,
}

impl TallyStore {
    /**
     * Opens the store, loading the persisted snapshot if there is a valid one.
     */
    pub fn open(path: impl Into<PathBuf>) -> TallyStore {
        Self::with_interval(path, FLUSH_INTERVAL)
    }

    pub fn with_interval(path: impl Into<PathBuf>, interval: Duration) -> TallyStore {
        let path = path.into();
        let counts = load_snapshot(&path);
        info!(path = %path.display(), users = counts.len(), "Tally loaded.");

        Self {
            path,
            interval,
            state: Mutex::new(TallyState {
                counts,
                last_flush: None,
            }),
            writer: Mutex::new(()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TallyState> {
        // A panic while holding the lock can't leave the map half-updated, so keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /**
     * Counts one more message for a user, and gives the snapshot a chance to be written.
     */
    pub fn record_activity(&self, user: UserId) {
        {
            let mut state = self.lock();
            *state.counts.entry(user).or_insert(0) += 1;
        }
        self.flush(false);
    }

    /**
     * Writes the snapshot to disk.
     *
     * Unforced flushes are skipped if the last successful one happened less than the flush
     * interval ago. Errors are logged, never returned: the in-memory tally stays authoritative.
     * Returns whether the snapshot was written.
     */
    pub fn flush(&self, force: bool) -> bool {
        if !force && !self.flush_due() {
            return false;
        }

        // Only one write at a time. Unforced flushes give way to a write already in progress
        // rather than waiting for the disk.
        let _writer = if force {
            self.writer
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
        } else {
            match self.writer.try_lock() {
                Ok(writer) => writer,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return false,
            }
        };
        if !force && !self.flush_due() {
            return false;
        }

        // Serialised under the counts lock, written outside of it:
        let (json, users) = {
            let state = self.lock();
            (serde_json::to_string_pretty(&state.counts), state.counts.len())
        };
        let written = json
            .map_err(std::io::Error::from)
            .and_then(|json| write_snapshot(&self.path, &json));

        match written {
            Ok(()) => {
                self.lock().last_flush = Some(Instant::now());
                debug!(path = %self.path.display(), users, forced = force, "Tally persisted.");
                true
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Could not persist the tally.");
                false
            }
        }
    }

    fn flush_due(&self) -> bool {
        self.lock()
            .last_flush
            .map_or(true, |last| last.elapsed() >= self.interval)
    }

    /**
     * Clears every count, and persists the empty tally right away.
     */
    pub fn reset(&self) {
        self.lock().counts.clear();
        self.flush(true);
        info!("Tally reset.");
    }

    /**
     * Copies the tally and clears it in one step, then persists the empty tally. Messages counted
     * after the copy stay in the store.
     *
     * Nothing is cleared nor written if the tally is empty.
     */
    pub fn take(&self) -> TallySnapshot {
        let entries = {
            let mut state = self.lock();
            if state.counts.is_empty() {
                return TallySnapshot::default();
            }
            std::mem::take(&mut state.counts)
        };
        self.flush(true);
        info!(users = entries.len(), "Tally taken for a new cycle.");
        TallySnapshot {
            total: entries.values().sum(),
            entries,
        }
    }

    pub fn snapshot(&self) -> TallySnapshot {
        let state = self.lock();
        TallySnapshot {
            entries: state.counts.clone(),
            total: state.counts.values().sum(),
        }
    }

    pub fn count(&self, user: UserId) -> u64 {
        self.lock().counts.get(&user).copied().unwrap_or(0)
    }
}

fn load_snapshot(path: &Path) -> Tally {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Tally::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read the tally snapshot, starting empty.");
            return Tally::new();
        }
    };
    match serde_json::from_str(&json) {
        Ok(counts) => counts,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not parse the tally snapshot, starting empty.");
            Tally::new()
        }
    }
}

/**
 * Writes the tally next to its final location, then renames it over the previous snapshot, so a
 * crash mid-write never leaves a truncated file behind.
 */
fn write_snapshot(path: &Path, json: &str) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)
}
