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

use poise::serenity_prelude::UserId;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Time a user has to wait between two uses of the same command.
pub const COOLDOWN_WINDOW: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cooldown {
    Ready,
    Wait(Duration),
}

/**
 * Per-user, per-command rate limiting.
 */
pub struct Cooldowns {
    window: Duration,
    stamps: Mutex<HashMap<(UserId, String), Instant>>,
}

impl Default for Cooldowns {
    fn default() -> Self {
        Self::new(COOLDOWN_WINDOW)
    }
}

impl Cooldowns {
    pub fn new(window: Duration) -> Cooldowns {
        Self {
            window,
            stamps: Mutex::new(HashMap::new()),
        }
    }

    pub fn check_and_stamp(&self, user: UserId, command: &str) -> Cooldown {
        self.check_and_stamp_at(user, command, Instant::now())
    }

    /**
     * Stamps the command as used at `now`, unless the previous stamp is still within the window.
     * In that case the stamp is left alone (retrying doesn't extend the wait) and the remaining
     * time is returned.
     */
    pub fn check_and_stamp_at(&self, user: UserId, command: &str, now: Instant) -> Cooldown {
        let mut stamps = self
            .stamps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let key = (user, command.to_string());
        if let Some(last) = stamps.get(&key) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < self.window {
                return Cooldown::Wait(self.window - elapsed);
            }
        }
        stamps.insert(key, now);

        Cooldown::Ready
    }

    /**
     * Forgets the stamps that can no longer reject anything. Returns how many were dropped.
     */
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    pub fn prune_at(&self, now: Instant) -> usize {
        let mut stamps = self
            .stamps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = stamps.len();
        stamps.retain(|_, last| now.saturating_duration_since(*last) < self.window);
        before - stamps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_call_within_the_window_must_wait() {
        let cooldowns = Cooldowns::default();
        let user = UserId::new(1);
        let t0 = Instant::now();

        assert_eq!(cooldowns.check_and_stamp_at(user, "kick", t0), Cooldown::Ready);
        assert_eq!(
            cooldowns.check_and_stamp_at(user, "kick", t0 + Duration::from_secs(1)),
            Cooldown::Wait(Duration::from_secs(2))
        );
    }

    #[test]
    fn rejected_calls_do_not_extend_the_window() {
        let cooldowns = Cooldowns::default();
        let user = UserId::new(1);
        let t0 = Instant::now();

        cooldowns.check_and_stamp_at(user, "kick", t0);
        cooldowns.check_and_stamp_at(user, "kick", t0 + Duration::from_secs(2));
        assert_eq!(
            cooldowns.check_and_stamp_at(user, "kick", t0 + Duration::from_secs(3)),
            Cooldown::Ready
        );
        // The successful call stamped again:
        assert_eq!(
            cooldowns.check_and_stamp_at(user, "kick", t0 + Duration::from_secs(4)),
            Cooldown::Wait(Duration::from_secs(2))
        );
    }

    #[test]
    fn commands_and_users_are_tracked_separately() {
        let cooldowns = Cooldowns::default();
        let t0 = Instant::now();

        cooldowns.check_and_stamp_at(UserId::new(1), "kick", t0);
        assert_eq!(
            cooldowns.check_and_stamp_at(UserId::new(1), "ban", t0),
            Cooldown::Ready
        );
        assert_eq!(
            cooldowns.check_and_stamp_at(UserId::new(2), "kick", t0),
            Cooldown::Ready
        );
    }

    #[test]
    fn prune_drops_only_expired_stamps() {
        let cooldowns = Cooldowns::default();
        let t0 = Instant::now();
        cooldowns.check_and_stamp_at(UserId::new(1), "kick", t0);
        cooldowns.check_and_stamp_at(UserId::new(2), "kick", t0 + Duration::from_secs(2));

        assert_eq!(cooldowns.prune_at(t0 + Duration::from_secs(4)), 1);
        assert_eq!(
            cooldowns.check_and_stamp_at(UserId::new(2), "kick", t0 + Duration::from_secs(4)),
            Cooldown::Wait(Duration::from_secs(1))
        );
    }
}
