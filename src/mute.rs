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

use crate::platform::{Platform, PlatformError};
use poise::serenity_prelude::{RoleId, UserId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum MuteError {
    #[error("<@{0}> is already muted")]
    AlreadyMuted(UserId),
    #[error("<@{0}> is not muted")]
    NotMuted(UserId),
    #[error("the muted role does not exist")]
    NoRestrictedRole,
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/**
 * Keeps the roles muted members held before being muted, so unmuting gives them back.
 *
 * A member is in the ledger if and only if they are muted.
 */
pub struct MuteLedger {
    role_name: String,
    records: Mutex<HashMap<UserId, Vec<RoleId>>>,
}

impl MuteLedger {
    pub fn new(role_name: impl Into<String>) -> MuteLedger {
        Self {
            role_name: role_name.into(),
            records: Mutex::new(HashMap::new()),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<UserId, Vec<RoleId>>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_muted(&self, user: UserId) -> bool {
        self.records().contains_key(&user)
    }

    pub fn muted_count(&self) -> usize {
        self.records().len()
    }

    /**
     * The roles stored for a muted member.
     */
    pub fn stored_roles(&self, user: UserId) -> Option<Vec<RoleId>> {
        self.records().get(&user).cloned()
    }

    /**
     * Looks up the restricted role by name, without creating it. The id isn't kept, since the role
     * may be deleted or replaced at any time.
     */
    async fn restricted_role(&self, platform: &dyn Platform) -> Result<Option<RoleId>, PlatformError> {
        platform.find_role(&self.role_name).await
    }

    /**
     * Looks up the restricted role, creating it (with its channel restrictions) if needed.
     */
    async fn ensure_restricted_role(&self, platform: &dyn Platform) -> Result<RoleId, PlatformError> {
        if let Some(role) = self.restricted_role(platform).await? {
            return Ok(role);
        }
        let role = platform.create_restricted_role(&self.role_name).await?;
        info!(role = %role, name = %self.role_name, "Created the muted role.");
        Ok(role)
    }

    /**
     * Mutes a member: stores their current roles, then replaces them with the restricted role.
     *
     * If the roles can't be replaced, the stored entry is dropped again, so the ledger never lists
     * someone who isn't actually muted.
     */
    pub async fn mute(&self, platform: &dyn Platform, user: UserId) -> Result<(), MuteError> {
        if self.is_muted(user) {
            return Err(MuteError::AlreadyMuted(user));
        }

        let restricted = self.ensure_restricted_role(platform).await?;
        let profile = platform.member_profile(user).await?;
        let everyone = platform.everyone_role();
        let previous: Vec<RoleId> = profile
            .roles()
            .iter()
            .copied()
            .filter(|r| *r != everyone)
            .collect();

        // Checked again: another mute may have completed while we were waiting on Discord.
        {
            let mut records = self.records();
            if records.contains_key(&user) {
                return Err(MuteError::AlreadyMuted(user));
            }
            records.insert(user, previous);
        }

        if let Err(e) = platform.set_roles(user, &[restricted]).await {
            self.records().remove(&user);
            warn!(user = %user, error = %e, "Could not apply the muted role, mute rolled back.");
            return Err(e.into());
        }

        Ok(())
    }

    /**
     * Unmutes a member, restoring the roles stored when they were muted.
     *
     * The entry leaves the ledger before the roles are restored, so only one of two concurrent
     * unmutes goes through. It is put back if restoring fails.
     */
    pub async fn unmute(&self, platform: &dyn Platform, user: UserId) -> Result<(), MuteError> {
        if !self.is_muted(user) {
            return Err(MuteError::NotMuted(user));
        }
        let Some(restricted) = self.restricted_role(platform).await? else {
            return Err(MuteError::NoRestrictedRole);
        };

        let Some(stored) = self.records().remove(&user) else {
            return Err(MuteError::NotMuted(user));
        };
        let restored: Vec<RoleId> = stored.iter().copied().filter(|r| *r != restricted).collect();
        if let Err(e) = platform.set_roles(user, &restored).await {
            self.records().entry(user).or_insert(stored);
            warn!(user = %user, error = %e, "Could not restore the roles, member kept muted.");
            return Err(e.into());
        }

        Ok(())
    }
}
