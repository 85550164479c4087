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

use crate::platform::{MemberProfile, MemberSummary, Platform, PlatformError};
use crate::tally::TallyStore;
use crate::utils::BotConfig;
use crate::Data;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude::{ChannelId, MessageId, Permissions, RoleId, User, UserId};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

pub const EVERYONE: RoleId = RoleId::new(1);

pub fn test_config() -> BotConfig {
    BotConfig {
        discord_token: String::from("token"),
        guild_id: 1,
        leaderboard_channel_id: 10,
        suggestions_channel_id: 11,
        logs_channel_id: 12,
        reward_role_id: 20,
        dashboard_secret: String::from("secret"),
        port: 3000,
        tally_path: PathBuf::from("tally.json"),
        leaderboard_schedule: String::from("0 0 0 * * Sun"),
        command_prefix: String::from("!"),
        muted_role_name: String::from("Muted"),
        flush_interval_minutes: 5,
        call_timeout_secs: 15,
    }
}

/**
 * Shared state over a fake platform, with the tally stored under `dir`.
 */
pub fn test_data(dir: &std::path::Path) -> (Arc<FakePlatform>, Data) {
    let platform = Arc::new(FakePlatform::new());
    let mut config = test_config();
    config.tally_path = dir.join("tally.json");
    let tally = Arc::new(TallyStore::open(&config.tally_path));
    let data = Data::new(Arc::new(config), platform.clone(), tally);
    (platform, data)
}

pub fn test_user(id: u64) -> User {
    serde_json::from_value(serde_json::json!({
        "id": id.to_string(),
        "username": format!("user{id}"),
        "discriminator": "0",
        "avatar": null,
    }))
    .unwrap()
}

#[derive(Clone, Debug)]
pub struct SentMessage {
    pub id: MessageId,
    pub channel: ChannelId,
    pub content: String,
    pub notify: Vec<UserId>,
}

#[derive(Default)]
struct FakeState {
    members: HashMap<UserId, Vec<RoleId>>,
    member_order: Vec<UserId>,
    positions: HashMap<RoleId, u16>,
    grants: HashMap<UserId, Permissions>,
    owner: Option<UserId>,
    named_roles: HashMap<String, RoleId>,
    deleted_roles: HashSet<RoleId>,
    role_creations: usize,
    missing_channels: HashSet<ChannelId>,
    failing: HashSet<UserId>,
    sent: Vec<SentMessage>,
    reactions: Vec<(MessageId, String)>,
    kicked: Vec<UserId>,
    banned: Vec<UserId>,
    unbanned: Vec<UserId>,
    timeouts: Vec<UserId>,
    purged: Vec<(ChannelId, u8)>,
    next_id: u64,
}

/**
 * In-memory guild. Every channel exists unless removed; failing users make every mutation
 * targeting them fail.
 */
pub struct FakePlatform {
    state: Mutex<FakeState>,
    on_send: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl FakePlatform {
    pub fn new() -> FakePlatform {
        Self {
            state: Mutex::new(FakeState {
                next_id: 1000,
                ..FakeState::default()
            }),
            on_send: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Runs `hook` after every message sent, like a member posting while the bot talks.
    pub fn on_send(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_send.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn add_member(&self, user: UserId, roles: &[RoleId]) {
        let mut state = self.state();
        if !state.members.contains_key(&user) {
            state.member_order.push(user);
        }
        state.members.insert(user, roles.to_vec());
    }

    pub fn set_position(&self, role: RoleId, position: u16) {
        self.state().positions.insert(role, position);
    }

    pub fn grant(&self, user: UserId, permissions: Permissions) {
        self.state().grants.insert(user, permissions);
    }

    pub fn set_owner(&self, user: UserId) {
        self.state().owner = Some(user);
    }

    pub fn add_named_role(&self, name: &str, role: RoleId) {
        self.state().named_roles.insert(name.to_string(), role);
    }

    /// Deletes a named role, as an admin would: members lose it and it can't be assigned again.
    pub fn remove_role_named(&self, name: &str) {
        let mut state = self.state();
        if let Some(role) = state.named_roles.remove(name) {
            state.deleted_roles.insert(role);
            for roles in state.members.values_mut() {
                roles.retain(|r| *r != role);
            }
        }
    }

    pub fn remove_channel(&self, channel: ChannelId) {
        self.state().missing_channels.insert(channel);
    }

    pub fn fail_for(&self, user: UserId) {
        self.state().failing.insert(user);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state().sent.clone()
    }

    pub fn roles_of(&self, user: UserId) -> Vec<RoleId> {
        self.state().members.get(&user).cloned().unwrap_or_default()
    }

    pub fn role_holders_of(&self, role: RoleId) -> Vec<UserId> {
        let state = self.state();
        state
            .member_order
            .iter()
            .filter(|u| state.members.get(u).is_some_and(|r| r.contains(&role)))
            .copied()
            .collect()
    }

    pub fn role_named(&self, name: &str) -> Option<RoleId> {
        self.state().named_roles.get(name).copied()
    }

    pub fn role_creations(&self) -> usize {
        self.state().role_creations
    }

    pub fn kicked(&self) -> Vec<UserId> {
        self.state().kicked.clone()
    }

    pub fn banned(&self) -> Vec<UserId> {
        self.state().banned.clone()
    }

    pub fn unbanned(&self) -> Vec<UserId> {
        self.state().unbanned.clone()
    }

    /// Users currently timed out.
    pub fn timeouts(&self) -> Vec<UserId> {
        self.state().timeouts.clone()
    }

    pub fn purged(&self) -> Vec<(ChannelId, u8)> {
        self.state().purged.clone()
    }

    pub fn reactions(&self) -> Vec<(MessageId, String)> {
        self.state().reactions.clone()
    }

    fn check_channel(state: &FakeState, channel: ChannelId) -> Result<(), PlatformError> {
        if state.missing_channels.contains(&channel) {
            Err(PlatformError::NotFound(format!("channel {channel}")))
        } else {
            Ok(())
        }
    }

    fn check_user(state: &FakeState, user: UserId) -> Result<(), PlatformError> {
        if state.failing.contains(&user) {
            Err(PlatformError::Rejected(format!("missing access to {user}")))
        } else {
            Ok(())
        }
    }

    fn check_member(state: &FakeState, user: UserId) -> Result<(), PlatformError> {
        Self::check_user(state, user)?;
        if state.members.contains_key(&user) {
            Ok(())
        } else {
            Err(PlatformError::NotFound(format!("member {user}")))
        }
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn resolve_channel(&self, channel: ChannelId) -> Result<(), PlatformError> {
        Self::check_channel(&self.state(), channel)
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        content: &str,
        notify: &[UserId],
    ) -> Result<MessageId, PlatformError> {
        let id = {
            let mut state = self.state();
            Self::check_channel(&state, channel)?;
            state.next_id += 1;
            let id = MessageId::new(state.next_id);
            state.sent.push(SentMessage {
                id,
                channel,
                content: content.to_string(),
                notify: notify.to_vec(),
            });
            id
        };
        if let Some(hook) = self.on_send.lock().unwrap().as_ref() {
            hook();
        }
        Ok(id)
    }

    async fn react(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.state();
        Self::check_channel(&state, channel)?;
        state.reactions.push((message, emoji.to_string()));
        Ok(())
    }

    async fn role_holders(&self, role: RoleId) -> Result<Vec<UserId>, PlatformError> {
        Ok(self.role_holders_of(role))
    }

    async fn add_role(
        &self,
        user: UserId,
        role: RoleId,
        _reason: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.state();
        Self::check_member(&state, user)?;
        if let Some(roles) = state.members.get_mut(&user) {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
        Ok(())
    }

    async fn remove_role(
        &self,
        user: UserId,
        role: RoleId,
        _reason: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.state();
        Self::check_member(&state, user)?;
        if let Some(roles) = state.members.get_mut(&user) {
            roles.retain(|r| *r != role);
        }
        Ok(())
    }

    async fn member_profile(&self, user: UserId) -> Result<MemberProfile, PlatformError> {
        let state = self.state();
        let Some(roles) = state.members.get(&user) else {
            return Err(PlatformError::NotFound(format!("member {user}")));
        };
        let top_position = roles
            .iter()
            .filter_map(|r| state.positions.get(r))
            .copied()
            .max()
            .unwrap_or(0);
        let permissions = state
            .grants
            .get(&user)
            .copied()
            .unwrap_or_else(Permissions::empty);
        Ok(MemberProfile::new(
            user,
            roles.clone(),
            top_position,
            permissions,
            state.owner == Some(user),
        ))
    }

    async fn set_roles(&self, user: UserId, roles: &[RoleId]) -> Result<(), PlatformError> {
        let mut state = self.state();
        Self::check_member(&state, user)?;
        if let Some(deleted) = roles.iter().find(|r| state.deleted_roles.contains(r)) {
            return Err(PlatformError::NotFound(format!("role {deleted}")));
        }
        state.members.insert(user, roles.to_vec());
        Ok(())
    }

    async fn find_role(&self, name: &str) -> Result<Option<RoleId>, PlatformError> {
        // A real lookup is a request, which lets other tasks run in the meantime.
        tokio::task::yield_now().await;
        Ok(self.role_named(name))
    }

    async fn create_restricted_role(&self, name: &str) -> Result<RoleId, PlatformError> {
        let mut state = self.state();
        state.next_id += 1;
        let role = RoleId::new(state.next_id);
        state.named_roles.insert(name.to_string(), role);
        state.role_creations += 1;
        Ok(role)
    }

    async fn kick(&self, user: UserId, _reason: &str) -> Result<(), PlatformError> {
        let mut state = self.state();
        Self::check_member(&state, user)?;
        state.members.remove(&user);
        state.member_order.retain(|u| *u != user);
        state.kicked.push(user);
        Ok(())
    }

    async fn ban(&self, user: UserId, _reason: &str) -> Result<(), PlatformError> {
        let mut state = self.state();
        Self::check_user(&state, user)?;
        state.members.remove(&user);
        state.member_order.retain(|u| *u != user);
        state.banned.push(user);
        Ok(())
    }

    async fn unban(&self, user: UserId) -> Result<(), PlatformError> {
        let mut state = self.state();
        if !state.banned.contains(&user) {
            return Err(PlatformError::NotFound(format!("ban of {user}")));
        }
        state.banned.retain(|u| *u != user);
        state.unbanned.push(user);
        Ok(())
    }

    async fn timeout(
        &self,
        user: UserId,
        _until: DateTime<Utc>,
        _reason: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.state();
        Self::check_member(&state, user)?;
        if !state.timeouts.contains(&user) {
            state.timeouts.push(user);
        }
        Ok(())
    }

    async fn untimeout(&self, user: UserId) -> Result<(), PlatformError> {
        let mut state = self.state();
        Self::check_member(&state, user)?;
        state.timeouts.retain(|u| *u != user);
        Ok(())
    }

    async fn purge(&self, channel: ChannelId, amount: u8) -> Result<usize, PlatformError> {
        let mut state = self.state();
        Self::check_channel(&state, channel)?;
        state.purged.push((channel, amount));
        Ok(amount as usize)
    }

    async fn members(&self) -> Result<Vec<MemberSummary>, PlatformError> {
        Ok(self
            .state()
            .member_order
            .iter()
            .map(|u| MemberSummary {
                id: u.to_string(),
                username: format!("user{u}"),
                discriminator: None,
                bot: false,
                joined_at: None,
            })
            .collect())
    }

    fn everyone_role(&self) -> RoleId {
        EVERYONE
    }

    fn bot_tag(&self) -> Option<String> {
        Some(String::from("Pheme#0001"))
    }

    fn member_count(&self) -> Option<u64> {
        Some(self.state().members.len() as u64)
    }
}
