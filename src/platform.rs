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

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use getset::Getters;
use poise::serenity_prelude as serenity;
use serde::Serialize;
use poise::serenity_prelude::{
    ChannelId, CreateAllowedMentions, CreateMessage, EditMember, EditRole, GetMessages, GuildId,
    MessageId, PermissionOverwrite, PermissionOverwriteType, Permissions, ReactionType, RoleId,
    UserId,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Page size used when listing guild members (Discord's maximum).
const MEMBER_PAGE: u64 = 1000;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("the call to Discord timed out after {0:?}")]
    Timeout(Duration),
    #[error("Discord rejected the request: {0}")]
    Discord(#[from] serenity::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Rejected(String),
}

/**
 * What the bot knows about a member when checking permissions and role hierarchy.
 */
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Clone, Getters)]
pub struct MemberProfile {
    #[getset(get = "pub")]
    id: UserId,
    /// Roles held by the member, without the implicit everyone role.
    #[getset(get = "pub")]
    roles: Vec<RoleId>,
    /// Position of the member's highest role (0 if they only have the everyone role).
    #[getset(get = "pub")]
    top_position: u16,
    /// Union of the permissions granted by the member's roles, everyone role included.
    #[getset(get = "pub")]
    permissions: Permissions,
    #[getset(get = "pub")]
    is_owner: bool,
}

impl MemberProfile {
    pub fn new(
        id: UserId,
        roles: Vec<RoleId>,
        top_position: u16,
        permissions: Permissions,
        is_owner: bool,
    ) -> MemberProfile {
        Self {
            id,
            roles,
            top_position,
            permissions,
            is_owner,
        }
    }
}

/**
 * Member listing entry, as served by the dashboard.
 */
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub id: String,
    pub username: String,
    pub discriminator: Option<String>,
    pub bot: bool,
    pub joined_at: Option<String>,
}

/**
 * Every Discord operation the bot performs, scoped to the guild it serves.
 */
#[async_trait]
pub trait Platform: Send + Sync {
    /// Checks that a channel exists and is reachable.
    async fn resolve_channel(&self, channel: ChannelId) -> Result<(), PlatformError>;

    /// Sends a message. Only the users in `notify` are pinged by mentions in `content`.
    async fn send_message(
        &self,
        channel: ChannelId,
        content: &str,
        notify: &[UserId],
    ) -> Result<MessageId, PlatformError>;

    async fn react(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> Result<(), PlatformError>;

    /// Lists the members currently holding a role.
    async fn role_holders(&self, role: RoleId) -> Result<Vec<UserId>, PlatformError>;

    async fn add_role(&self, user: UserId, role: RoleId, reason: &str)
        -> Result<(), PlatformError>;

    async fn remove_role(
        &self,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> Result<(), PlatformError>;

    async fn member_profile(&self, user: UserId) -> Result<MemberProfile, PlatformError>;

    /// Replaces the whole role set of a member.
    async fn set_roles(&self, user: UserId, roles: &[RoleId]) -> Result<(), PlatformError>;

    async fn find_role(&self, name: &str) -> Result<Option<RoleId>, PlatformError>;

    /// Creates a role that can't talk, speak nor react on any of the guild's channels.
    async fn create_restricted_role(&self, name: &str) -> Result<RoleId, PlatformError>;

    async fn kick(&self, user: UserId, reason: &str) -> Result<(), PlatformError>;

    async fn ban(&self, user: UserId, reason: &str) -> Result<(), PlatformError>;

    async fn unban(&self, user: UserId) -> Result<(), PlatformError>;

    async fn timeout(
        &self,
        user: UserId,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), PlatformError>;

    async fn untimeout(&self, user: UserId) -> Result<(), PlatformError>;

    /// Deletes the most recent messages of a channel, returning how many were deleted.
    async fn purge(&self, channel: ChannelId, amount: u8) -> Result<usize, PlatformError>;

    async fn members(&self) -> Result<Vec<MemberSummary>, PlatformError>;

    /// The implicit role every member holds (it shares its identifier with the guild).
    fn everyone_role(&self) -> RoleId;

    fn bot_tag(&self) -> Option<String>;

    fn member_count(&self) -> Option<u64>;
}

/**
 * Platform implementation over serenity's HTTP client and cache.
 *
 * Every request is bounded by a local timeout, so a stalled call can't hold a cycle or a command
 * forever.
 */
pub struct DiscordPlatform {
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
    guild: GuildId,
    deadline: Duration,
}

impl DiscordPlatform {
    pub fn new(
        http: Arc<serenity::Http>,
        cache: Arc<serenity::Cache>,
        guild: GuildId,
        deadline: Duration,
    ) -> DiscordPlatform {
        Self {
            http,
            cache,
            guild,
            deadline,
        }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, PlatformError>
    where
        F: Future<Output = Result<T, serenity::Error>>,
    {
        match tokio::time::timeout(self.deadline, call).await {
            Ok(result) => result.map_err(PlatformError::from),
            Err(_) => Err(PlatformError::Timeout(self.deadline)),
        }
    }

    /**
     * Retrieves every member of the guild, page by page.
     */
    async fn all_members(&self) -> Result<Vec<serenity::Member>, PlatformError> {
        let mut members = Vec::new();
        let mut after: Option<UserId> = None;
        loop {
            let page = self
                .bounded(
                    self.guild
                        .members(&*self.http, Some(MEMBER_PAGE), after),
                )
                .await?;
            let full_page = page.len() as u64 == MEMBER_PAGE;
            after = page.last().map(|m| m.user.id);
            members.extend(page);
            if !full_page {
                break;
            }
        }

        Ok(members)
    }
}

#[async_trait]
impl Platform for DiscordPlatform {
    async fn resolve_channel(&self, channel: ChannelId) -> Result<(), PlatformError> {
        self.bounded(channel.to_channel(&*self.http)).await?;
        Ok(())
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        content: &str,
        notify: &[UserId],
    ) -> Result<MessageId, PlatformError> {
        let message = CreateMessage::new()
            .content(content)
            .allowed_mentions(CreateAllowedMentions::new().users(notify.iter().copied()));
        let sent = self
            .bounded(channel.send_message(&*self.http, message))
            .await?;
        Ok(sent.id)
    }

    async fn react(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        self.bounded(channel.create_reaction(
            &*self.http,
            message,
            ReactionType::Unicode(emoji.to_string()),
        ))
        .await
    }

    async fn role_holders(&self, role: RoleId) -> Result<Vec<UserId>, PlatformError> {
        Ok(self
            .all_members()
            .await?
            .into_iter()
            .filter(|m| m.roles.contains(&role))
            .map(|m| m.user.id)
            .collect())
    }

    async fn add_role(
        &self,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> Result<(), PlatformError> {
        self.bounded(
            self.http
                .add_member_role(self.guild, user, role, Some(reason)),
        )
        .await
    }

    async fn remove_role(
        &self,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> Result<(), PlatformError> {
        self.bounded(
            self.http
                .remove_member_role(self.guild, user, role, Some(reason)),
        )
        .await
    }

    async fn member_profile(&self, user: UserId) -> Result<MemberProfile, PlatformError> {
        let member = self.bounded(self.guild.member(&*self.http, user)).await?;
        let guild_roles = self.bounded(self.guild.roles(&*self.http)).await?;
        let owner = self
            .bounded(self.guild.to_partial_guild(&*self.http))
            .await?
            .owner_id;

        let everyone = self.everyone_role();
        let mut permissions = guild_roles
            .get(&everyone)
            .map(|r| r.permissions)
            .unwrap_or_else(Permissions::empty);
        let mut top_position = 0;
        let roles: Vec<RoleId> = member
            .roles
            .iter()
            .copied()
            .filter(|r| *r != everyone)
            .collect();
        for role in roles.iter().filter_map(|id| guild_roles.get(id)) {
            permissions |= role.permissions;
            top_position = top_position.max(role.position);
        }

        Ok(MemberProfile::new(
            user,
            roles,
            top_position,
            permissions,
            owner == user,
        ))
    }

    async fn set_roles(&self, user: UserId, roles: &[RoleId]) -> Result<(), PlatformError> {
        let edit = EditMember::new().roles(roles.iter().copied());
        self.bounded(self.guild.edit_member(&*self.http, user, edit))
            .await?;
        Ok(())
    }

    async fn find_role(&self, name: &str) -> Result<Option<RoleId>, PlatformError> {
        let roles = self.bounded(self.guild.roles(&*self.http)).await?;
        Ok(roles
            .values()
            .find(|r| r.name == name)
            .map(|r| r.id))
    }

    async fn create_restricted_role(&self, name: &str) -> Result<RoleId, PlatformError> {
        let role = self
            .bounded(self.guild.create_role(
                &*self.http,
                EditRole::new()
                    .name(name)
                    .permissions(Permissions::empty())
                    .audit_log_reason("Role used to mute members."),
            ))
            .await?;

        let denied = Permissions::SEND_MESSAGES
            | Permissions::SEND_MESSAGES_IN_THREADS
            | Permissions::CREATE_PUBLIC_THREADS
            | Permissions::CREATE_PRIVATE_THREADS
            | Permissions::ADD_REACTIONS
            | Permissions::SPEAK;
        let channels = self.bounded(self.guild.channels(&*self.http)).await?;
        for channel in channels.keys() {
            let overwrite = PermissionOverwrite {
                allow: Permissions::empty(),
                deny: denied,
                kind: PermissionOverwriteType::Role(role.id),
            };
            // A channel we can't edit doesn't invalidate the role on the other ones:
            if let Err(e) = self
                .bounded(channel.create_permission(&*self.http, overwrite))
                .await
            {
                warn!(channel = %channel, role = %role.id, error = %e, "Could not restrict the muted role on a channel.");
            }
        }

        Ok(role.id)
    }

    async fn kick(&self, user: UserId, reason: &str) -> Result<(), PlatformError> {
        self.bounded(self.guild.kick_with_reason(&*self.http, user, reason))
            .await
    }

    async fn ban(&self, user: UserId, reason: &str) -> Result<(), PlatformError> {
        self.bounded(self.guild.ban_with_reason(&*self.http, user, 0, reason))
            .await
    }

    async fn unban(&self, user: UserId) -> Result<(), PlatformError> {
        self.bounded(self.guild.unban(&*self.http, user)).await
    }

    async fn timeout(
        &self,
        user: UserId,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), PlatformError> {
        let edit = EditMember::new()
            .disable_communication_until(until.to_rfc3339())
            .audit_log_reason(reason);
        self.bounded(self.guild.edit_member(&*self.http, user, edit))
            .await?;
        Ok(())
    }

    async fn untimeout(&self, user: UserId) -> Result<(), PlatformError> {
        let edit = EditMember::new().enable_communication();
        self.bounded(self.guild.edit_member(&*self.http, user, edit))
            .await?;
        Ok(())
    }

    async fn purge(&self, channel: ChannelId, amount: u8) -> Result<usize, PlatformError> {
        let messages = self
            .bounded(channel.messages(&*self.http, GetMessages::new().limit(amount)))
            .await?;
        let ids: Vec<MessageId> = messages.iter().map(|m| m.id).collect();
        match ids.as_slice() {
            [] => {}
            // Bulk deletion needs at least two messages:
            [single] => {
                self.bounded(channel.delete_message(&*self.http, *single))
                    .await?
            }
            _ => {
                self.bounded(channel.delete_messages(&*self.http, &ids))
                    .await?
            }
        }

        Ok(ids.len())
    }

    async fn members(&self) -> Result<Vec<MemberSummary>, PlatformError> {
        Ok(self
            .all_members()
            .await?
            .into_iter()
            .map(|m| MemberSummary {
                id: m.user.id.to_string(),
                username: m.user.name.clone(),
                discriminator: m.user.discriminator.map(|d| format!("{:04}", d.get())),
                bot: m.user.bot,
                joined_at: m.joined_at.map(|t| t.to_string()),
            })
            .collect())
    }

    fn everyone_role(&self) -> RoleId {
        RoleId::new(self.guild.get())
    }

    fn bot_tag(&self) -> Option<String> {
        Some(self.cache.current_user().tag())
    }

    fn member_count(&self) -> Option<u64> {
        self.cache.guild(self.guild).map(|g| g.member_count)
    }
}
