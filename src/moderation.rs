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

use crate::audit::{AuditLog, AuditRecord, ModAction};
use crate::mute::{MuteError, MuteLedger};
use crate::platform::{MemberProfile, Platform, PlatformError};
use chrono::Utc;
use poise::serenity_prelude::{ChannelId, Permissions, UserId};
use std::sync::Arc;
use thiserror::Error;

pub const MIN_TIMEOUT_MINUTES: u32 = 1;
pub const MAX_TIMEOUT_MINUTES: u32 = 1440;
pub const DEFAULT_TIMEOUT_MINUTES: u32 = 10;
pub const MIN_CLEAR_AMOUNT: u8 = 1;
pub const MAX_CLEAR_AMOUNT: u8 = 100;

const NO_REASON: &str = "No reason provided";

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("you need the {0} permission to do that")]
    PermissionDenied(&'static str),
    #[error("you can't moderate <@{0}>: their highest role is not below yours")]
    Hierarchy(UserId),
    #[error("<@{0}> could not be found in this server")]
    UnknownTarget(UserId),
    #[error(
        "the duration must be a number of minutes between {} and {}",
        MIN_TIMEOUT_MINUTES,
        MAX_TIMEOUT_MINUTES
    )]
    InvalidDuration,
    #[error(
        "the amount must be a number between {} and {}",
        MIN_CLEAR_AMOUNT,
        MAX_CLEAR_AMOUNT
    )]
    InvalidAmount,
    #[error(transparent)]
    Mute(#[from] MuteError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/**
 * Who is asking for a moderation action.
 */
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Clone)]
pub enum Actor {
    /// A guild member, using a chat command.
    Member(MemberProfile),
    /// The dashboard, authenticated with the bearer secret.
    Dashboard,
}

impl Actor {
    /**
     * How the actor is shown in audit records.
     */
    pub fn label(&self) -> String {
        match self {
            Actor::Member(profile) => format!("<@{}>", profile.id()),
            Actor::Dashboard => String::from("dashboard"),
        }
    }

    /**
     * Whether the actor is allowed to use something gated behind `permission`.
     * The owner and administrators always are.
     */
    pub fn has_permission(&self, permission: Permissions) -> bool {
        match self {
            Actor::Member(profile) => {
                *profile.is_owner()
                    || profile.permissions().administrator()
                    || profile.permissions().contains(permission)
            }
            Actor::Dashboard => true,
        }
    }

    /**
     * Whether the actor ranks above the target.
     */
    pub fn outranks(&self, target: &MemberProfile) -> bool {
        if *target.is_owner() {
            return false;
        }
        match self {
            Actor::Member(profile) => {
                *profile.is_owner() || profile.top_position() > target.top_position()
            }
            Actor::Dashboard => true,
        }
    }
}

pub fn require(
    actor: &Actor,
    permission: Permissions,
    name: &'static str,
) -> Result<(), ModerationError> {
    if actor.has_permission(permission) {
        Ok(())
    } else {
        Err(ModerationError::PermissionDenied(name))
    }
}

pub fn validate_duration(minutes: i64) -> Result<u32, ModerationError> {
    if (MIN_TIMEOUT_MINUTES as i64..=MAX_TIMEOUT_MINUTES as i64).contains(&minutes) {
        Ok(minutes as u32)
    } else {
        Err(ModerationError::InvalidDuration)
    }
}

pub fn parse_duration(arg: &str) -> Result<u32, ModerationError> {
    arg.trim()
        .parse::<i64>()
        .map_err(|_| ModerationError::InvalidDuration)
        .and_then(validate_duration)
}

pub fn validate_clear_amount(amount: i64) -> Result<u8, ModerationError> {
    if (MIN_CLEAR_AMOUNT as i64..=MAX_CLEAR_AMOUNT as i64).contains(&amount) {
        Ok(amount as u8)
    } else {
        Err(ModerationError::InvalidAmount)
    }
}

pub fn parse_clear_amount(arg: &str) -> Result<u8, ModerationError> {
    arg.trim()
        .parse::<i64>()
        .map_err(|_| ModerationError::InvalidAmount)
        .and_then(validate_clear_amount)
}

fn reason_or_default(reason: Option<&str>) -> String {
    match reason.map(str::trim) {
        Some(reason) if !reason.is_empty() => reason.to_string(),
        _ => String::from(NO_REASON),
    }
}

/**
 * Entry point for every moderation action, from chat commands and from the dashboard alike.
 *
 * Each action checks the actor's permission, validates its arguments, performs a single call to
 * Discord, and leaves an audit record behind.
 */
pub struct Moderator {
    platform: Arc<dyn Platform>,
    audit: Arc<AuditLog>,
    mutes: MuteLedger,
}

impl Moderator {
    pub fn new(platform: Arc<dyn Platform>, audit: Arc<AuditLog>, mutes: MuteLedger) -> Moderator {
        Self {
            platform,
            audit,
            mutes,
        }
    }

    pub fn mutes(&self) -> &MuteLedger {
        &self.mutes
    }

    async fn target_profile(&self, target: UserId) -> Result<MemberProfile, ModerationError> {
        match self.platform.member_profile(target).await {
            Ok(profile) => Ok(profile),
            Err(PlatformError::NotFound(_)) => Err(ModerationError::UnknownTarget(target)),
            Err(e) => Err(e.into()),
        }
    }

    /// Fails for members nobody may moderate, the guild owner.
    async fn moderatable(&self, target: UserId) -> Result<MemberProfile, ModerationError> {
        let profile = self.target_profile(target).await?;
        if *profile.is_owner() {
            return Err(ModerationError::Hierarchy(target));
        }
        Ok(profile)
    }

    async fn record(&self, action: ModAction, actor: &Actor, target: String, reason: String) {
        let record = AuditRecord::new(action, actor.label(), target, reason);
        self.audit.emit(self.platform.as_ref(), &record).await;
    }

    pub async fn kick(
        &self,
        actor: &Actor,
        target: UserId,
        reason: Option<&str>,
    ) -> Result<(), ModerationError> {
        require(actor, Permissions::KICK_MEMBERS, "Kick Members")?;
        let profile = self.target_profile(target).await?;
        if !actor.outranks(&profile) {
            return Err(ModerationError::Hierarchy(target));
        }
        let reason = reason_or_default(reason);
        self.platform.kick(target, &reason).await?;
        self.record(ModAction::Kick, actor, format!("<@{target}>"), reason)
            .await;
        Ok(())
    }

    pub async fn ban(
        &self,
        actor: &Actor,
        target: UserId,
        reason: Option<&str>,
    ) -> Result<(), ModerationError> {
        require(actor, Permissions::BAN_MEMBERS, "Ban Members")?;
        // Users that already left can still be banned, but members are checked for hierarchy.
        match self.target_profile(target).await {
            Ok(profile) if !actor.outranks(&profile) => {
                return Err(ModerationError::Hierarchy(target))
            }
            Ok(_) | Err(ModerationError::UnknownTarget(_)) => {}
            Err(e) => return Err(e),
        }
        let reason = reason_or_default(reason);
        self.platform.ban(target, &reason).await?;
        self.record(ModAction::Ban, actor, format!("<@{target}>"), reason)
            .await;
        Ok(())
    }

    pub async fn unban(
        &self,
        actor: &Actor,
        target: UserId,
        reason: Option<&str>,
    ) -> Result<(), ModerationError> {
        require(actor, Permissions::BAN_MEMBERS, "Ban Members")?;
        self.platform.unban(target).await?;
        self.record(
            ModAction::Unban,
            actor,
            format!("<@{target}>"),
            reason_or_default(reason),
        )
        .await;
        Ok(())
    }

    pub async fn timeout(
        &self,
        actor: &Actor,
        target: UserId,
        minutes: i64,
        reason: Option<&str>,
    ) -> Result<(), ModerationError> {
        require(actor, Permissions::MODERATE_MEMBERS, "Timeout Members")?;
        let minutes = validate_duration(minutes)?;
        self.moderatable(target).await?;
        let reason = reason_or_default(reason);
        let until = Utc::now() + chrono::Duration::minutes(minutes as i64);
        self.platform.timeout(target, until, &reason).await?;
        self.record(
            ModAction::Timeout,
            actor,
            format!("<@{target}>"),
            format!("{reason} ({minutes} min)"),
        )
        .await;
        Ok(())
    }

    pub async fn untimeout(
        &self,
        actor: &Actor,
        target: UserId,
        reason: Option<&str>,
    ) -> Result<(), ModerationError> {
        require(actor, Permissions::MODERATE_MEMBERS, "Timeout Members")?;
        self.target_profile(target).await?;
        self.platform.untimeout(target).await?;
        self.record(
            ModAction::Untimeout,
            actor,
            format!("<@{target}>"),
            reason_or_default(reason),
        )
        .await;
        Ok(())
    }

    pub async fn mute(
        &self,
        actor: &Actor,
        target: UserId,
        reason: Option<&str>,
    ) -> Result<(), ModerationError> {
        require(actor, Permissions::MANAGE_ROLES, "Manage Roles")?;
        self.moderatable(target).await?;
        self.mutes.mute(self.platform.as_ref(), target).await?;
        self.record(
            ModAction::Mute,
            actor,
            format!("<@{target}>"),
            reason_or_default(reason),
        )
        .await;
        Ok(())
    }

    pub async fn unmute(
        &self,
        actor: &Actor,
        target: UserId,
        reason: Option<&str>,
    ) -> Result<(), ModerationError> {
        require(actor, Permissions::MANAGE_ROLES, "Manage Roles")?;
        self.mutes.unmute(self.platform.as_ref(), target).await?;
        self.record(
            ModAction::Unmute,
            actor,
            format!("<@{target}>"),
            reason_or_default(reason),
        )
        .await;
        Ok(())
    }

    /**
     * Deletes the latest `amount` messages of a channel. Returns how many were deleted.
     */
    pub async fn clear(
        &self,
        actor: &Actor,
        channel: ChannelId,
        amount: i64,
    ) -> Result<usize, ModerationError> {
        require(actor, Permissions::MANAGE_MESSAGES, "Manage Messages")?;
        let amount = validate_clear_amount(amount)?;
        let deleted = self.platform.purge(channel, amount).await?;
        self.record(
            ModAction::Clear,
            actor,
            format!("<#{channel}>"),
            format!("{deleted} messages deleted"),
        )
        .await;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakePlatform;
    use poise::serenity_prelude::RoleId;

    const LOGS: u64 = 12;

    fn setup() -> (Arc<FakePlatform>, Moderator) {
        let platform = Arc::new(FakePlatform::new());
        let moderator = Moderator::new(
            platform.clone(),
            Arc::new(AuditLog::new(ChannelId::new(LOGS))),
            MuteLedger::new("Muted"),
        );
        (platform, moderator)
    }

    fn member(platform: &FakePlatform, id: u64, position: u16, permissions: Permissions) -> Actor {
        let user = UserId::new(id);
        let role = RoleId::new(1000 + id);
        platform.add_member(user, &[role]);
        platform.set_position(role, position);
        platform.grant(user, permissions);
        Actor::Member(MemberProfile::new(
            user,
            vec![role],
            position,
            permissions,
            false,
        ))
    }

    #[test]
    fn clear_amount_bounds() {
        assert!(matches!(parse_clear_amount("0"), Err(ModerationError::InvalidAmount)));
        assert!(matches!(parse_clear_amount("101"), Err(ModerationError::InvalidAmount)));
        assert!(matches!(parse_clear_amount("ten"), Err(ModerationError::InvalidAmount)));
        assert!(matches!(parse_clear_amount("-3"), Err(ModerationError::InvalidAmount)));
        assert_eq!(parse_clear_amount("1").unwrap(), 1);
        assert_eq!(parse_clear_amount("100").unwrap(), 100);
    }

    #[test]
    fn timeout_duration_bounds() {
        assert!(parse_duration("0").is_err());
        assert!(parse_duration("1441").is_err());
        assert!(parse_duration("soon").is_err());
        assert_eq!(parse_duration("1").unwrap(), 1);
        assert_eq!(parse_duration("1440").unwrap(), 1440);
    }

    #[test]
    fn administrators_and_owners_pass_every_permission_check() {
        let admin = Actor::Member(MemberProfile::new(
            UserId::new(1),
            vec![],
            0,
            Permissions::ADMINISTRATOR,
            false,
        ));
        let owner = Actor::Member(MemberProfile::new(
            UserId::new(2),
            vec![],
            0,
            Permissions::empty(),
            true,
        ));
        assert!(admin.has_permission(Permissions::BAN_MEMBERS));
        assert!(owner.has_permission(Permissions::BAN_MEMBERS));
        assert!(Actor::Dashboard.has_permission(Permissions::BAN_MEMBERS));
    }

    #[tokio::test]
    async fn kick_requires_the_permission() {
        let (platform, moderator) = setup();
        let actor = member(&platform, 1, 10, Permissions::empty());
        member(&platform, 2, 1, Permissions::empty());

        let result = moderator.kick(&actor, UserId::new(2), None).await;

        assert!(matches!(result, Err(ModerationError::PermissionDenied(_))));
        assert!(platform.kicked().is_empty());
        assert!(platform.sent().is_empty());
    }

    #[tokio::test]
    async fn kick_respects_role_hierarchy() {
        let (platform, moderator) = setup();
        let actor = member(&platform, 1, 5, Permissions::KICK_MEMBERS);
        member(&platform, 2, 5, Permissions::empty());

        let result = moderator.kick(&actor, UserId::new(2), Some("spam")).await;

        assert!(matches!(result, Err(ModerationError::Hierarchy(_))));
        assert!(platform.kicked().is_empty());
    }

    #[tokio::test]
    async fn kick_applies_and_audits() {
        let (platform, moderator) = setup();
        let actor = member(&platform, 1, 10, Permissions::KICK_MEMBERS);
        member(&platform, 2, 1, Permissions::empty());

        moderator
            .kick(&actor, UserId::new(2), Some("spam"))
            .await
            .unwrap();

        assert_eq!(platform.kicked(), vec![UserId::new(2)]);
        let sent = platform.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, ChannelId::new(LOGS));
        assert!(sent[0].content.contains("<@1>"));
        assert!(sent[0].content.contains("<@2>"));
        assert!(sent[0].content.contains("spam"));
    }

    #[tokio::test]
    async fn the_owner_outranks_everyone_but_cannot_be_targeted() {
        let (platform, moderator) = setup();
        let owner_id = UserId::new(1);
        platform.add_member(owner_id, &[]);
        platform.set_owner(owner_id);
        let owner = Actor::Member(MemberProfile::new(
            owner_id,
            vec![],
            0,
            Permissions::empty(),
            true,
        ));
        member(&platform, 2, 50, Permissions::empty());
        let admin = member(&platform, 3, 99, Permissions::ADMINISTRATOR);

        moderator.ban(&owner, UserId::new(2), None).await.unwrap();
        let result = moderator.kick(&admin, owner_id, None).await;

        assert_eq!(platform.banned(), vec![UserId::new(2)]);
        assert!(matches!(result, Err(ModerationError::Hierarchy(_))));

        let timeout = moderator
            .timeout(&Actor::Dashboard, owner_id, 10, None)
            .await;
        let mute = moderator.mute(&Actor::Dashboard, owner_id, None).await;
        assert!(matches!(timeout, Err(ModerationError::Hierarchy(_))));
        assert!(matches!(mute, Err(ModerationError::Hierarchy(_))));
        assert!(platform.timeouts().is_empty());
        assert!(!moderator.mutes().is_muted(owner_id));
    }

    #[tokio::test]
    async fn kicking_an_unknown_member_is_rejected() {
        let (platform, moderator) = setup();

        let result = moderator
            .kick(&Actor::Dashboard, UserId::new(404), None)
            .await;

        assert!(matches!(result, Err(ModerationError::UnknownTarget(_))));
        assert!(platform.kicked().is_empty());
    }

    #[tokio::test]
    async fn users_outside_the_guild_can_be_banned() {
        let (platform, moderator) = setup();

        moderator
            .ban(&Actor::Dashboard, UserId::new(404), Some("raid"))
            .await
            .unwrap();

        assert_eq!(platform.banned(), vec![UserId::new(404)]);

        moderator
            .unban(&Actor::Dashboard, UserId::new(404), None)
            .await
            .unwrap();
        assert_eq!(platform.unbanned(), vec![UserId::new(404)]);
        assert!(platform.banned().is_empty());
    }

    #[tokio::test]
    async fn timeout_validates_the_duration() {
        let (platform, moderator) = setup();
        member(&platform, 2, 1, Permissions::empty());

        let too_long = moderator
            .timeout(&Actor::Dashboard, UserId::new(2), 1441, None)
            .await;
        assert!(matches!(too_long, Err(ModerationError::InvalidDuration)));
        assert!(platform.timeouts().is_empty());

        moderator
            .timeout(&Actor::Dashboard, UserId::new(2), 30, None)
            .await
            .unwrap();
        assert_eq!(platform.timeouts(), vec![UserId::new(2)]);

        moderator
            .untimeout(&Actor::Dashboard, UserId::new(2), None)
            .await
            .unwrap();
        assert!(platform.timeouts().is_empty());
    }

    #[tokio::test]
    async fn clear_validates_and_purges() {
        let (platform, moderator) = setup();
        let channel = ChannelId::new(50);

        for amount in [0, 101] {
            let result = moderator.clear(&Actor::Dashboard, channel, amount).await;
            assert!(matches!(result, Err(ModerationError::InvalidAmount)));
        }
        assert_eq!(moderator.clear(&Actor::Dashboard, channel, 1).await.unwrap(), 1);
        assert_eq!(
            moderator.clear(&Actor::Dashboard, channel, 100).await.unwrap(),
            100
        );
        assert_eq!(platform.purged(), vec![(channel, 1), (channel, 100)]);
    }

    #[tokio::test]
    async fn mute_and_unmute_are_audited() {
        let (platform, moderator) = setup();
        member(&platform, 2, 1, Permissions::empty());

        moderator
            .mute(&Actor::Dashboard, UserId::new(2), Some("flood"))
            .await
            .unwrap();
        assert!(moderator.mutes().is_muted(UserId::new(2)));

        let again = moderator.mute(&Actor::Dashboard, UserId::new(2), None).await;
        assert!(matches!(
            again,
            Err(ModerationError::Mute(MuteError::AlreadyMuted(_)))
        ));

        moderator
            .unmute(&Actor::Dashboard, UserId::new(2), None)
            .await
            .unwrap();
        assert!(!moderator.mutes().is_muted(UserId::new(2)));
        assert_eq!(platform.sent().len(), 2);
    }
}
