//! Storage seams.
//!
//! Handlers and background tasks only talk to these traits. `PgStore` backs
//! them with Postgres; `MemoryStore` keeps everything in process for tests and
//! single-node development.

pub mod memory;
pub mod postgres;
pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    BotSettings, BrokenTransition, DeliveryAttempt, EntityInfo, EntityOwner, EntityRef,
    EntityVote, OutcomeCount, Reminder, TeamMember, Webhook,
};
use crate::perms::StaffPermissionSet;
use crate::teams::{MemberEdit, TeamError};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Rows per page of the delivery log.
pub const DELIVERY_LOG_PAGE_SIZE: i64 = 20;

/// Row offset of a 1-based delivery log page. Pages past the end saturate
/// and come back empty.
pub fn page_offset(page: i64) -> i64 {
    (page.max(1) - 1).saturating_mul(DELIVERY_LOG_PAGE_SIZE)
}

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
}

/// Users, ownership, memberships and staff positions.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Resolve an API token to its user id.
    async fn user_by_token(&self, token: &str) -> Result<Option<String>, StoreError>;

    async fn user_exists(&self, user_id: &str) -> Result<bool, StoreError>;

    /// Replace a user's API token. Returns `false` when the user does not exist.
    async fn set_token(&self, user_id: &str, token: &str) -> Result<bool, StoreError>;

    /// Owner of a bot, server or pack. `None` when the entity does not exist.
    async fn entity_owner(&self, target: &EntityRef) -> Result<Option<EntityOwner>, StoreError>;

    async fn team_exists(&self, team_id: &str) -> Result<bool, StoreError>;

    /// Raw flags of `user_id` in `team_id`. `None` when not a member.
    async fn member_flags(
        &self,
        team_id: &str,
        user_id: &str,
    ) -> Result<Option<Vec<String>>, StoreError>;

    /// Staff positions and overrides. `None` for non-staff users.
    async fn staff_permissions(
        &self,
        user_id: &str,
    ) -> Result<Option<StaffPermissionSet>, StoreError>;

    /// Returns `false` when the bot does not exist.
    async fn update_bot_settings(
        &self,
        bot_id: &str,
        settings: &BotSettings,
    ) -> Result<bool, StoreError>;

    /// Move an owned entity to `team_id`, clearing its sole owner.
    async fn set_team_owner(&self, target: &EntityRef, team_id: &str) -> Result<bool, StoreError>;

    /// Delete an owned entity along with its webhooks.
    async fn delete_entity(&self, target: &EntityRef) -> Result<bool, StoreError>;
}

/// Team membership mutations. Each call runs in one transaction.
#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn members(&self, team_id: &str) -> Result<Vec<TeamMember>, StoreError>;

    /// Load every member, apply `edit`, and persist the difference. Nothing is
    /// written when `edit` fails.
    async fn edit_members(&self, team_id: &str, edit: MemberEdit) -> Result<(), TeamError>;

    /// Delete a team that owns no bots, servers or packs.
    async fn delete_team(&self, team_id: &str) -> Result<(), TeamError>;
}

/// Webhook registry and delivery log.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn list(&self, target: &EntityRef) -> Result<Vec<Webhook>, StoreError>;

    async fn get(&self, target: &EntityRef, id: Uuid) -> Result<Option<Webhook>, StoreError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Webhook>, StoreError>;

    /// Insert or replace by id. Always resets `broken`.
    async fn upsert(&self, webhook: &Webhook) -> Result<Webhook, StoreError>;

    /// Delete every webhook of `target`. Returns the number removed.
    async fn clear(&self, target: &EntityRef) -> Result<u64, StoreError>;

    /// Delete one webhook. Its delivery log stays until pruned.
    async fn delete(&self, target: &EntityRef, id: Uuid) -> Result<bool, StoreError>;

    async fn mark_broken(&self, target: &EntityRef, id: Uuid) -> Result<bool, StoreError>;

    /// Append a delivery record and apply `transition` to the webhook's
    /// `broken` flag in the same transaction.
    async fn record_attempt(
        &self,
        attempt: &DeliveryAttempt,
        transition: BrokenTransition,
    ) -> Result<(), StoreError>;

    /// One page of the log, newest first, with the total row count.
    async fn delivery_log(
        &self,
        target: &EntityRef,
        page: i64,
    ) -> Result<(Vec<DeliveryAttempt>, i64), StoreError>;

    /// Deliveries of `event_type` for `target` counted per outcome.
    async fn delivery_summary(
        &self,
        target: &EntityRef,
        event_type: &str,
    ) -> Result<Vec<OutcomeCount>, StoreError>;

    /// Drop log rows older than `older_than`. Returns the number removed.
    async fn prune_deliveries(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Votes and the display info needed to announce them.
#[async_trait]
pub trait VoteStore: Send + Sync {
    async fn entity_info(&self, target: &EntityRef) -> Result<Option<EntityInfo>, StoreError>;

    /// Time of the newest vote by `user_id` for `target`, redeemed or not.
    async fn last_vote_at(
        &self,
        user_id: &str,
        target: &EntityRef,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Insert `vote` unless the author already voted for the target after
    /// `since`. Returns `false` when the vote was refused.
    async fn insert_vote_since(
        &self,
        vote: &EntityVote,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Unredeemed votes for `target`, downvotes subtracted.
    async fn vote_count(&self, target: &EntityRef) -> Result<i64, StoreError>;

    /// Collapse all unredeemed votes into one credit record. Returns the
    /// credits redeemed; zero means nothing was written.
    async fn redeem_votes(&self, target: &EntityRef) -> Result<i64, StoreError>;
}

/// Vote reminder bookkeeping.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Reminders whose `last_acked` is before `acked_before`.
    async fn due_reminders(&self, acked_before: DateTime<Utc>)
    -> Result<Vec<Reminder>, StoreError>;

    async fn ack(
        &self,
        user_id: &str,
        target: &EntityRef,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_offset_is_one_based() {
        assert_eq!(page_offset(1), 0);
        assert_eq!(page_offset(0), 0);
        assert_eq!(page_offset(-4), 0);
        assert_eq!(page_offset(3), 2 * DELIVERY_LOG_PAGE_SIZE);
    }

    #[test]
    fn huge_pages_saturate() {
        assert_eq!(page_offset(i64::MAX), i64::MAX);
    }
}
