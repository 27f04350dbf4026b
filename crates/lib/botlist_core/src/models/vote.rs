//! Votes, reminders and entity display info.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EntityRef;

/// A single vote. Immutable after insert except for `redeemed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityVote {
    pub id: Uuid,
    pub author: String,
    pub target: EntityRef,
    pub upvote: bool,
    pub redeemed: bool,
    pub created_at: DateTime<Utc>,
}

/// A user's opt-in to be reminded when they can vote for a target again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub user_id: String,
    pub target: EntityRef,
    pub last_acked: DateTime<Utc>,
}

/// Display info used to build alerts and audit embeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub name: String,
    pub avatar: String,
    /// Premium bots have a shorter vote window.
    pub premium: bool,
    pub vote_banned: bool,
}

impl EntityInfo {
    /// Public page of `target` on the frontend.
    pub fn url(target: &EntityRef, frontend: &str) -> String {
        target.target_type.audit_url(frontend, &target.id)
    }

    /// Vote page of `target` on the frontend.
    pub fn vote_url(target: &EntityRef, frontend: &str) -> String {
        format!("{}/vote", Self::url(target, frontend))
    }
}
