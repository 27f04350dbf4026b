//! In-process store for tests and single-node development.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    DELIVERY_LOG_PAGE_SIZE, EntityStore, ReminderStore, StoreError, TeamStore, VoteStore,
    WebhookStore, page_offset,
};
use crate::models::{
    BotSettings, BrokenTransition, DeliveryAttempt, EntityInfo, EntityOwner, EntityRef,
    EntityVote, OutcomeCount, Reminder, TargetType, TeamMember, Webhook,
};
use crate::perms::StaffPermissionSet;
use crate::teams::{MemberEdit, TeamError};

#[derive(Default)]
struct Tables {
    /// user id → API token
    users: HashMap<String, String>,
    /// team id → name
    teams: HashMap<String, String>,
    members: HashMap<String, Vec<TeamMember>>,
    entities: HashMap<EntityRef, EntityOwner>,
    bot_settings: HashMap<String, BotSettings>,
    staff: HashMap<String, StaffPermissionSet>,
    webhooks: Vec<Webhook>,
    deliveries: Vec<DeliveryAttempt>,
    infos: HashMap<EntityRef, EntityInfo>,
    votes: Vec<EntityVote>,
    redeems: Vec<(EntityRef, i64)>,
    reminders: Vec<Reminder>,
}

/// Every storage trait over one mutex-guarded set of tables.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_user(&self, user_id: &str, token: &str) {
        self.tables()
            .users
            .insert(user_id.to_string(), token.to_string());
    }

    pub fn add_team(&self, team_id: &str, name: &str) {
        self.tables()
            .teams
            .insert(team_id.to_string(), name.to_string());
    }

    pub fn add_member(&self, team_id: &str, member: TeamMember) {
        self.tables()
            .members
            .entry(team_id.to_string())
            .or_default()
            .push(member);
    }

    pub fn add_entity(&self, target: &EntityRef, owner: EntityOwner) {
        self.tables().entities.insert(target.clone(), owner);
    }

    pub fn set_staff(&self, user_id: &str, set: StaffPermissionSet) {
        self.tables().staff.insert(user_id.to_string(), set);
    }

    pub fn set_entity_info(&self, target: &EntityRef, info: EntityInfo) {
        self.tables().infos.insert(target.clone(), info);
    }

    pub fn add_vote(&self, vote: EntityVote) {
        self.tables().votes.push(vote);
    }

    pub fn add_reminder(&self, reminder: Reminder) {
        self.tables().reminders.push(reminder);
    }

    pub fn token_of(&self, user_id: &str) -> Option<String> {
        self.tables().users.get(user_id).cloned()
    }

    pub fn bot_settings(&self, bot_id: &str) -> Option<BotSettings> {
        self.tables().bot_settings.get(bot_id).cloned()
    }

    /// Every delivery record in insertion order.
    pub fn deliveries(&self) -> Vec<DeliveryAttempt> {
        self.tables().deliveries.clone()
    }

    pub fn reminders(&self) -> Vec<Reminder> {
        self.tables().reminders.clone()
    }

    pub fn redeemed(&self, target: &EntityRef) -> Vec<i64> {
        self.tables()
            .redeems
            .iter()
            .filter(|(t, _)| t == target)
            .map(|(_, credits)| *credits)
            .collect()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn user_by_token(&self, token: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .tables()
            .users
            .iter()
            .find(|(_, t)| t.as_str() == token)
            .map(|(id, _)| id.clone()))
    }

    async fn user_exists(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.tables().users.contains_key(user_id))
    }

    async fn set_token(&self, user_id: &str, token: &str) -> Result<bool, StoreError> {
        Ok(match self.tables().users.get_mut(user_id) {
            Some(existing) => {
                *existing = token.to_string();
                true
            }
            None => false,
        })
    }

    async fn entity_owner(&self, target: &EntityRef) -> Result<Option<EntityOwner>, StoreError> {
        if !target.target_type.is_owned() {
            return Ok(None);
        }
        Ok(self.tables().entities.get(target).cloned())
    }

    async fn team_exists(&self, team_id: &str) -> Result<bool, StoreError> {
        Ok(self.tables().teams.contains_key(team_id))
    }

    async fn member_flags(
        &self,
        team_id: &str,
        user_id: &str,
    ) -> Result<Option<Vec<String>>, StoreError> {
        Ok(self
            .tables()
            .members
            .get(team_id)
            .and_then(|members| members.iter().find(|m| m.user_id == user_id))
            .map(|m| m.flags.clone()))
    }

    async fn staff_permissions(
        &self,
        user_id: &str,
    ) -> Result<Option<StaffPermissionSet>, StoreError> {
        Ok(self.tables().staff.get(user_id).cloned())
    }

    async fn update_bot_settings(
        &self,
        bot_id: &str,
        settings: &BotSettings,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        let bot = EntityRef::new(TargetType::Bot, bot_id);
        if !tables.entities.contains_key(&bot) {
            return Ok(false);
        }
        tables
            .bot_settings
            .insert(bot_id.to_string(), settings.clone());
        Ok(true)
    }

    async fn set_team_owner(&self, target: &EntityRef, team_id: &str) -> Result<bool, StoreError> {
        Ok(match self.tables().entities.get_mut(target) {
            Some(owner) => {
                *owner = EntityOwner::Team(team_id.to_string());
                true
            }
            None => false,
        })
    }

    async fn delete_entity(&self, target: &EntityRef) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        let existed = tables.entities.remove(target).is_some();
        tables.webhooks.retain(|w| &w.target != target);
        tables.bot_settings.remove(&target.id);
        Ok(existed)
    }
}

#[async_trait]
impl TeamStore for MemoryStore {
    async fn members(&self, team_id: &str) -> Result<Vec<TeamMember>, StoreError> {
        Ok(self
            .tables()
            .members
            .get(team_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn edit_members(&self, team_id: &str, edit: MemberEdit) -> Result<(), TeamError> {
        let mut tables = self.tables();
        if !tables.teams.contains_key(team_id) {
            return Err(TeamError::NotFound(format!("team {team_id}")));
        }
        let mut members = tables.members.get(team_id).cloned().unwrap_or_default();
        edit(&mut members)?;
        tables.members.insert(team_id.to_string(), members);
        Ok(())
    }

    async fn delete_team(&self, team_id: &str) -> Result<(), TeamError> {
        let mut tables = self.tables();
        if !tables.teams.contains_key(team_id) {
            return Err(TeamError::NotFound(format!("team {team_id}")));
        }
        let owns_entities = tables
            .entities
            .values()
            .any(|owner| matches!(owner, EntityOwner::Team(t) if t == team_id));
        if owns_entities {
            return Err(TeamError::Conflict(
                "Team still owns bots, servers or packs".into(),
            ));
        }
        tables.teams.remove(team_id);
        tables.members.remove(team_id);
        tables.webhooks.retain(|w| {
            !(w.target.target_type == TargetType::Team && w.target.id == team_id)
        });
        Ok(())
    }
}

#[async_trait]
impl WebhookStore for MemoryStore {
    async fn list(&self, target: &EntityRef) -> Result<Vec<Webhook>, StoreError> {
        Ok(self
            .tables()
            .webhooks
            .iter()
            .filter(|w| &w.target == target)
            .cloned()
            .collect())
    }

    async fn get(&self, target: &EntityRef, id: Uuid) -> Result<Option<Webhook>, StoreError> {
        Ok(self
            .tables()
            .webhooks
            .iter()
            .find(|w| w.id == id && &w.target == target)
            .cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Webhook>, StoreError> {
        Ok(self.tables().webhooks.iter().find(|w| w.id == id).cloned())
    }

    async fn upsert(&self, webhook: &Webhook) -> Result<Webhook, StoreError> {
        let mut tables = self.tables();
        let mut stored = webhook.clone();
        stored.broken = false;
        match tables.webhooks.iter_mut().find(|w| w.id == webhook.id) {
            Some(existing) => {
                if existing.target != webhook.target {
                    return Err(StoreError::Conflict(format!(
                        "webhook {} belongs to another entity",
                        webhook.id
                    )));
                }
                stored.created_at = existing.created_at;
                *existing = stored.clone();
            }
            None => tables.webhooks.push(stored.clone()),
        }
        Ok(stored)
    }

    async fn clear(&self, target: &EntityRef) -> Result<u64, StoreError> {
        let mut tables = self.tables();
        let before = tables.webhooks.len();
        tables.webhooks.retain(|w| &w.target != target);
        Ok((before - tables.webhooks.len()) as u64)
    }

    async fn delete(&self, target: &EntityRef, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        let before = tables.webhooks.len();
        tables
            .webhooks
            .retain(|w| !(w.id == id && &w.target == target));
        Ok(tables.webhooks.len() != before)
    }

    async fn mark_broken(&self, target: &EntityRef, id: Uuid) -> Result<bool, StoreError> {
        Ok(
            match self
                .tables()
                .webhooks
                .iter_mut()
                .find(|w| w.id == id && &w.target == target)
            {
                Some(w) => {
                    w.broken = true;
                    true
                }
                None => false,
            },
        )
    }

    async fn record_attempt(
        &self,
        attempt: &DeliveryAttempt,
        transition: BrokenTransition,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables();
        tables.deliveries.push(attempt.clone());
        if let Some(w) = tables
            .webhooks
            .iter_mut()
            .find(|w| w.id == attempt.webhook_id)
        {
            match transition {
                BrokenTransition::Unchanged => {}
                BrokenTransition::MarkBroken => w.broken = true,
                BrokenTransition::Clear => w.broken = false,
            }
        }
        Ok(())
    }

    async fn delivery_log(
        &self,
        target: &EntityRef,
        page: i64,
    ) -> Result<(Vec<DeliveryAttempt>, i64), StoreError> {
        let tables = self.tables();
        let mut rows: Vec<DeliveryAttempt> = tables
            .deliveries
            .iter()
            .rev()
            .filter(|d| &d.target == target)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.at.cmp(&a.at));
        let total = rows.len() as i64;
        let offset = page_offset(page);
        let rows = rows
            .into_iter()
            .skip(offset as usize)
            .take(DELIVERY_LOG_PAGE_SIZE as usize)
            .collect();
        Ok((rows, total))
    }

    async fn delivery_summary(
        &self,
        target: &EntityRef,
        event_type: &str,
    ) -> Result<Vec<OutcomeCount>, StoreError> {
        let mut counts: HashMap<&'static str, i64> = HashMap::new();
        for d in self
            .tables()
            .deliveries
            .iter()
            .filter(|d| &d.target == target && d.event_type == event_type)
        {
            *counts.entry(d.outcome()).or_default() += 1;
        }
        let mut summary: Vec<OutcomeCount> = counts
            .into_iter()
            .map(|(outcome, count)| OutcomeCount {
                outcome: outcome.to_string(),
                count,
            })
            .collect();
        summary.sort_by(|a, b| a.outcome.cmp(&b.outcome));
        Ok(summary)
    }

    async fn prune_deliveries(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.tables();
        let before = tables.deliveries.len();
        tables.deliveries.retain(|d| d.at >= older_than);
        Ok((before - tables.deliveries.len()) as u64)
    }
}

#[async_trait]
impl VoteStore for MemoryStore {
    async fn entity_info(&self, target: &EntityRef) -> Result<Option<EntityInfo>, StoreError> {
        Ok(self.tables().infos.get(target).cloned())
    }

    async fn last_vote_at(
        &self,
        user_id: &str,
        target: &EntityRef,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .tables()
            .votes
            .iter()
            .filter(|v| v.author == user_id && &v.target == target)
            .map(|v| v.created_at)
            .max())
    }

    async fn insert_vote_since(
        &self,
        vote: &EntityVote,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        let recent = tables
            .votes
            .iter()
            .any(|v| v.author == vote.author && v.target == vote.target && v.created_at > since);
        if recent {
            return Ok(false);
        }
        tables.votes.push(vote.clone());
        Ok(true)
    }

    async fn vote_count(&self, target: &EntityRef) -> Result<i64, StoreError> {
        Ok(count_unredeemed(&self.tables().votes, target))
    }

    async fn redeem_votes(&self, target: &EntityRef) -> Result<i64, StoreError> {
        let mut tables = self.tables();
        let credits = count_unredeemed(&tables.votes, target);
        if credits <= 0 {
            return Ok(0);
        }
        for vote in tables.votes.iter_mut().filter(|v| &v.target == target) {
            vote.redeemed = true;
        }
        tables.redeems.push((target.clone(), credits));
        Ok(credits)
    }
}

fn count_unredeemed(votes: &[EntityVote], target: &EntityRef) -> i64 {
    votes
        .iter()
        .filter(|v| &v.target == target && !v.redeemed)
        .map(|v| if v.upvote { 1 } else { -1 })
        .sum()
}

#[async_trait]
impl ReminderStore for MemoryStore {
    async fn due_reminders(
        &self,
        acked_before: DateTime<Utc>,
    ) -> Result<Vec<Reminder>, StoreError> {
        Ok(self
            .tables()
            .reminders
            .iter()
            .filter(|r| r.last_acked < acked_before)
            .cloned()
            .collect())
    }

    async fn ack(
        &self,
        user_id: &str,
        target: &EntityRef,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        for reminder in self
            .tables()
            .reminders
            .iter_mut()
            .filter(|r| r.user_id == user_id && &r.target == target)
        {
            reminder.last_acked = at;
        }
        Ok(())
    }
}
