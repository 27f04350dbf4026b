//! Postgres implementation of the storage traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::schema::{
    DELIVERY_COLUMNS, ENTITY_INFO_COLUMNS, MEMBER_COLUMNS, OWNER_COLUMNS, REMINDER_COLUMNS,
    WEBHOOK_COLUMNS, select_list,
};
use super::{
    DELIVERY_LOG_PAGE_SIZE, EntityStore, ReminderStore, StoreError, TeamStore, VoteStore,
    WebhookStore, page_offset,
};
use crate::models::{
    BotSettings, BrokenTransition, DeliveryAttempt, DeliveryError, EntityInfo, EntityOwner,
    EntityRef, EntityVote, OutcomeCount, Reminder, TargetType, TeamMember, Webhook,
};
use crate::perms::{self, PartialPosition, StaffPermissionSet};
use crate::teams::{MemberEdit, TeamError};
use crate::uuid::uuidv7;

type WebhookRow = (
    Uuid,
    String,
    String,
    String,
    String,
    String,
    bool,
    bool,
    Vec<String>,
    DateTime<Utc>,
);

type DeliveryRow = (
    Uuid,
    Uuid,
    Uuid,
    String,
    String,
    String,
    i32,
    Option<i32>,
    i64,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
);

/// All storage traits over one connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Table holding an owned entity kind.
fn owned_table(target_type: TargetType) -> Option<&'static str> {
    match target_type {
        TargetType::Bot => Some("bots"),
        TargetType::Server => Some("servers"),
        TargetType::Pack => Some("packs"),
        TargetType::Team | TargetType::User => None,
    }
}

/// Team ids are UUIDs; anything else cannot name a team.
fn team_uuid(team_id: &str) -> Option<Uuid> {
    Uuid::parse_str(team_id).ok()
}

fn target_from(target_type: &str, target_id: String) -> Option<EntityRef> {
    match TargetType::parse(target_type) {
        Some(tt) => Some(EntityRef::new(tt, target_id)),
        None => {
            warn!(target_type, target_id, "Skipping row with unknown target type");
            None
        }
    }
}

fn webhook_from_row(row: WebhookRow) -> Option<Webhook> {
    let (id, target_type, target_id, name, url, secret, broken, simple_auth, event_whitelist, created_at) =
        row;
    Some(Webhook {
        id,
        target: target_from(&target_type, target_id)?,
        name,
        url,
        secret,
        broken,
        simple_auth,
        event_whitelist,
        created_at,
    })
}

fn delivery_from_row(row: DeliveryRow) -> Option<DeliveryAttempt> {
    let (
        id,
        webhook_id,
        event_id,
        event_type,
        target_type,
        target_id,
        attempt,
        status_code,
        latency_ms,
        error,
        detail,
        at,
    ) = row;
    Some(DeliveryAttempt {
        id,
        webhook_id,
        event_id,
        event_type,
        target: target_from(&target_type, target_id)?,
        attempt,
        status_code,
        latency_ms,
        error: error.as_deref().and_then(DeliveryError::parse),
        detail,
        at,
    })
}

#[async_trait]
impl EntityStore for PgStore {
    async fn user_by_token(&self, token: &str) -> Result<Option<String>, StoreError> {
        let id = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE api_token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn user_exists(&self, user_id: &str) -> Result<bool, StoreError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn set_token(&self, user_id: &str, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET api_token = $2 WHERE id = $1")
            .bind(user_id)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn entity_owner(&self, target: &EntityRef) -> Result<Option<EntityOwner>, StoreError> {
        let Some(table) = owned_table(target.target_type) else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, (Option<String>, Option<Uuid>)>(&format!(
            "SELECT {} FROM {table} WHERE id = $1",
            select_list(OWNER_COLUMNS)
        ))
        .bind(&target.id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            None => None,
            Some((Some(owner), _)) => Some(EntityOwner::User(owner)),
            Some((None, Some(team))) => Some(EntityOwner::Team(team.to_string())),
            Some((None, None)) => {
                warn!(target = %target, "Entity has neither owner nor team_owner");
                None
            }
        })
    }

    async fn team_exists(&self, team_id: &str) -> Result<bool, StoreError> {
        let Some(team) = team_uuid(team_id) else {
            return Ok(false);
        };
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM teams WHERE id = $1)")
                .bind(team)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn member_flags(
        &self,
        team_id: &str,
        user_id: &str,
    ) -> Result<Option<Vec<String>>, StoreError> {
        let Some(team) = team_uuid(team_id) else {
            return Ok(None);
        };
        let flags = sqlx::query_scalar::<_, Vec<String>>(
            "SELECT flags FROM team_members WHERE team_id = $1 AND user_id = $2",
        )
        .bind(team)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(flags)
    }

    async fn staff_permissions(
        &self,
        user_id: &str,
    ) -> Result<Option<StaffPermissionSet>, StoreError> {
        let Some((positions, overrides)) = sqlx::query_as::<_, (Vec<Uuid>, Vec<String>)>(
            "SELECT positions, perm_overrides FROM staff_members WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, (Uuid, i32, Vec<String>)>(
            "SELECT id, \"index\", perms FROM staff_positions WHERE id = ANY($1)",
        )
        .bind(&positions)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(StaffPermissionSet {
            user_positions: rows
                .into_iter()
                .map(|(id, index, perms)| PartialPosition {
                    id: id.to_string(),
                    index,
                    perms: perms::parse_stored(&perms),
                })
                .collect(),
            perm_overrides: perms::parse_stored(&overrides),
        }))
    }

    async fn update_bot_settings(
        &self,
        bot_id: &str,
        settings: &BotSettings,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE bots SET short = $2, long = $3, prefix = $4, invite = $5, library = $6, tags = $7 \
             WHERE id = $1",
        )
        .bind(bot_id)
        .bind(&settings.short)
        .bind(&settings.long)
        .bind(&settings.prefix)
        .bind(&settings.invite)
        .bind(&settings.library)
        .bind(&settings.tags)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_team_owner(&self, target: &EntityRef, team_id: &str) -> Result<bool, StoreError> {
        let (Some(table), Some(team)) = (owned_table(target.target_type), team_uuid(team_id)) else {
            return Ok(false);
        };
        let result = sqlx::query(&format!(
            "UPDATE {table} SET team_owner = $1, owner = NULL WHERE id = $2"
        ))
        .bind(team)
        .bind(&target.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_entity(&self, target: &EntityRef) -> Result<bool, StoreError> {
        let Some(table) = owned_table(target.target_type) else {
            return Ok(false);
        };
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM webhooks WHERE target_type = $1 AND target_id = $2")
            .bind(target.target_type.as_str())
            .bind(&target.id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(&target.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TeamStore for PgStore {
    async fn members(&self, team_id: &str) -> Result<Vec<TeamMember>, StoreError> {
        let Some(team) = team_uuid(team_id) else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query_as::<_, (String, Vec<String>)>(&format!(
            "SELECT {} FROM team_members WHERE team_id = $1 ORDER BY created_at, user_id",
            select_list(MEMBER_COLUMNS)
        ))
        .bind(team)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(user_id, flags)| TeamMember::new(user_id, flags))
            .collect())
    }

    async fn edit_members(&self, team_id: &str, edit: MemberEdit) -> Result<(), TeamError> {
        let team = team_uuid(team_id).ok_or_else(|| TeamError::NotFound(format!("team {team_id}")))?;

        let mut tx = self.pool.begin().await?;

        // Serializes concurrent edits of the same team.
        let locked = sqlx::query_scalar::<_, Uuid>("SELECT id FROM teams WHERE id = $1 FOR UPDATE")
            .bind(team)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(TeamError::NotFound(format!("team {team_id}")));
        }

        let before: Vec<TeamMember> = sqlx::query_as::<_, (String, Vec<String>)>(&format!(
            "SELECT {} FROM team_members WHERE team_id = $1 ORDER BY created_at, user_id",
            select_list(MEMBER_COLUMNS)
        ))
        .bind(team)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|(user_id, flags)| TeamMember::new(user_id, flags))
        .collect();

        let mut after = before.clone();
        edit(&mut after)?;

        for old in &before {
            if !after.iter().any(|m| m.user_id == old.user_id) {
                sqlx::query("DELETE FROM team_members WHERE team_id = $1 AND user_id = $2")
                    .bind(team)
                    .bind(&old.user_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        for member in &after {
            match before.iter().find(|m| m.user_id == member.user_id) {
                None => {
                    sqlx::query(
                        "INSERT INTO team_members (team_id, user_id, flags) VALUES ($1, $2, $3)",
                    )
                    .bind(team)
                    .bind(&member.user_id)
                    .bind(&member.flags)
                    .execute(&mut *tx)
                    .await?;
                }
                Some(old) if old.flags != member.flags => {
                    sqlx::query(
                        "UPDATE team_members SET flags = $3 WHERE team_id = $1 AND user_id = $2",
                    )
                    .bind(team)
                    .bind(&member.user_id)
                    .bind(&member.flags)
                    .execute(&mut *tx)
                    .await?;
                }
                Some(_) => {}
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_team(&self, team_id: &str) -> Result<(), TeamError> {
        let team = team_uuid(team_id).ok_or_else(|| TeamError::NotFound(format!("team {team_id}")))?;

        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query_scalar::<_, Uuid>("SELECT id FROM teams WHERE id = $1 FOR UPDATE")
            .bind(team)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(TeamError::NotFound(format!("team {team_id}")));
        }

        let owned = sqlx::query_scalar::<_, i64>(
            "SELECT (SELECT COUNT(*) FROM bots WHERE team_owner = $1) \
                  + (SELECT COUNT(*) FROM servers WHERE team_owner = $1) \
                  + (SELECT COUNT(*) FROM packs WHERE team_owner = $1)",
        )
        .bind(team)
        .fetch_one(&mut *tx)
        .await?;
        if owned > 0 {
            return Err(TeamError::Conflict(format!(
                "Team still owns {owned} bots, servers or packs"
            )));
        }

        sqlx::query("DELETE FROM webhooks WHERE target_type = 'team' AND target_id = $1")
            .bind(team_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM teams WHERE id = $1")
            .bind(team)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl WebhookStore for PgStore {
    async fn list(&self, target: &EntityRef) -> Result<Vec<Webhook>, StoreError> {
        let rows = sqlx::query_as::<_, WebhookRow>(&format!(
            "SELECT {} FROM webhooks WHERE target_type = $1 AND target_id = $2 ORDER BY created_at",
            select_list(WEBHOOK_COLUMNS)
        ))
        .bind(target.target_type.as_str())
        .bind(&target.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().filter_map(webhook_from_row).collect())
    }

    async fn get(&self, target: &EntityRef, id: Uuid) -> Result<Option<Webhook>, StoreError> {
        let row = sqlx::query_as::<_, WebhookRow>(&format!(
            "SELECT {} FROM webhooks WHERE target_type = $1 AND target_id = $2 AND id = $3",
            select_list(WEBHOOK_COLUMNS)
        ))
        .bind(target.target_type.as_str())
        .bind(&target.id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(webhook_from_row))
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Webhook>, StoreError> {
        let row = sqlx::query_as::<_, WebhookRow>(&format!(
            "SELECT {} FROM webhooks WHERE id = $1",
            select_list(WEBHOOK_COLUMNS)
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(webhook_from_row))
    }

    async fn upsert(&self, webhook: &Webhook) -> Result<Webhook, StoreError> {
        let row = sqlx::query_as::<_, WebhookRow>(&format!(
            "INSERT INTO webhooks \
                 (id, target_type, target_id, name, url, secret, broken, simple_auth, event_whitelist, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, false, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 url = EXCLUDED.url, \
                 secret = EXCLUDED.secret, \
                 broken = false, \
                 simple_auth = EXCLUDED.simple_auth, \
                 event_whitelist = EXCLUDED.event_whitelist \
             WHERE webhooks.target_type = EXCLUDED.target_type \
               AND webhooks.target_id = EXCLUDED.target_id \
             RETURNING {}",
            select_list(WEBHOOK_COLUMNS)
        ))
        .bind(webhook.id)
        .bind(webhook.target.target_type.as_str())
        .bind(&webhook.target.id)
        .bind(&webhook.name)
        .bind(&webhook.url)
        .bind(&webhook.secret)
        .bind(webhook.simple_auth)
        .bind(&webhook.event_whitelist)
        .bind(webhook.created_at)
        .fetch_optional(&self.pool)
        .await?;

        row.and_then(webhook_from_row).ok_or_else(|| {
            StoreError::Conflict(format!("webhook {} belongs to another entity", webhook.id))
        })
    }

    async fn clear(&self, target: &EntityRef) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM webhooks WHERE target_type = $1 AND target_id = $2")
            .bind(target.target_type.as_str())
            .bind(&target.id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, target: &EntityRef, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM webhooks WHERE target_type = $1 AND target_id = $2 AND id = $3",
        )
        .bind(target.target_type.as_str())
        .bind(&target.id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_broken(&self, target: &EntityRef, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE webhooks SET broken = true WHERE target_type = $1 AND target_id = $2 AND id = $3",
        )
        .bind(target.target_type.as_str())
        .bind(&target.id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_attempt(
        &self,
        attempt: &DeliveryAttempt,
        transition: BrokenTransition,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO webhook_deliveries \
                 (id, webhook_id, event_id, event_type, target_type, target_id, attempt, \
                  status_code, latency_ms, error, detail, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(attempt.id)
        .bind(attempt.webhook_id)
        .bind(attempt.event_id)
        .bind(&attempt.event_type)
        .bind(attempt.target.target_type.as_str())
        .bind(&attempt.target.id)
        .bind(attempt.attempt)
        .bind(attempt.status_code)
        .bind(attempt.latency_ms)
        .bind(attempt.error.map(|e| e.as_str()))
        .bind(&attempt.detail)
        .bind(attempt.at)
        .execute(&mut *tx)
        .await?;

        let broken = match transition {
            BrokenTransition::Unchanged => None,
            BrokenTransition::MarkBroken => Some(true),
            BrokenTransition::Clear => Some(false),
        };
        if let Some(broken) = broken {
            sqlx::query("UPDATE webhooks SET broken = $2 WHERE id = $1")
                .bind(attempt.webhook_id)
                .bind(broken)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delivery_log(
        &self,
        target: &EntityRef,
        page: i64,
    ) -> Result<(Vec<DeliveryAttempt>, i64), StoreError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM webhook_deliveries WHERE target_type = $1 AND target_id = $2",
        )
        .bind(target.target_type.as_str())
        .bind(&target.id)
        .fetch_one(&self.pool)
        .await?;

        let offset = page_offset(page);
        let rows = sqlx::query_as::<_, DeliveryRow>(&format!(
            "SELECT {} FROM webhook_deliveries \
             WHERE target_type = $1 AND target_id = $2 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4",
            select_list(DELIVERY_COLUMNS)
        ))
        .bind(target.target_type.as_str())
        .bind(&target.id)
        .bind(DELIVERY_LOG_PAGE_SIZE)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows.into_iter().filter_map(delivery_from_row).collect(), total))
    }

    async fn delivery_summary(
        &self,
        target: &EntityRef,
        event_type: &str,
    ) -> Result<Vec<OutcomeCount>, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT COALESCE(error, 'success'), COUNT(*) FROM webhook_deliveries \
             WHERE target_type = $1 AND target_id = $2 AND event_type = $3 \
             GROUP BY 1 ORDER BY 1",
        )
        .bind(target.target_type.as_str())
        .bind(&target.id)
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(outcome, count)| OutcomeCount { outcome, count })
            .collect())
    }

    async fn prune_deliveries(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM webhook_deliveries WHERE created_at < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl VoteStore for PgStore {
    async fn entity_info(&self, target: &EntityRef) -> Result<Option<EntityInfo>, StoreError> {
        let columns = select_list(ENTITY_INFO_COLUMNS);
        let query = match target.target_type {
            TargetType::Bot => format!("SELECT {columns}, premium FROM bots WHERE id = $1"),
            TargetType::Server => format!("SELECT {columns}, false FROM servers WHERE id = $1"),
            TargetType::Pack => format!("SELECT {columns}, false FROM packs WHERE id = $1"),
            TargetType::Team => {
                if team_uuid(&target.id).is_none() {
                    return Ok(None);
                }
                format!("SELECT {columns}, false FROM teams WHERE id = $1::uuid")
            }
            TargetType::User => return Ok(None),
        };

        let row = sqlx::query_as::<_, (String, String, bool, bool)>(&query)
            .bind(&target.id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(name, avatar, vote_banned, premium)| EntityInfo {
            name,
            avatar,
            premium,
            vote_banned,
        }))
    }

    async fn last_vote_at(
        &self,
        user_id: &str,
        target: &EntityRef,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let at = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(created_at) FROM entity_votes \
             WHERE author = $1 AND target_type = $2 AND target_id = $3",
        )
        .bind(user_id)
        .bind(target.target_type.as_str())
        .bind(&target.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(at)
    }

    async fn insert_vote_since(
        &self,
        vote: &EntityVote,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        // One writer per (author, target) at a time.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("vote:{}:{}", vote.author, vote.target))
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            "INSERT INTO entity_votes (id, author, target_type, target_id, upvote, redeemed, created_at) \
             SELECT $1, $2, $3, $4, $5, false, $6 \
             WHERE NOT EXISTS ( \
                 SELECT 1 FROM entity_votes \
                 WHERE author = $2 AND target_type = $3 AND target_id = $4 AND created_at > $7 \
             )",
        )
        .bind(vote.id)
        .bind(&vote.author)
        .bind(vote.target.target_type.as_str())
        .bind(&vote.target.id)
        .bind(vote.upvote)
        .bind(vote.created_at)
        .bind(since)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    async fn vote_count(&self, target: &EntityRef) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(CASE WHEN upvote THEN 1 ELSE -1 END), 0)::bigint \
             FROM entity_votes \
             WHERE target_type = $1 AND target_id = $2 AND NOT redeemed",
        )
        .bind(target.target_type.as_str())
        .bind(&target.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn redeem_votes(&self, target: &EntityRef) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, (Uuid, bool)>(
            "SELECT id, upvote FROM entity_votes \
             WHERE target_type = $1 AND target_id = $2 AND NOT redeemed \
             FOR UPDATE",
        )
        .bind(target.target_type.as_str())
        .bind(&target.id)
        .fetch_all(&mut *tx)
        .await?;

        let credits: i64 = rows.iter().map(|(_, up)| if *up { 1 } else { -1 }).sum();
        if credits <= 0 {
            return Ok(0);
        }
        let ids: Vec<Uuid> = rows.into_iter().map(|(id, _)| id).collect();

        sqlx::query("UPDATE entity_votes SET redeemed = true WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO vote_credit_redeems (id, target_type, target_id, credits) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(uuidv7())
        .bind(target.target_type.as_str())
        .bind(&target.id)
        .bind(credits)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(credits)
    }
}

#[async_trait]
impl ReminderStore for PgStore {
    async fn due_reminders(
        &self,
        acked_before: DateTime<Utc>,
    ) -> Result<Vec<Reminder>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, String, DateTime<Utc>)>(&format!(
            "SELECT {} FROM user_reminders WHERE last_acked < $1 ORDER BY last_acked",
            select_list(REMINDER_COLUMNS)
        ))
        .bind(acked_before)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(user_id, target_type, target_id, last_acked)| {
                Some(Reminder {
                    user_id,
                    target: target_from(&target_type, target_id)?,
                    last_acked,
                })
            })
            .collect())
    }

    async fn ack(
        &self,
        user_id: &str,
        target: &EntityRef,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE user_reminders SET last_acked = $4 \
             WHERE user_id = $1 AND target_type = $2 AND target_id = $3",
        )
        .bind(user_id)
        .bind(target.target_type.as_str())
        .bind(&target.id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
