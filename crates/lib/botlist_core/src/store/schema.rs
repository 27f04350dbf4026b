//! Column lists read by `PgStore`, and the startup check that the live
//! schema provides them.
//!
//! Reads select through these constants, so adding a column to a read only
//! touches the constant and the row mapping. [`verify`] compares them
//! against `information_schema` once at startup.

use std::collections::HashSet;

use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

pub const USER_COLUMNS: &[&str] = &["id", "api_token"];
pub const TEAM_COLUMNS: &[&str] = &["id", "name", "avatar", "vote_banned"];
pub const MEMBER_COLUMNS: &[&str] = &["user_id", "flags"];
pub const OWNER_COLUMNS: &[&str] = &["owner", "team_owner"];
pub const BOT_SETTINGS_COLUMNS: &[&str] = &["short", "long", "prefix", "invite", "library", "tags"];
pub const ENTITY_INFO_COLUMNS: &[&str] = &["name", "avatar", "vote_banned"];
pub const WEBHOOK_COLUMNS: &[&str] = &[
    "id",
    "target_type",
    "target_id",
    "name",
    "url",
    "secret",
    "broken",
    "simple_auth",
    "event_whitelist",
    "created_at",
];
pub const DELIVERY_COLUMNS: &[&str] = &[
    "id",
    "webhook_id",
    "event_id",
    "event_type",
    "target_type",
    "target_id",
    "attempt",
    "status_code",
    "latency_ms",
    "error",
    "detail",
    "created_at",
];
pub const VOTE_COLUMNS: &[&str] = &["id", "author", "target_type", "target_id", "upvote", "redeemed", "created_at"];
pub const REDEEM_COLUMNS: &[&str] = &["id", "target_type", "target_id", "credits", "redeemed_at"];
pub const REMINDER_COLUMNS: &[&str] = &["user_id", "target_type", "target_id", "last_acked"];
pub const POSITION_COLUMNS: &[&str] = &["id", "index", "perms"];
pub const STAFF_MEMBER_COLUMNS: &[&str] = &["user_id", "positions", "perm_overrides"];

/// Every `(table, columns)` pair the store relies on.
pub const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("users", USER_COLUMNS),
    ("teams", TEAM_COLUMNS),
    ("team_members", &["team_id", "user_id", "flags"]),
    ("bots", OWNER_COLUMNS),
    ("bots", BOT_SETTINGS_COLUMNS),
    ("bots", ENTITY_INFO_COLUMNS),
    ("bots", &["premium"]),
    ("servers", OWNER_COLUMNS),
    ("servers", ENTITY_INFO_COLUMNS),
    ("packs", OWNER_COLUMNS),
    ("packs", ENTITY_INFO_COLUMNS),
    ("webhooks", WEBHOOK_COLUMNS),
    ("webhook_deliveries", DELIVERY_COLUMNS),
    ("entity_votes", VOTE_COLUMNS),
    ("vote_credit_redeems", REDEEM_COLUMNS),
    ("user_reminders", REMINDER_COLUMNS),
    ("staff_positions", POSITION_COLUMNS),
    ("staff_members", STAFF_MEMBER_COLUMNS),
];

/// Schema check errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
}

/// Quoted, comma-separated select list.
pub fn select_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `table.column` names from [`REQUIRED_COLUMNS`] absent from `present`.
pub fn missing_columns(present: &HashSet<(String, String)>) -> Vec<String> {
    let mut missing = Vec::new();
    for (table, columns) in REQUIRED_COLUMNS {
        for column in *columns {
            let key = (table.to_string(), column.to_string());
            let name = format!("{table}.{column}");
            if !present.contains(&key) && !missing.contains(&name) {
                missing.push(name);
            }
        }
    }
    missing
}

/// Fail fast when the connected database lacks a column the store reads.
pub async fn verify(pool: &PgPool) -> Result<(), SchemaError> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT table_name::text, column_name::text \
         FROM information_schema.columns \
         WHERE table_schema = current_schema()",
    )
    .fetch_all(pool)
    .await?;

    let present: HashSet<(String, String)> = rows.into_iter().collect();
    let missing = missing_columns(&present);
    if !missing.is_empty() {
        return Err(SchemaError::MissingColumns(missing));
    }

    info!(tables = REQUIRED_COLUMNS.len(), "Schema check passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn everything() -> HashSet<(String, String)> {
        REQUIRED_COLUMNS
            .iter()
            .flat_map(|(table, columns)| {
                columns
                    .iter()
                    .map(move |c| (table.to_string(), c.to_string()))
            })
            .collect()
    }

    #[test]
    fn complete_schema_has_nothing_missing() {
        assert!(missing_columns(&everything()).is_empty());
    }

    #[test]
    fn reports_each_missing_column_once() {
        let mut present = everything();
        present.remove(&("webhooks".to_string(), "broken".to_string()));
        present.remove(&("bots".to_string(), "owner".to_string()));
        assert_eq!(missing_columns(&present), ["bots.owner", "webhooks.broken"]);
    }

    #[test]
    fn select_list_quotes_identifiers() {
        assert_eq!(select_list(POSITION_COLUMNS), r#""id", "index", "perms""#);
    }
}
