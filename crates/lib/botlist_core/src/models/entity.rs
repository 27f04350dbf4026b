//! Addressable entities: bots, servers, teams, packs and users.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of entity a permission check, webhook, or vote is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Bot,
    Server,
    Team,
    Pack,
    User,
}

impl TargetType {
    pub const ALL: [TargetType; 5] = [
        TargetType::Bot,
        TargetType::Server,
        TargetType::Team,
        TargetType::Pack,
        TargetType::User,
    ];

    /// Parse a path segment, stripping a single trailing `s` (`bots` → `bot`).
    pub fn parse(raw: &str) -> Option<Self> {
        let name = raw.strip_suffix('s').unwrap_or(raw);
        match name {
            "bot" => Some(TargetType::Bot),
            "server" => Some(TargetType::Server),
            "team" => Some(TargetType::Team),
            "pack" => Some(TargetType::Pack),
            "user" => Some(TargetType::User),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Bot => "bot",
            TargetType::Server => "server",
            TargetType::Team => "team",
            TargetType::Pack => "pack",
            TargetType::User => "user",
        }
    }

    /// Permission namespace governing actions on this entity kind.
    pub fn namespace(&self) -> &'static str {
        self.as_str()
    }

    /// Whether the entity is owned by either a single user or a team.
    pub fn is_owned(&self) -> bool {
        matches!(self, TargetType::Bot | TargetType::Server | TargetType::Pack)
    }

    /// Public page of the entity on the frontend.
    pub fn audit_url(&self, frontend: &str, id: &str) -> String {
        let frontend = frontend.trim_end_matches('/');
        match self {
            TargetType::Bot => format!("{frontend}/bot/{id}"),
            TargetType::Server => format!("{frontend}/server/{id}"),
            TargetType::Team => format!("{frontend}/team/{id}"),
            TargetType::Pack => format!("{frontend}/pack/{id}"),
            TargetType::User => format!("{frontend}/user/{id}"),
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetType::parse(s).ok_or_else(|| format!("invalid target type: {s}"))
    }
}

/// `(target_type, target_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub target_type: TargetType,
    pub id: String,
}

impl EntityRef {
    pub fn new(target_type: TargetType, id: impl Into<String>) -> Self {
        Self {
            target_type,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.target_type, self.id)
    }
}

/// Owner of a bot, server or pack. Exactly one of the two is ever set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityOwner {
    User(String),
    Team(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_single_trailing_s() {
        assert_eq!(TargetType::parse("bots"), Some(TargetType::Bot));
        assert_eq!(TargetType::parse("bot"), Some(TargetType::Bot));
        assert_eq!(TargetType::parse("teams"), Some(TargetType::Team));
        assert_eq!(TargetType::parse("userss"), None);
        assert_eq!(TargetType::parse("blog"), None);
    }

    #[test]
    fn only_bots_servers_and_packs_are_owned() {
        let owned: Vec<_> = TargetType::ALL.iter().filter(|t| t.is_owned()).collect();
        assert_eq!(
            owned,
            vec![&TargetType::Bot, &TargetType::Server, &TargetType::Pack]
        );
    }

    #[test]
    fn entity_ref_serializes_type_key() {
        let r = EntityRef::new(TargetType::Bot, "2");
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json, serde_json::json!({"type": "bot", "id": "2"}));
    }

    #[test]
    fn audit_url_trims_trailing_slash() {
        assert_eq!(
            TargetType::Team.audit_url("https://botlist.site/", "abc"),
            "https://botlist.site/team/abc"
        );
    }
}
