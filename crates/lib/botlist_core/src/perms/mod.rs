//! Namespaced permissions.
//!
//! A permission is written `namespace.action`. Either component may be `*`;
//! the `global` namespace behaves like `*`, so `global.*` grants everything.
//! A leading `~` turns a permission into a negator that denies whatever it
//! covers, and denies always dominate grants. Text without a `.` is read as
//! `namespace.*`.

mod delegation;
mod resolve;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::warn;

pub use delegation::check_patch_changes;
pub use resolve::{PartialPosition, StaffPermissionSet, resolve};

/// Wildcard component.
pub const WILDCARD: &str = "*";

/// Namespace that matches every namespace.
pub const GLOBAL: &str = "global";

/// Action that clears previously merged permissions in its namespace.
pub const CLEAR: &str = "@clear";

/// Permission errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PermissionError {
    #[error("Invalid permission: {0}")]
    InvalidPermission(String),

    #[error("{0}")]
    Delegation(String),
}

/// A parsed `namespace.action` permission, optionally negated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Permission {
    negated: bool,
    namespace: String,
    action: String,
}

impl Permission {
    /// Build a grant from trusted components.
    pub fn new(namespace: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            negated: false,
            namespace: namespace.into(),
            action: action.into(),
        }
    }

    /// `namespace.*`
    pub fn wildcard(namespace: impl Into<String>) -> Self {
        Self::new(namespace, WILDCARD)
    }

    /// `global.*`, held by team owners.
    pub fn owner() -> Self {
        Self::new(GLOBAL, WILDCARD)
    }

    /// Parse and normalize permission text.
    pub fn parse(text: &str) -> Result<Self, PermissionError> {
        let invalid = || PermissionError::InvalidPermission(text.to_string());

        let trimmed = text.trim();
        let (negated, body) = match trimmed.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let (namespace, action) = match body.split_once('.') {
            Some((ns, action)) => (ns, action),
            None => (body, WILDCARD),
        };

        if !valid_component(namespace) || !(valid_component(action) || action == CLEAR) {
            return Err(invalid());
        }
        if negated && action == CLEAR {
            return Err(invalid());
        }

        Ok(Self {
            negated,
            namespace: namespace.to_string(),
            action: action.to_string(),
        })
    }

    /// Parse a list, failing on the first malformed entry.
    pub fn parse_all<S: AsRef<str>>(texts: &[S]) -> Result<Vec<Self>, PermissionError> {
        texts.iter().map(|t| Self::parse(t.as_ref())).collect()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn is_negator(&self) -> bool {
        self.negated
    }

    pub fn is_clear(&self) -> bool {
        self.action == CLEAR
    }

    /// Whether the namespace matches every namespace.
    pub fn is_any_namespace(&self) -> bool {
        self.namespace == WILDCARD || self.namespace == GLOBAL
    }

    pub fn is_wildcard_action(&self) -> bool {
        self.action == WILDCARD
    }

    /// The same permission with the negation toggled on.
    pub fn negate(&self) -> Self {
        Self {
            negated: true,
            ..self.clone()
        }
    }

    /// The permission without its negation.
    pub fn base(&self) -> Self {
        Self {
            negated: false,
            ..self.clone()
        }
    }

    /// Whether this permission's form covers `requested`, ignoring negation.
    ///
    /// Exact equality matches; otherwise the namespace must be equal or a
    /// wildcard, and the action must be equal or a wildcard.
    pub fn covers(&self, requested: &Permission) -> bool {
        if self.namespace == requested.namespace && self.action == requested.action {
            return true;
        }
        if self.is_clear() || requested.is_clear() {
            return false;
        }
        let namespace_ok = self.is_any_namespace() || self.namespace == requested.namespace;
        let action_ok = self.is_wildcard_action() || self.action == requested.action;
        namespace_ok && action_ok
    }
}

fn valid_component(s: &str) -> bool {
    if s == WILDCARD {
        return true;
    }
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("~")?;
        }
        write!(f, "{}.{}", self.namespace, self.action)
    }
}

impl FromStr for Permission {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Permission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Permission::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Whether `granted` allows `requested`.
///
/// A matching negator anywhere in `granted` denies, regardless of grants.
pub fn matches(granted: &[Permission], requested: &Permission) -> bool {
    let requested = requested.base();
    let mut allowed = false;
    for perm in granted {
        if !perm.covers(&requested) {
            continue;
        }
        if perm.is_negator() {
            return false;
        }
        allowed = true;
    }
    allowed
}

/// Parse permission text read from storage, skipping malformed entries.
pub fn parse_stored<S: AsRef<str>>(texts: &[S]) -> Vec<Permission> {
    texts
        .iter()
        .filter_map(|text| match Permission::parse(text.as_ref()) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Skipping stored permission: {e}");
                None
            }
        })
        .collect()
}

/// Render a list back to text.
pub fn to_strings(perms: &[Permission]) -> Vec<String> {
    perms.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Permission {
        Permission::parse(s).unwrap()
    }

    fn ps(list: &[&str]) -> Vec<Permission> {
        list.iter().map(|s| p(s)).collect()
    }

    #[test]
    fn parse_round_trips_text() {
        for text in ["bot.add", "~bot.delete", "*.view", "global.*", "team_member.edit"] {
            assert_eq!(p(text).to_string(), text);
        }
    }

    #[test]
    fn bare_namespace_means_wildcard_action() {
        assert_eq!(p("bot"), Permission::wildcard("bot"));
        assert_eq!(p("~bot").to_string(), "~bot.*");
    }

    #[test]
    fn parse_trims_whitespace() {
        assert_eq!(p("  bot.add "), p("bot.add"));
    }

    #[test]
    fn parse_rejects_malformed_text() {
        for text in ["", ".", "bot.", ".add", "bot.a b", "b*t.add", "~", "~bot.@clear", "bot.add.x"] {
            assert!(
                Permission::parse(text).is_err(),
                "expected {text:?} to be rejected"
            );
        }
    }

    #[test]
    fn clear_parses_only_as_action() {
        assert!(p("bot.@clear").is_clear());
        assert!(Permission::parse("@clear.bot").is_err());
    }

    #[test]
    fn exact_match() {
        assert!(matches(&ps(&["bot.add"]), &p("bot.add")));
        assert!(!matches(&ps(&["bot.add"]), &p("bot.delete")));
    }

    #[test]
    fn wildcard_namespace_and_action() {
        assert!(matches(&ps(&["*.view"]), &p("team.view")));
        assert!(matches(&ps(&["global.view"]), &p("bot.view")));
        assert!(matches(&ps(&["bot.*"]), &p("bot.delete")));
        assert!(!matches(&ps(&["bot.*"]), &p("team.delete")));
        assert!(matches(&ps(&["global.*"]), &p("team_member.add")));
    }

    #[test]
    fn deny_dominates_grant() {
        assert!(!matches(&ps(&["bot.*", "~bot.delete"]), &p("bot.delete")));
        assert!(matches(&ps(&["bot.*", "~bot.delete"]), &p("bot.edit")));
        assert!(!matches(&ps(&["~bot.delete", "global.*"]), &p("bot.delete")));
        assert!(!matches(&ps(&["global.*", "~bot.*"]), &p("bot.edit")));
    }

    #[test]
    fn negated_request_is_checked_by_its_base() {
        assert!(matches(&ps(&["bot.delete"]), &p("~bot.delete")));
    }

    #[test]
    fn parse_stored_skips_malformed_text() {
        let parsed = parse_stored(&["bot.add", "not valid", "~team.delete"]);
        assert_eq!(to_strings(&parsed), ["bot.add", "~team.delete"]);
    }

    #[test]
    fn empty_grants_match_nothing() {
        assert!(!matches(&[], &p("bot.add")));
    }

    #[test]
    fn serde_uses_text_form() {
        let json = serde_json::to_string(&ps(&["bot.add", "~team.delete"])).unwrap();
        assert_eq!(json, r#"["bot.add","~team.delete"]"#);
        let back: Vec<Permission> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ps(&["bot.add", "~team.delete"]));
        assert!(serde_json::from_str::<Permission>(r#""bad perm""#).is_err());
    }
}
