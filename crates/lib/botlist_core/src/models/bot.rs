//! Editable bot listing fields.

use serde::{Deserialize, Serialize};

/// Settings replaced wholesale by `PATCH /bots/{id}/settings`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotSettings {
    pub short: String,
    #[serde(default)]
    pub long: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub invite: String,
    #[serde(default)]
    pub library: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BotSettings {
    pub const SHORT_MIN: usize = 30;
    pub const SHORT_MAX: usize = 150;
    pub const MAX_TAGS: usize = 10;

    /// Names of fields that fail validation. Empty when valid.
    pub fn invalid_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        let short_len = self.short.chars().count();
        if !(Self::SHORT_MIN..=Self::SHORT_MAX).contains(&short_len) {
            fields.push("short");
        }
        if !self.invite.is_empty()
            && !(self.invite.starts_with("https://") || self.invite.starts_with("http://"))
        {
            fields.push("invite");
        }
        if self.tags.len() > Self::MAX_TAGS || self.tags.iter().any(|t| t.trim().is_empty()) {
            fields.push("tags");
        }
        fields
    }
}
