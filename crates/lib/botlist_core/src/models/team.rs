//! Team membership rows.

use serde::{Deserialize, Serialize};

/// A user's membership in a team. `flags` is stored as permission text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub user_id: String,
    pub flags: Vec<String>,
}

impl TeamMember {
    pub fn new(user_id: impl Into<String>, flags: Vec<String>) -> Self {
        Self {
            user_id: user_id.into(),
            flags,
        }
    }
}
