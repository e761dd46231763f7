//! Role entity (surfaced as a SCIM Group)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub display_name: String,
    pub description: Option<String>,
    /// Member user ids. Updates are idempotent set mutations.
    pub members: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: None,
            members: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_member(&mut self, user_id: &str) {
        if !self.members.iter().any(|m| m == user_id) {
            self.members.push(user_id.to_string());
        }
    }

    pub fn remove_member(&mut self, user_id: &str) {
        self.members.retain(|m| m != user_id);
    }
}
