use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Capsule;
use crate::session::UserId;

/// Capsule as stored in the document store, keyed by its generated id.
///
/// ```json
/// { "title": "...", "description": "...", "unlockDate": "2030-01-01T00:00:00.000Z",
///   "userId": "...", "createdAt": "...", "isUnlocked": false, "files": [] }
/// ```
///
/// `files` is always written empty and never read back into the domain model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleRecord {
    pub title: String,
    pub description: String,
    #[serde(with = "crate::timestamp")]
    pub unlock_date: DateTime<Utc>,
    pub user_id: UserId,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_unlocked: bool,
    #[serde(default)]
    pub files: Vec<serde_json::Value>,
}

impl CapsuleRecord {
    pub fn into_capsule(self, id: String) -> Capsule {
        Capsule {
            id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            unlock_date: self.unlock_date,
            created_at: self.created_at,
            is_unlocked: self.is_unlocked,
        }
    }
}

// Field names used when building partial updates by hand.
pub const FIELD_TITLE: &str = "title";
pub const FIELD_DESCRIPTION: &str = "description";
pub const FIELD_UNLOCK_DATE: &str = "unlockDate";
pub const FIELD_IS_UNLOCKED: &str = "isUnlocked";
