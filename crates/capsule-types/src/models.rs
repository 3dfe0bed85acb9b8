use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::countdown::Countdown;
use crate::session::UserId;

/// A capsule as the rest of the application sees it, after decoding from the
/// store record and attaching the store-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capsule {
    pub id: String,
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    pub unlock_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_unlocked: bool,
}

impl Capsule {
    /// Eligible for the locked -> unlocked transition at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_unlocked && self.unlock_date <= now
    }

    pub fn is_locked(&self) -> bool {
        !self.is_unlocked
    }

    /// Contents may be revealed: the flag is set and the date has passed.
    pub fn can_open(&self, now: DateTime<Utc>) -> bool {
        self.is_unlocked && self.unlock_date <= now
    }

    pub fn countdown(&self, now: DateTime<Utc>) -> Countdown {
        Countdown::between(self.unlock_date, now)
    }
}

// -- Creation --

/// User input for a new capsule. Fields are optional or possibly blank here
/// because the presentation layer hands over whatever the form holds; the
/// store adapter rejects incomplete drafts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub unlock_date: Option<DateTime<Utc>>,
    pub user_id: Option<UserId>,
}

impl CapsuleDraft {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        unlock_date: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            unlock_date: Some(unlock_date),
            user_id: None,
        }
    }

    pub fn owned_by(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Names of required fields that are absent. Whitespace-only text
    /// counts as absent.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if self.description.trim().is_empty() {
            missing.push("description");
        }
        if self.unlock_date.is_none() {
            missing.push("unlockDate");
        }
        if self.user_id.as_ref().is_none_or(|id| id.as_str().is_empty()) {
            missing.push("userId");
        }
        missing
    }
}

// -- Updates --

/// Partial update merged into an existing record. `id` and `createdAt` never
/// change after creation, so they have no field here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapsulePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub unlock_date: Option<DateTime<Utc>>,
    pub is_unlocked: Option<bool>,
}

impl CapsulePatch {
    pub fn unlock() -> Self {
        Self {
            is_unlocked: Some(true),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.unlock_date.is_none()
            && self.is_unlocked.is_none()
    }

    /// Applies the patch to an already-decoded capsule, mirroring what the
    /// store does to the record.
    pub fn apply_to(&self, capsule: &mut Capsule) {
        if let Some(title) = &self.title {
            capsule.title = title.clone();
        }
        if let Some(description) = &self.description {
            capsule.description = description.clone();
        }
        if let Some(unlock_date) = self.unlock_date {
            capsule.unlock_date = unlock_date;
        }
        if let Some(is_unlocked) = self.is_unlocked {
            capsule.is_unlocked = is_unlocked;
        }
    }
}
