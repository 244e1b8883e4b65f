//! Model Mixins
//!
//! Field groups shared by CMS records. Embed them with `#[serde(flatten)]`
//! so their fields sit at the top level of the stored record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::current_time;

/// Fields every table carries
pub const COMMON_FIELDS: [&str; 5] = ["id", "created_at", "updated_at", "is_deleted", "deleted_at"];
/// Soft delete fields
pub const SOFT_DELETE_FIELDS: [&str; 2] = ["is_deleted", "deleted_at"];
/// Publishing fields
pub const PUBLISHABLE_FIELDS: [&str; 3] = ["is_published", "published_at", "unpublished_at"];
/// Slug fields
pub const SLUG_FIELDS: [&str; 1] = ["slug"];

/// Generate a new time-ordered record ID
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Creation and modification timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Timestamps {
    fn default() -> Self {
        let now = current_time();
        Self {
            created_at: now,
            updated_at: now,
        }
    }
}

impl Timestamps {
    /// Bump `updated_at`
    pub fn touch(&mut self) {
        self.updated_at = current_time();
    }
}

/// Soft delete flag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoftDelete {
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SoftDelete {
    pub fn mark_deleted(&mut self) {
        self.is_deleted = true;
        self.deleted_at = Some(current_time());
    }

    pub fn restore(&mut self) {
        self.is_deleted = false;
        self.deleted_at = None;
    }
}

/// Publishing state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Publishable {
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unpublished_at: Option<DateTime<Utc>>,
}

impl Publishable {
    pub fn publish(&mut self) {
        self.is_published = true;
        self.published_at = Some(current_time());
    }

    pub fn unpublish(&mut self) {
        self.is_published = false;
        self.unpublished_at = Some(current_time());
    }
}

/// ID, timestamps and soft delete: the fields every table carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonFields {
    pub id: String,
    #[serde(flatten)]
    pub timestamps: Timestamps,
    #[serde(flatten)]
    pub soft_delete: SoftDelete,
}

impl Default for CommonFields {
    fn default() -> Self {
        Self {
            id: new_id(),
            timestamps: Timestamps::default(),
            soft_delete: SoftDelete::default(),
        }
    }
}
