use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::policy::Owned;

pub const TAG_COLUMNS: &str = "id, user_id, name, color, usage_count, created_at, updated_at";

pub const DEFAULT_TAG_COLOR: &str = "#6b7280";

lazy_static! {
    pub static ref HEX_COLOR_REGEX: Regex = Regex::new(r"^#[0-9a-fA-F]{6}$").expect("color pattern compiles");
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: Uuid,
    pub user_id: i32,
    pub name: String,
    pub color: String,
    /// Number of tasks carrying this tag, maintained on attach/detach.
    pub usage_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The slice of a tag embedded in task responses.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TagSummary {
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct TagInput {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[validate(regex(path = "HEX_COLOR_REGEX", message = "Color must look like #1a2b3c"))]
    pub color: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct TagUpdate {
    #[validate(length(min = 1, max = 50))]
    pub name: Option<String>,
    #[validate(regex(path = "HEX_COLOR_REGEX", message = "Color must look like #1a2b3c"))]
    pub color: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TagQuery {
    pub search: Option<String>,
    pub user_id: Option<i32>,
}

/// Body of the batch attach/detach endpoints.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct TagIdsInput {
    #[validate(length(min = 1, max = 50))]
    pub tag_ids: Vec<Uuid>,
}

impl TagIdsInput {
    /// Tag ids with duplicates removed, in first-seen order.
    pub fn unique_ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::with_capacity(self.tag_ids.len());
        for id in &self.tag_ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }
}

impl Owned for Tag {
    const KIND: &'static str = "tag";

    fn owner_id(&self) -> i32 {
        self.user_id
    }
}

impl Tag {
    pub fn new(input: TagInput, user_id: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: input.name,
            color: input.color.unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string()),
            usage_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: TagUpdate, now: DateTime<Utc>) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(color) = update.color {
            self.color = color;
        }
        self.updated_at = now;
    }
}
