use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::nullable;
use crate::policy::Owned;

pub const CATEGORY_COLUMNS: &str = "id, user_id, name, type, description, created_at, updated_at";

/// Kind of category. Corresponds to the `category_type` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "category_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    Work,
    Personal,
    Other,
}

impl Default for CategoryType {
    fn default() -> Self {
        CategoryType::Other
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub user_id: i32,
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub category_type: CategoryType,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CategoryInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(rename = "type", default)]
    pub category_type: CategoryType,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct CategoryUpdate {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub category_type: Option<CategoryType>,
    #[serde(default, deserialize_with = "nullable")]
    #[validate(length(max = 500))]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CategoryQuery {
    pub search: Option<String>,
    #[serde(rename = "type")]
    pub category_type: Option<CategoryType>,
    pub user_id: Option<i32>,
}

impl Owned for Category {
    const KIND: &'static str = "category";

    fn owner_id(&self) -> i32 {
        self.user_id
    }
}

impl Category {
    pub fn new(input: CategoryInput, user_id: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: input.name,
            category_type: input.category_type,
            description: input.description,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: CategoryUpdate, now: DateTime<Utc>) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(category_type) = update.category_type {
            self.category_type = category_type;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_input_defaults_to_other() {
        let input: CategoryInput = serde_json::from_value(json!({ "name": "Errands" })).unwrap();
        assert_eq!(input.category_type, CategoryType::Other);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_category_type_wire_format() {
        let input: CategoryInput =
            serde_json::from_value(json!({ "name": "Job", "type": "work" })).unwrap();
        let category = Category::new(input, 3);
        let value = serde_json::to_value(&category).unwrap();
        assert_eq!(value["type"], "work");
        assert_eq!(value["user_id"], 3);
    }

    #[test]
    fn test_category_validation() {
        let input = CategoryInput {
            name: String::new(),
            category_type: CategoryType::Personal,
            description: None,
        };
        assert!(input.validate().is_err());
    }
}
