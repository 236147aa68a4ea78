use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::auth::USERNAME_REGEX;

pub const USER_COLUMNS: &str = "id, username, email, is_admin, created_at, updated_at, deleted_at";

/// A user account; the password hash never leaves the database layer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when an admin soft-deletes the account.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Admin-side account creation.
#[derive(Debug, Deserialize, Validate)]
pub struct UserInput {
    #[validate(
        length(min = 3, max = 32),
        regex(
            path = "USERNAME_REGEX",
            message = "Username must be alphanumeric, underscores, or hyphens"
        )
    )]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Admin-side partial account update.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UserUpdate {
    #[validate(
        length(min = 3, max = 32),
        regex(
            path = "USERNAME_REGEX",
            message = "Username must be alphanumeric, underscores, or hyphens"
        )
    )]
    pub username: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 6))]
    pub password: Option<String>,
    pub is_admin: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_user_input_validation() {
        let input = UserInput {
            username: "testuser".to_string(),
            email: "test@example.com".to_string(),
            password: "password123".to_string(),
            is_admin: false,
        };
        assert!(input.validate().is_ok());

        let input = UserInput {
            username: "testuser".to_string(),
            email: "invalid-email".to_string(),
            password: "password123".to_string(),
            is_admin: false,
        };
        assert!(input.validate().is_err());

        let input = UserInput {
            username: "test user".to_string(),
            email: "test@example.com".to_string(),
            password: "short".to_string(),
            is_admin: true,
        };
        let errors = input.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn test_user_update_validates_present_fields_only() {
        assert!(UserUpdate::default().validate().is_ok());

        let update = UserUpdate {
            email: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_user_serialization_has_no_password() {
        let user = User {
            id: 1,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            is_admin: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("password_hash").is_none());
    }
}
