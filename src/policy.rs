//! # Ownership authorization
//!
//! Every category, tag, task and todo belongs to exactly one user. A principal may
//! view, update or delete a resource when it owns the resource or carries the admin
//! flag; anything else is a `403 Forbidden`. Handlers load the row first (a missing
//! row is a `404`) and then call [`authorize`], so the rule lives in one place.

use std::fmt;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;

/// What the principal wants to do with the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let verb = match self {
            Action::View => "view",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        f.write_str(verb)
    }
}

/// A resource with an owning user.
pub trait Owned {
    /// Human-readable resource name used in error messages, e.g. `"task"`.
    const KIND: &'static str;

    fn owner_id(&self) -> i32;
}

/// Pure decision: admins may do anything, owners may do anything to their own rows.
pub fn is_allowed<R: Owned>(principal: &AuthenticatedUser, resource: &R, _action: Action) -> bool {
    principal.is_admin || resource.owner_id() == principal.id
}

/// [`is_allowed`] surfaced as `AppError::Forbidden`.
pub fn authorize<R: Owned>(
    principal: &AuthenticatedUser,
    resource: &R,
    action: Action,
) -> Result<(), AppError> {
    if is_allowed(principal, resource, action) {
        return Ok(());
    }
    log::warn!(
        "User {} denied {} on {} owned by user {}",
        principal.id,
        action,
        R::KIND,
        resource.owner_id()
    );
    Err(AppError::Forbidden(format!(
        "You are not allowed to {} this {}",
        action,
        R::KIND
    )))
}

/// The user whose rows a list endpoint returns.
///
/// Regular users always see their own rows; admins may ask for another user's.
pub fn scoped_owner(principal: &AuthenticatedUser, requested: Option<i32>) -> Result<i32, AppError> {
    match requested {
        None => Ok(principal.id),
        Some(user_id) if user_id == principal.id || principal.is_admin => Ok(user_id),
        Some(_) => Err(AppError::Forbidden(
            "You may only list your own resources".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Note {
        user_id: i32,
    }

    impl Owned for Note {
        const KIND: &'static str = "note";

        fn owner_id(&self) -> i32 {
            self.user_id
        }
    }

    const ACTIONS: [Action; 3] = [Action::View, Action::Update, Action::Delete];

    fn user(id: i32) -> AuthenticatedUser {
        AuthenticatedUser {
            id,
            is_admin: false,
        }
    }

    fn admin(id: i32) -> AuthenticatedUser {
        AuthenticatedUser { id, is_admin: true }
    }

    #[test]
    fn owner_is_always_allowed() {
        let note = Note { user_id: 4 };
        for action in ACTIONS {
            assert!(authorize(&user(4), &note, action).is_ok());
        }
    }

    #[test]
    fn other_users_are_forbidden() {
        let note = Note { user_id: 4 };
        for action in ACTIONS {
            match authorize(&user(5), &note, action) {
                Err(AppError::Forbidden(msg)) => {
                    assert_eq!(msg, format!("You are not allowed to {} this note", action))
                }
                other => panic!("expected Forbidden, got {:?}", other),
            }
        }
    }

    #[test]
    fn admin_bypasses_ownership() {
        let note = Note { user_id: 4 };
        for action in ACTIONS {
            assert!(is_allowed(&admin(1), &note, action));
        }
    }

    #[test]
    fn list_scope() {
        assert_eq!(scoped_owner(&user(3), None).unwrap(), 3);
        assert_eq!(scoped_owner(&user(3), Some(3)).unwrap(), 3);
        assert!(matches!(
            scoped_owner(&user(3), Some(8)),
            Err(AppError::Forbidden(_))
        ));
        assert_eq!(scoped_owner(&admin(1), Some(8)).unwrap(), 8);
    }
}
