use bcrypt::{hash, verify};

use crate::error::AppError;

/// bcrypt work factor for newly stored hashes.
const BCRYPT_COST: u32 = 12;

/// Hashes a password for the `users.password_hash` column.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    Ok(hash(password, BCRYPT_COST)?)
}

/// Checks a password against a stored hash. A malformed hash is an error, not a mismatch.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AppError> {
    Ok(verify(password, stored_hash)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_round_trip() {
        let stored = hash_password("correct horse").unwrap();

        assert!(stored.starts_with("$2"));
        assert!(verify_password("correct horse", &stored).unwrap());
        assert!(!verify_password("battery staple", &stored).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hash_password("same input").unwrap();
        let second = hash_password("same input").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_malformed_hash_is_never_a_match() {
        assert!(!matches!(verify_password("anything", "not-a-bcrypt-hash"), Ok(true)));
    }
}
