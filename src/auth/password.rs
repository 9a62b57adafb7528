/// Password Hashing and Verification
///
/// bcrypt with a configurable cost. Both operations are CPU-bound, so the
/// async variants run them on the blocking thread pool.

use bcrypt::{hash, verify};

use crate::error::AppError;

/// Hash a password using bcrypt
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    Ok(hash(password, cost)?)
}

/// Verify a password against its hash
///
/// A hash that cannot be parsed counts as a mismatch rather than an error,
/// so a corrupt row cannot be told apart from a wrong password.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match verify(password, hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::error!(error = %e, "Stored password hash could not be verified");
            false
        }
    }
}

pub async fn hash_password_blocking(password: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password, cost)).await?
}

pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool, AppError> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[test]
    fn test_hash_password() {
        let password = "S3cr3t!x";
        let hash = hash_password(password, TEST_COST).expect("Failed to hash password");

        // Hash should not be the same as password
        assert_ne!(password, hash);
        // Hash should start with bcrypt identifier
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn test_verify_password() {
        let hash = hash_password("S3cr3t!x", TEST_COST).unwrap();

        assert!(verify_password("S3cr3t!x", &hash));
        assert!(!verify_password("wrong-pw", &hash));
    }

    #[test]
    fn test_same_password_different_salts() {
        let a = hash_password("S3cr3t!x", TEST_COST).unwrap();
        let b = hash_password("S3cr3t!x", TEST_COST).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_corrupt_hash_is_a_mismatch() {
        assert!(!verify_password("S3cr3t!x", "not-a-bcrypt-hash"));
    }

    #[tokio::test]
    async fn test_blocking_variants() {
        let hash = hash_password_blocking("S3cr3t!x".to_string(), TEST_COST)
            .await
            .unwrap();
        assert!(verify_password_blocking("S3cr3t!x".to_string(), hash).await.unwrap());
    }
}
