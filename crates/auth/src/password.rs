//! Password hashing (bcrypt).

use crate::jwt::AuthError;

/// bcrypt hasher with a configurable work factor.
///
/// Production uses `bcrypt::DEFAULT_COST`; tests drop to the minimum cost.
#[derive(Debug, Copy, Clone)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn hash(&self, plain: &str) -> Result<String, AuthError> {
        bcrypt::hash(plain, self.cost).map_err(|e| AuthError::Hash(e.to_string()))
    }

    pub fn verify(&self, plain: &str, hashed: &str) -> bool {
        verify_password(plain, hashed)
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

pub fn hash_password(plain: &str) -> Result<String, AuthError> {
    PasswordHasher::default().hash(plain)
}

/// Malformed hashes count as a mismatch.
pub fn verify_password(plain: &str, hashed: &str) -> bool {
    match bcrypt::verify(plain, hashed) {
        Ok(ok) => ok,
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash could not be verified");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hasher = PasswordHasher::new(4);
        let hashed = hasher.hash("pine-and-oak").unwrap();
        assert_ne!(hashed, "pine-and-oak");
        assert!(hasher.verify("pine-and-oak", &hashed));
        assert!(!hasher.verify("pine-and-ash", &hashed));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
