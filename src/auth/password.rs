//! Password hashing (bcrypt).

use crate::error::AppError;

const HASH_COST: u32 = 12;

pub fn hash(password: &str) -> Result<String, AppError> {
    bcrypt::hash(password, HASH_COST).map_err(|e| AppError::Internal(format!("hash: {}", e)))
}

pub fn verify(password: &str, hashed: &str) -> bool {
    bcrypt::verify(password, hashed).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_own_hash_and_rejects_others() {
        let hashed = hash("hunter2!").unwrap();
        assert!(verify("hunter2!", &hashed));
        assert!(!verify("hunter3!", &hashed));
        assert!(!verify("hunter2!", "not-a-bcrypt-hash"));
    }
}
