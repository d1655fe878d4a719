//! Argon2id password hashes in PHC string form.
//!
//! Hashing is deliberately slow, so the async entry points run it on the
//! blocking pool instead of a runtime worker.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::RngCore;
use thiserror::Error;

const SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(argon2::password_hash::Error),

    #[error("password worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Hashes `password` with a fresh random salt, e.g. `$argon2id$v=19$...`.
pub fn hash(password: &str) -> Result<String, PasswordError> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt).map_err(PasswordError::Hash)?;
    let hashed = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(PasswordError::Hash)?;
    Ok(hashed.to_string())
}

/// Checks `password` against a PHC string. Malformed hashes never verify.
pub fn verify(password: &str, encoded: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(encoded) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub async fn hash_password(password: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash(&password)).await?
}

pub async fn verify_password(password: String, encoded: String) -> Result<bool, PasswordError> {
    Ok(tokio::task::spawn_blocking(move || verify(&password, &encoded)).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_and_wrong_password() {
        let encoded = hash("hunter2").unwrap();
        assert!(encoded.starts_with("$argon2id$"));
        assert!(verify("hunter2", &encoded));
        assert!(!verify("hunter3", &encoded));
    }

    #[test]
    fn salts_differ_between_hashes() {
        assert_ne!(hash("same").unwrap(), hash("same").unwrap());
    }

    #[test]
    fn malformed_hashes_never_verify() {
        for bad in ["", "$argon2id$", "sha256$20000$AAAA$AAAA", "$argon2id$v=19$m=19456,t=2,p=1$$"] {
            assert!(!verify("", bad), "{bad}");
        }
    }

    #[tokio::test]
    async fn async_wrappers_run_off_the_runtime() {
        let encoded = hash_password("swordfish".into()).await.unwrap();
        assert!(verify_password("swordfish".into(), encoded.clone()).await.unwrap());
        assert!(!verify_password("sword".into(), encoded).await.unwrap());
    }
}
