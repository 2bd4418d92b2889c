//! Password hashing. Argon2id with a random 16-byte salt, stored as a PHC string.

use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use once_cell::sync::Lazy;
use password_hash::{PasswordHash, SaltString};

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

/// Verify `password` against a PHC hash. Unparseable hashes never match.
pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

// Hash of a random throwaway secret; verified against when the email is unknown so
// that path costs the same as a wrong password.
static DUMMY_HASH: Lazy<Option<String>> = Lazy::new(|| {
    let mut secret = [0u8; 24];
    getrandom::getrandom(&mut secret).ok()?;
    let secret: String = secret.iter().map(|b| format!("{:02x}", b)).collect();
    hash_password(&secret).ok()
});

/// Burn one Argon2 verification without a real account behind it.
pub fn verify_against_dummy(password: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(hash, password);
    }
}
