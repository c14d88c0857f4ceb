//! Argon2 hashing for the administrator password.

use argon2::Argon2;
use argon2::password_hash::{
    Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use rand::Rng;

use crate::error::{GateError, GateResult};

const SALT_BYTES: usize = 16;

fn credential_error(operation: &'static str) -> impl FnOnce(PasswordHashError) -> GateError {
    move |err| GateError::Credential {
        operation,
        detail: err.to_string(),
    }
}

/// Hash `secret` into a PHC-format Argon2id string.
///
/// # Errors
///
/// Returns [`GateError::Credential`] if the salt cannot be encoded or hashing fails.
pub fn hash_secret(secret: &str) -> GateResult<String> {
    let mut salt_bytes = [0_u8; SALT_BYTES];
    rand::rng().fill(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(credential_error("password.salt"))?;
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(credential_error("password.hash"))?;
    Ok(hash.to_string())
}

/// Check `candidate` against a stored PHC hash.
///
/// # Errors
///
/// Returns [`GateError::Credential`] when the stored hash is malformed.
pub fn verify_secret(expected_hash: &str, candidate: &str) -> GateResult<bool> {
    let parsed = PasswordHash::new(expected_hash).map_err(credential_error("password.parse"))?;
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(PasswordHashError::Password) => Ok(false),
        Err(err) => Err(credential_error("password.verify")(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trips_and_rejects_wrong_password() -> GateResult<()> {
        let hash = hash_secret("correct horse")?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_secret(&hash, "correct horse")?);
        assert!(!verify_secret(&hash, "battery staple")?);
        Ok(())
    }

    #[test]
    fn malformed_hash_is_an_internal_credential_error() {
        let err = verify_secret("not-a-hash", "anything").unwrap_err();
        assert!(matches!(
            err,
            GateError::Credential {
                operation: "password.parse",
                ..
            }
        ));
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }
}
