use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::Rng;

use crate::error::{Error, Result};

// argon2id, m=19 MiB, t=2, p=1
const ARGON2_MEMORY_KIB: u32 = 19 * 1024;
const ARGON2_ITERATIONS: u32 = 2;
const ARGON2_PARALLELISM: u32 = 1;
const ARGON2_OUTPUT_LEN: usize = 32;

const TOKEN_PREFIX: &str = "hydro";
const LOOKUP_LENGTH: usize = 8;
const SECRET_LENGTH: usize = 24;
const SECRET_BYTES: usize = 12;

/// Hashes and verifies secrets (passwords and session tokens) with Argon2id.
pub struct SecretHasher {
    argon2: Argon2<'static>,
}

impl Default for SecretHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretHasher {
    #[must_use]
    pub fn new() -> Self {
        let params = Params::new(
            ARGON2_MEMORY_KIB,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(ARGON2_OUTPUT_LEN),
        )
        .expect("invalid argon2 params");

        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Generates a new session token with the format: hydro_<lookup>_<secret>
    /// Returns (raw_token, lookup, hash)
    pub fn generate_token(&self) -> Result<(String, String, String)> {
        let lookup = generate_lookup();
        let secret = generate_secret();
        let raw_token = build_token(&lookup, &secret);
        let hash = self.hash(&raw_token)?;
        Ok((raw_token, lookup, hash))
    }

    pub fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| Error::Hashing(format!("failed to hash secret: {e}")))?;
        Ok(hash.to_string())
    }

    pub fn verify(&self, secret: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| Error::Hashing(format!("invalid hash format: {e}")))?;

        match self.argon2.verify_password(secret.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Hashing(format!("failed to verify secret: {e}"))),
        }
    }
}

fn generate_lookup() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    uuid[..LOOKUP_LENGTH].to_string()
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

fn build_token(lookup: &str, secret: &str) -> String {
    format!("{TOKEN_PREFIX}_{lookup}_{secret}")
}

/// Parses a token string into its components (lookup, secret)
pub fn parse_token(token: &str) -> Result<(String, String)> {
    let rest = token
        .strip_prefix(TOKEN_PREFIX)
        .and_then(|rest| rest.strip_prefix('_'))
        .ok_or(Error::InvalidTokenFormat)?;

    let (lookup, secret) = rest.split_once('_').ok_or(Error::InvalidTokenFormat)?;

    if lookup.len() != LOOKUP_LENGTH
        || secret.len() != SECRET_LENGTH
        || !lookup.chars().chain(secret.chars()).all(|c| c.is_ascii_hexdigit())
    {
        return Err(Error::InvalidTokenFormat);
    }

    Ok((lookup.to_string(), secret.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_generation_format() {
        let hasher = SecretHasher::new();
        let (token, lookup, _hash) = hasher.generate_token().unwrap();

        assert!(token.starts_with("hydro_"));
        assert_eq!(lookup.len(), 8);

        let parts: Vec<&str> = token.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "hydro");
        assert_eq!(parts[1], lookup);
        assert_eq!(parts[2].len(), 24);
    }

    #[test]
    fn test_generated_token_parses() {
        let hasher = SecretHasher::new();
        let (token, lookup, _) = hasher.generate_token().unwrap();

        let (parsed_lookup, _) = parse_token(&token).unwrap();
        assert_eq!(parsed_lookup, lookup);
    }

    #[test]
    fn test_token_verification() {
        let hasher = SecretHasher::new();
        let (token, _, hash) = hasher.generate_token().unwrap();

        assert!(hasher.verify(&token, &hash).unwrap());

        let wrong_token = format!("{}00000", &token[..token.len() - 5]);
        assert!(!hasher.verify(&wrong_token, &hash).unwrap());
    }

    #[test]
    fn test_password_hash_is_phc_format() {
        let hasher = SecretHasher::new();
        let hash = hasher.hash("greenhouse").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("greenhouse", &hash).unwrap());
        assert!(!hasher.verify("Greenhouse", &hash).unwrap());
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        let hasher = SecretHasher::new();
        assert!(matches!(
            hasher.verify("x", "not-a-hash"),
            Err(Error::Hashing(_))
        ));
    }

    #[test]
    fn test_parse_token_valid() {
        let (lookup, secret) = parse_token("hydro_1234abcd_0123456789abcdef01234567").unwrap();
        assert_eq!(lookup, "1234abcd");
        assert_eq!(secret, "0123456789abcdef01234567");
    }

    #[test]
    fn test_parse_token_invalid_prefix() {
        assert!(parse_token("cutting_1234abcd_0123456789abcdef01234567").is_err());
        assert!(parse_token("hydro1234abcd_0123456789abcdef01234567").is_err());
    }

    #[test]
    fn test_parse_token_wrong_parts() {
        assert!(parse_token("hydro_1234abcd").is_err());
        assert!(parse_token("hydro_1234abcd_0123456789abcdef01234567_x").is_err());
    }
}
