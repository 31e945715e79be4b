//! Opaque bearer tokens: generation, hashing and shape validation.
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::core::validator::Validator;

/// 19 random bytes encode to exactly this many base64url characters.
pub const TOKEN_PLAINTEXT_LEN: usize = 26;
const TOKEN_ENTROPY_BYTES: usize = 19;

pub type TokenHash = [u8; 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
        }
    }

    pub fn ttl(&self) -> Duration {
        match self {
            Scope::Activation => Duration::from_secs(3 * 24 * 60 * 60),
            Scope::Authentication => Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: TokenHash,
    #[serde(skip)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: Scope,
}

impl Token {
    /// Mint a fresh token for `user_id`, valid for `ttl` from now.
    pub fn generate(user_id: i64, ttl: Duration, scope: Scope) -> Self {
        let entropy: [u8; TOKEN_ENTROPY_BYTES] = rand::random();
        let plaintext = URL_SAFE_NO_PAD.encode(entropy);
        let hash = hash_plaintext(&plaintext);
        let expiry = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1));

        Self {
            plaintext,
            hash,
            user_id,
            expiry,
            scope,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

pub fn hash_plaintext(plaintext: &str) -> TokenHash {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&Sha256::digest(plaintext.as_bytes()));
    hash
}

pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == TOKEN_PLAINTEXT_LEN,
        "token",
        "must be 26 bytes long",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_token_shape() {
        let token = Token::generate(7, Scope::Authentication.ttl(), Scope::Authentication);
        assert_eq!(token.plaintext.len(), TOKEN_PLAINTEXT_LEN);
        assert_eq!(token.hash, hash_plaintext(&token.plaintext));
        assert_eq!(token.user_id, 7);
        assert!(!token.is_expired_at(Utc::now()));

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, &token.plaintext);
        assert!(v.valid());
    }

    #[test]
    fn test_scope_names_and_lifetimes() {
        assert_eq!(Scope::Activation.as_str(), "activation");
        assert_eq!(Scope::Authentication.as_str(), "authentication");
        assert!(Scope::Activation.ttl() > Scope::Authentication.ttl());
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = Token::generate(1, Scope::Activation.ttl(), Scope::Activation);
        let b = Token::generate(1, Scope::Activation.ttl(), Scope::Activation);
        assert_ne!(a.plaintext, b.plaintext);
    }

    #[test]
    fn test_serialization_exposes_only_plaintext_and_expiry() {
        let token = Token::generate(1, Scope::Authentication.ttl(), Scope::Authentication);
        let json = serde_json::to_value(&token).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert!(object.contains_key("token"));
        assert!(object.contains_key("expiry"));
    }

    #[test]
    fn test_plaintext_shape_validation() {
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "short");
        assert_eq!(v.errors()["token"], "must be 26 bytes long");
    }
}
