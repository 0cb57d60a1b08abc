//! Scoped token generation and validation for sub-harness spawn credentials.
//!
//! Tokens are HMAC-SHA256 based, scoped to a (harness_id, depth) pair.
//! Format: `warden_st_<harness_id>_<depth>_<hmac_hex>`. This is ambient
//! plumbing for a future credentialed tool boundary: today only the manager
//! mints and verifies these when spawning a sub-harness.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_PREFIX: &str = "warden_st_";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token format: {0}")]
    InvalidFormat(String),
    #[error("invalid depth in token: {0}")]
    InvalidDepth(String),
    #[error("token HMAC verification failed")]
    HmacMismatch,
    #[error("missing token secret")]
    MissingSecret,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: Vec<u8>,
}

impl TokenConfig {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    pub fn from_env() -> Result<Self, TokenError> {
        let secret_hex = std::env::var("WARDEN_SPAWN_TOKEN_SECRET").map_err(|_| TokenError::MissingSecret)?;
        Ok(Self::new(secret_hex.into_bytes()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub harness_id: String,
    pub depth: u32,
}

/// Mint a spawn token scoping a sub-harness to its id and depth.
pub fn generate_token(config: &TokenConfig, harness_id: &str, depth: u32) -> String {
    let message = format!("{harness_id}:{depth}");
    let mac = compute_hmac(&config.secret, message.as_bytes());
    let hmac_hex = hex::encode(mac);
    format!("{TOKEN_PREFIX}{harness_id}_{depth}_{hmac_hex}")
}

/// Validate a spawn token and extract its claims. Rejects tampered ids,
/// depths, or HMACs via constant-time comparison.
pub fn validate_token(config: &TokenConfig, token: &str) -> Result<TokenClaims, TokenError> {
    let rest = token
        .strip_prefix(TOKEN_PREFIX)
        .ok_or_else(|| TokenError::InvalidFormat("token must start with warden_st_".to_owned()))?;

    let mut parts: Vec<&str> = rest.rsplitn(3, '_').collect();
    if parts.len() != 3 {
        return Err(TokenError::InvalidFormat("expected harness_id_depth_hmac".to_owned()));
    }
    parts.reverse();
    let (harness_id, depth_str, hmac_hex) = (parts[0], parts[1], parts[2]);

    let depth: u32 = depth_str
        .parse()
        .map_err(|e: std::num::ParseIntError| TokenError::InvalidDepth(e.to_string()))?;

    let provided_mac =
        hex::decode(hmac_hex).map_err(|e| TokenError::InvalidFormat(format!("invalid hex in hmac: {e}")))?;

    let message = format!("{harness_id}:{depth}");
    verify_hmac_constant_time(&config.secret, message.as_bytes(), &provided_mac)?;

    Ok(TokenClaims { harness_id: harness_id.to_owned(), depth })
}

fn compute_hmac(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

fn verify_hmac_constant_time(key: &[u8], message: &[u8], expected_mac: &[u8]) -> Result<(), TokenError> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.verify_slice(expected_mac).map_err(|_| TokenError::HmacMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TokenConfig {
        TokenConfig::new(b"test-secret-key-for-warden".to_vec())
    }

    #[test]
    fn generate_and_validate_roundtrip() {
        let config = test_config();
        let token = generate_token(&config, "harness-abc123", 2);
        let claims = validate_token(&config, &token).unwrap();
        assert_eq!(claims.harness_id, "harness-abc123");
        assert_eq!(claims.depth, 2);
    }

    #[test]
    fn reject_tampered_depth() {
        let config = test_config();
        let token = generate_token(&config, "harness-abc123", 1);
        let tampered = token.replacen("_1_", "_2_", 1);
        let result = validate_token(&config, &tampered);
        assert!(matches!(result.unwrap_err(), TokenError::HmacMismatch));
    }

    #[test]
    fn reject_wrong_secret() {
        let config = test_config();
        let token = generate_token(&config, "harness-abc123", 1);
        let wrong = TokenConfig::new(b"wrong-secret".to_vec());
        let result = validate_token(&wrong, &token);
        assert!(matches!(result.unwrap_err(), TokenError::HmacMismatch));
    }

    #[test]
    fn reject_wrong_prefix() {
        let config = test_config();
        let result = validate_token(&config, "nope_harness_1_deadbeef");
        assert!(matches!(result.unwrap_err(), TokenError::InvalidFormat(_)));
    }

    #[test]
    fn reject_invalid_depth() {
        let config = test_config();
        let token = format!("{TOKEN_PREFIX}harness-abc123_notanumber_deadbeef");
        let result = validate_token(&config, &token);
        assert!(matches!(result.unwrap_err(), TokenError::InvalidDepth(_)));
    }

    #[test]
    fn different_depths_produce_different_tokens() {
        let config = test_config();
        let t1 = generate_token(&config, "harness-abc123", 1);
        let t2 = generate_token(&config, "harness-abc123", 2);
        assert_ne!(t1, t2);
    }
}
