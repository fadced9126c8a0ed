//! Bearer tokens.
//!
//! # Responsibilities
//! - Issue HMAC-signed tokens carrying the subject id
//! - Verify signature and expiry, HMAC family only
//! - Mask tokens for log output
//!
//! # Design Decisions
//! - The header `alg` is checked before any signature work so RSA/EC/none
//!   headers never reach the decoder with a shared secret
//! - Zero expiry leeway

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token algorithm {0} is not allowed")]
    DisallowedAlgorithm(String),

    #[error("token has expired")]
    Expired,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token could not be issued: {0}")]
    Encode(String),
}

/// `HS256`/`HS384`/`HS512`, or `None` for anything else.
pub fn parse_hmac_algorithm(name: &str) -> Option<Algorithm> {
    match name.trim().to_ascii_uppercase().as_str() {
        "HS256" => Some(Algorithm::HS256),
        "HS384" => Some(Algorithm::HS384),
        "HS512" => Some(Algorithm::HS512),
        _ => None,
    }
}

/// Short fragment of a token that is safe to log.
pub fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    format!("{}…({} chars)", prefix, token.chars().count())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Issues and verifies bearer tokens under one shared secret.
#[derive(Clone)]
pub struct TokenService {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &self.algorithm)
            .field("secret", &"[REDACTED]")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl TokenService {
    pub fn new(secret: &[u8], algorithm: Algorithm, ttl_secs: u64) -> Self {
        Self {
            algorithm,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_secs,
        }
    }

    /// Build from validated configuration. Falls back to HS256 when the
    /// algorithm name is not an HMAC one.
    pub fn from_config(config: &AuthConfig) -> Self {
        let algorithm = parse_hmac_algorithm(&config.jwt_algorithm).unwrap_or(Algorithm::HS256);
        Self::new(config.jwt_secret.as_bytes(), algorithm, config.token_ttl_secs)
    }

    pub fn issue(&self, subject: &str) -> Result<String, TokenError> {
        self.issue_at(subject, unix_now())
    }

    /// Issue a token as if the current time were `issued_at` (unix seconds).
    pub fn issue_at(&self, subject: &str, issued_at: u64) -> Result<String, TokenError> {
        let claims = Claims {
            user_id: subject.to_string(),
            iat: issued_at,
            exp: issued_at + self.ttl_secs,
        };
        jsonwebtoken::encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let header = jsonwebtoken::decode_header(token).map_err(|_| TokenError::Malformed)?;
        if !matches!(
            header.alg,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(TokenError::DisallowedAlgorithm(format!("{:?}", header.alg)));
        }

        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidAlgorithm => {
                    TokenError::DisallowedAlgorithm(format!("{:?}", header.alg))
                }
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(b"unit-test-secret", Algorithm::HS256, 60)
    }

    #[test]
    fn test_issue_then_verify() {
        let svc = service();
        let token = svc.issue("user-42").unwrap();
        let claims = svc.verify(&token).unwrap();
        assert_eq!(claims.user_id, "user-42");
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn test_expired_token_rejected() {
        let svc = service();
        let token = svc.issue_at("user-42", unix_now() - 120).unwrap();
        assert_eq!(svc.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = service().issue("user-42").unwrap();
        let other = TokenService::new(b"another-secret", Algorithm::HS256, 60);
        assert_eq!(other.verify(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_rsa_header_rejected_before_decoding() {
        let token = service().issue("user-42").unwrap();
        let mut parts = token.split('.');
        let _ = parts.next();
        let payload = parts.next().unwrap();
        let sig = parts.next().unwrap();
        // {"alg":"RS256","typ":"JWT"}
        let forged = format!("eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.{}.{}", payload, sig);

        assert_eq!(
            service().verify(&forged),
            Err(TokenError::DisallowedAlgorithm("RS256".into()))
        );
    }

    #[test]
    fn test_none_algorithm_rejected() {
        // {"alg":"none"}
        let forged = "eyJhbGciOiJub25lIn0.eyJ1c2VyX2lkIjoieCIsImlhdCI6MCwiZXhwIjo5OTk5OTk5OTk5fQ.";
        assert!(service().verify(forged).is_err());
    }

    #[test]
    fn test_other_hmac_variant_rejected() {
        let hs512 = TokenService::new(b"unit-test-secret", Algorithm::HS512, 60);
        let token = hs512.issue("user-42").unwrap();
        assert_eq!(
            service().verify(&token),
            Err(TokenError::DisallowedAlgorithm("HS512".into()))
        );
    }

    #[test]
    fn test_mask_hides_body() {
        let masked = mask_token("eyJhbGciOiJIUzI1NiJ9.secret-part.sig");
        assert!(masked.starts_with("eyJhbG"));
        assert!(!masked.contains("secret-part"));
    }

    #[test]
    fn test_parse_hmac_algorithm() {
        assert_eq!(parse_hmac_algorithm("hs384"), Some(Algorithm::HS384));
        assert_eq!(parse_hmac_algorithm("RS256"), None);
        assert_eq!(parse_hmac_algorithm(""), None);
    }
}
