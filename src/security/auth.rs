//! Password hashing and bearer-token issuance/verification.
//!
//! Minting (argon2id hashing, JWT signing) is confined to the `/auth/*`
//! handlers; everywhere else in the hot path (connection manager, REST
//! middleware) only ever verifies a token, never mints one.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng};
use argon2::Argon2;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hash failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("stored password hash is malformed: {e}")))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

/// JWT claims for both access and refresh tokens; `kind` distinguishes
/// them so a refresh token can never be accepted where an access token is
/// required, and vice versa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: i64,
}

/// Issues and verifies signed bearer tokens. Access and refresh tokens are
/// signed with distinct secrets so a leaked refresh secret cannot be used
/// to mint access tokens.
pub struct TokenVerifier {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenVerifier {
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl_secs: i64,
        refresh_ttl_secs: i64,
    ) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    pub fn issue(&self, user_id: &str) -> Result<TokenPair, AppError> {
        let now = chrono::Utc::now().timestamp();
        let access_expires_at = now + self.access_ttl_secs;

        let access_claims = Claims {
            sub: user_id.to_string(),
            kind: TokenKind::Access,
            exp: access_expires_at,
            iat: now,
        };
        let refresh_claims = Claims {
            sub: user_id.to_string(),
            kind: TokenKind::Refresh,
            exp: now + self.refresh_ttl_secs,
            iat: now,
        };

        let access_token = encode(&Header::default(), &access_claims, &self.access_encoding)
            .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))?;
        let refresh_token = encode(&Header::default(), &refresh_claims, &self.refresh_encoding)
            .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))?;

        Ok(TokenPair { access_token, refresh_token, access_expires_at })
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, AppError> {
        self.verify(token, &self.access_decoding, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, AppError> {
        self.verify(token, &self.refresh_decoding, TokenKind::Refresh)
    }

    fn verify(&self, token: &str, key: &DecodingKey, expected: TokenKind) -> Result<Claims, AppError> {
        let validation = Validation::default();
        let data = decode::<Claims>(token, key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => AppError::TokenExpired,
                _ => AppError::InvalidToken,
            }
        })?;
        if data.claims.kind != expected {
            return Err(AppError::InvalidToken);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash).unwrap());
        assert!(!verify_password("wrong password", &hash).unwrap());
    }

    #[test]
    fn access_token_round_trips() {
        let verifier = TokenVerifier::new("access-secret", "refresh-secret", 900, 604_800);
        let pair = verifier.issue("user-1").unwrap();
        let claims = verifier.verify_access(&pair.access_token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn refresh_token_is_rejected_as_access_token() {
        let verifier = TokenVerifier::new("access-secret", "refresh-secret", 900, 604_800);
        let pair = verifier.issue("user-1").unwrap();
        assert!(verifier.verify_access(&pair.refresh_token).is_err());
    }
}
