//! Access tokens
//!
//! Compact HS256 JSON Web Tokens signed with HMAC-SHA256. Claims carry the
//! user ID, role, issue and expiry times (Unix seconds) and a fixed
//! `type = "access"` marker.

use chrono::{DateTime, Duration, Utc};
use data_encoding::BASE64URL_NOPAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::models::{User, UserRole};

type HmacSha256 = Hmac<Sha256>;

/// Access tokens live for 14 days
pub const ACCESS_TOKEN_TTL_HOURS: i64 = 14 * 24;

const TOKEN_TYPE_ACCESS: &str = "access";

/// Base64url of `{"alg":"HS256","typ":"JWT"}`
const HEADER: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9";

/// Claims embedded in an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: i64,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: String,
}

/// Token validation failures
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Unexpected token type: {0}")]
    WrongType(String),

    #[error("Failed to encode token: {0}")]
    Encoding(String),
}

/// Issues and verifies access tokens
pub struct TokenService {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self::with_ttl(secret, Duration::hours(ACCESS_TOKEN_TTL_HOURS))
    }

    pub fn with_ttl(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl,
        }
    }

    /// Token lifetime, also used as the cookie Max-Age
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for the user, valid from now
    pub fn issue(&self, user: &User) -> Result<String, TokenError> {
        self.issue_at(user, Utc::now())
    }

    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = Claims {
            user_id: user.id,
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            token_type: TOKEN_TYPE_ACCESS.to_string(),
        };

        let payload =
            serde_json::to_vec(&claims).map_err(|e| TokenError::Encoding(e.to_string()))?;
        let signing_input = format!("{}.{}", HEADER, BASE64URL_NOPAD.encode(&payload));
        let signature = self.mac(signing_input.as_bytes())?.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            signing_input,
            BASE64URL_NOPAD.encode(&signature)
        ))
    }

    /// Verify signature, expiry and type, returning the claims
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        if header != HEADER {
            return Err(TokenError::Malformed);
        }

        let signature = BASE64URL_NOPAD
            .decode(signature.as_bytes())
            .map_err(|_| TokenError::Malformed)?;
        let signing_input = &token[..header.len() + 1 + payload.len()];
        self.mac(signing_input.as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let payload = BASE64URL_NOPAD
            .decode(payload.as_bytes())
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;

        if claims.token_type != TOKEN_TYPE_ACCESS {
            return Err(TokenError::WrongType(claims.token_type));
        }
        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn mac(&self, data: &[u8]) -> Result<HmacSha256, TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        mac.update(data);
        Ok(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn user(id: i64, role: UserRole) -> User {
        let mut user = User::new(format!("user{id}"), "hash".into(), role);
        user.id = id;
        user
    }

    #[test]
    fn test_header_constant_matches_encoding() {
        assert_eq!(
            BASE64URL_NOPAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
            HEADER
        );
    }

    #[test]
    fn test_issue_and_verify() {
        let tokens = TokenService::new("secret");
        let token = tokens.issue(&user(5, UserRole::Admin)).unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.user_id, 5);
        assert_eq!(claims.role, UserRole::Admin);
        assert_eq!(claims.token_type, "access");
        assert_eq!(claims.exp - claims.iat, 14 * 24 * 3600);
    }

    #[test]
    fn test_payload_uses_camel_case_claims() {
        let tokens = TokenService::new("secret");
        let token = tokens.issue(&user(7, UserRole::User)).unwrap();
        let payload = token.split('.').nth(1).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&BASE64URL_NOPAD.decode(payload.as_bytes()).unwrap()).unwrap();

        assert_eq!(json["userId"], 7);
        assert_eq!(json["role"], "user");
        assert_eq!(json["type"], "access");
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = TokenService::new("secret");
        let issued = Utc::now() - Duration::days(15);
        let token = tokens.issue_at(&user(1, UserRole::User), issued).unwrap();

        assert!(matches!(tokens.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenService::new("secret")
            .issue(&user(1, UserRole::User))
            .unwrap();
        assert!(matches!(
            TokenService::new("other").verify(&token),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let tokens = TokenService::new("secret");
        let bad_encoding = format!("{HEADER}.!!!.???");
        for token in ["", "abc", "a.b", "a.b.c.d", bad_encoding.as_str()] {
            assert!(
                matches!(
                    tokens.verify(token),
                    Err(TokenError::Malformed | TokenError::InvalidSignature)
                ),
                "{token:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_role_escalation_breaks_signature() {
        let tokens = TokenService::new("secret");
        let token = tokens.issue(&user(3, UserRole::User)).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let mut claims = tokens.verify(&token).unwrap();
        claims.role = UserRole::Admin;
        let forged_payload = BASE64URL_NOPAD.encode(&serde_json::to_vec(&claims).unwrap());
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(matches!(
            tokens.verify(&forged),
            Err(TokenError::InvalidSignature)
        ));
    }

    proptest! {
        #[test]
        fn any_single_byte_flip_is_rejected(id in 1i64..10_000, pos in 0usize..200) {
            let tokens = TokenService::new("k");
            let token = tokens.issue(&user(id, UserRole::User)).unwrap();
            let pos = pos % token.len();

            let mut bytes = token.into_bytes();
            bytes[pos] = if bytes[pos] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();

            prop_assert!(tokens.verify(&tampered).is_err());
        }
    }
}
