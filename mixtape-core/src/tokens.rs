use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use thiserror::Error;

use crate::util::random_string;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token is not recognized")]
    Invalid,
    #[error("Token has expired")]
    Expired,
}

/// Claims bound to an issued room access token
#[derive(Debug, Clone)]
pub struct TokenClaims {
    pub principal: String,
    pub room_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Mints and validates the opaque credential guarding administrative room
/// operations. The engine only ever compares tokens for exact equality; it
/// never inspects their contents.
pub trait TokenIssuer: Send + Sync + 'static {
    fn issue(&self, principal: &str, room_id: &str, ttl: Duration) -> IssuedToken;
    fn verify(&self, token: &str) -> Result<TokenClaims, TokenError>;
}

/// Issues random alphanumeric tokens, keeping their claims in process memory
#[derive(Default)]
pub struct OpaqueTokenIssuer {
    tokens: DashMap<String, TokenClaims>,
}

impl OpaqueTokenIssuer {
    const TOKEN_LENGTH: usize = 32;

    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenIssuer for OpaqueTokenIssuer {
    fn issue(&self, principal: &str, room_id: &str, ttl: Duration) -> IssuedToken {
        let token = random_string(Self::TOKEN_LENGTH);
        let expires_at = Utc::now() + ttl;

        let claims = TokenClaims {
            principal: principal.to_string(),
            room_id: room_id.to_string(),
            expires_at,
        };

        self.tokens.insert(token.clone(), claims);

        IssuedToken { token, expires_at }
    }

    fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let claims = self
            .tokens
            .get(token)
            .map(|c| c.clone())
            .ok_or(TokenError::Invalid)?;

        if claims.expires_at < Utc::now() {
            self.tokens.remove(token);
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn issued_tokens_verify_until_expiry() {
        let issuer = OpaqueTokenIssuer::new();

        let issued = issuer.issue("alice", "room-1", Duration::minutes(60));
        let claims = issuer.verify(&issued.token).expect("token verifies");

        assert_eq!(claims.principal, "alice");
        assert_eq!(claims.room_id, "room-1");

        assert!(matches!(
            issuer.verify("not-a-token"),
            Err(TokenError::Invalid)
        ));

        let stale = issuer.issue("alice", "room-1", Duration::minutes(-1));
        assert!(matches!(
            issuer.verify(&stale.token),
            Err(TokenError::Expired)
        ));
    }
}
