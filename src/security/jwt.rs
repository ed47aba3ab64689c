use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Role;

pub const ACCESS_TOKEN_TTL_MINUTES: i64 = 15;
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

/// Which of the two token flavors a caller expects to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// "access" or "refresh".
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> AppResult<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::Unauthorized)
    }
}

#[derive(Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues and verifies HS256 tokens with a shared secret.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        TokenService {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue_access_token(&self, user_id: Uuid, email: &str, role: Role) -> AppResult<String> {
        self.issue(
            user_id,
            email,
            role,
            TokenKind::Access,
            Duration::minutes(ACCESS_TOKEN_TTL_MINUTES),
        )
    }

    pub fn issue_refresh_token(&self, user_id: Uuid, email: &str, role: Role) -> AppResult<String> {
        self.issue(
            user_id,
            email,
            role,
            TokenKind::Refresh,
            Duration::days(REFRESH_TOKEN_TTL_DAYS),
        )
    }

    pub fn issue_pair(&self, user_id: Uuid, email: &str, role: Role) -> AppResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user_id, email, role)?,
            refresh_token: self.issue_refresh_token(user_id, email, role)?,
        })
    }

    /// Verify signature, expiry and kind. Every failure collapses into
    /// `Unauthorized`; callers never learn which check rejected the token.
    pub fn verify(&self, token: &str, expected: TokenKind) -> AppResult<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| AppError::Unauthorized)?;
        if data.claims.token_type != expected.as_str() {
            return Err(AppError::Unauthorized);
        }
        Ok(data.claims)
    }

    fn issue(
        &self,
        user_id: Uuid,
        email: &str,
        role: Role,
        kind: TokenKind,
        ttl: Duration,
    ) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role,
            token_type: kind.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("jwt encoding failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret";

    fn service() -> TokenService {
        TokenService::new(SECRET)
    }

    #[test]
    fn test_access_token_round_trip() {
        let service = service();
        let user_id = Uuid::new_v4();
        let token = service
            .issue_access_token(user_id, "mentor@example.com", Role::Mentor)
            .unwrap();
        assert_eq!(token.matches('.').count(), 2);

        let claims = service.verify(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.email, "mentor@example.com");
        assert_eq!(claims.role, Role::Mentor);
        assert_eq!(claims.token_type, "access");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_token_kind_mismatch_is_rejected() {
        let service = service();
        let user_id = Uuid::new_v4();
        let pair = service
            .issue_pair(user_id, "student@example.com", Role::Student)
            .unwrap();

        assert!(service.verify(&pair.access_token, TokenKind::Refresh).is_err());
        assert!(service.verify(&pair.refresh_token, TokenKind::Access).is_err());
        assert!(service.verify(&pair.refresh_token, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let other = TokenService::new("some-other-secret");
        let token = other
            .issue_access_token(Uuid::new_v4(), "a@example.com", Role::Student)
            .unwrap();
        assert!(service().verify(&token, TokenKind::Access).is_err());
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        assert!(service().verify("not-a-token", TokenKind::Access).is_err());
        assert!(service().verify("", TokenKind::Access).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        // Hand-rolled claims, an hour past expiry to clear validation leeway.
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            email: "late@example.com".to_string(),
            role: Role::Student,
            token_type: "access".to_string(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(service().verify(&token, TokenKind::Access).is_err());
    }

    #[test]
    fn test_non_uuid_subject_is_rejected() {
        let claims = Claims {
            sub: "not-a-uuid".to_string(),
            email: "x@example.com".to_string(),
            role: Role::Student,
            token_type: "access".to_string(),
            iat: 0,
            exp: 0,
        };
        assert!(claims.user_id().is_err());
    }
}
