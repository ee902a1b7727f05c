//! Bearer-token verification
//!
//! Token issuance belongs to the identity service; this side only verifies
//! HS256 tokens against the shared secret and extracts the caller's
//! identity. `issue_access_token` exists for tooling and tests.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::{Error, Result};

/// JWT claims carried by access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: i64,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Verified caller identity attached to request extensions
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: i64,
    pub email: String,
    pub role: String,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

#[derive(Clone)]
pub struct AuthService {
    config: Arc<Config>,
}

impl AuthService {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Pull the token out of an `Authorization: Bearer ...` header value
    pub fn extract_bearer_token(header: &str) -> Option<&str> {
        let token = header.strip_prefix("Bearer ")?.trim();
        (!token.is_empty()).then_some(token)
    }

    /// Verify signature and expiry; returns the claims
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let key = DecodingKey::from_secret(self.config.auth.jwt_secret.as_bytes());
        let data = decode::<Claims>(token, &key, &Validation::default())
            .map_err(|e| Error::unauthorized(format!("Invalid token: {}", e)))?;
        Ok(data.claims)
    }

    /// Verify and require the admin role
    pub fn verify_admin(&self, token: &str) -> Result<AuthContext> {
        let claims = self.verify_token(token)?;
        if claims.role != "admin" {
            return Err(Error::forbidden("Admin access required"));
        }
        Ok(AuthContext {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }

    /// Mint an access token; used by tooling and tests
    pub fn issue_access_token(&self, user_id: i64, email: &str, role: &str) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.config.auth.access_expires_in_secs as i64))
                .timestamp(),
        };
        let key = EncodingKey::from_secret(self.config.auth.jwt_secret.as_bytes());
        encode(&Header::default(), &claims, &key)
            .map_err(|e| Error::internal(format!("Failed to sign token: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new(Arc::new(Config::default()))
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(
            AuthService::extract_bearer_token("Bearer abc.def.ghi"),
            Some("abc.def.ghi")
        );
        assert_eq!(AuthService::extract_bearer_token("Basic abc"), None);
        assert_eq!(AuthService::extract_bearer_token("Bearer "), None);
    }

    #[test]
    fn test_issue_and_verify_roundtrip() {
        let service = service();
        let token = service.issue_access_token(42, "ops@example.com", "admin").unwrap();
        let claims = service.verify_token(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.email, "ops@example.com");
        assert_eq!(claims.role, "admin");
    }

    #[test]
    fn test_garbage_token_is_unauthorized() {
        let err = service().verify_token("not-a-token").unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn test_wrong_secret_is_unauthorized() {
        let token = service().issue_access_token(1, "a@b.c", "admin").unwrap();

        let mut other_config = Config::default();
        other_config.auth.jwt_secret = "different-secret".to_string();
        let other = AuthService::new(Arc::new(other_config));

        assert_eq!(other.verify_token(&token).unwrap_err().status_code(), 401);
    }

    #[test]
    fn test_non_admin_role_is_forbidden() {
        let service = service();
        let token = service.issue_access_token(7, "user@example.com", "member").unwrap();
        let err = service.verify_admin(&token).unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.to_string(), "Admin access required");
    }

    #[test]
    fn test_admin_role_passes() {
        let service = service();
        let token = service.issue_access_token(7, "root@example.com", "admin").unwrap();
        let ctx = service.verify_admin(&token).unwrap();
        assert!(ctx.is_admin());
        assert_eq!(ctx.user_id, 7);
    }
}
