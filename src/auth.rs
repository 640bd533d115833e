use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::AppError;
use crate::handlers::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    User,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    role: Role,
    exp: usize,
}

/// The authenticated caller, passed explicitly to operations that need it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::PermissionDenied(
                "Administrator role required".to_string(),
            ))
        }
    }
}

/// Signs an HS256 token for `user_id` valid for `ttl_secs` seconds.
pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    role: Role,
    ttl_secs: i64,
) -> Result<String, AppError> {
    let exp = (chrono::Utc::now().timestamp() + ttl_secs).max(0) as usize;
    let claims = Claims {
        sub: user_id,
        role,
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalError(format!("Failed to sign token: {}", e)))
}

/// Decodes and validates a bearer token.
pub fn verify_token(secret: &str, token: &str) -> Result<AuthContext, AppError> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;

    Ok(AuthContext {
        user_id: decoded.claims.sub,
        role: decoded.claims.role,
    })
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

        verify_token(&state.config.jwt_secret, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_round_trip_keeps_role() {
        let user_id = Uuid::new_v4();
        let token = issue_token(SECRET, user_id, Role::Admin, 3600).unwrap();

        let ctx = verify_token(SECRET, &token).unwrap();
        assert_eq!(ctx.user_id, user_id);
        assert!(ctx.is_admin());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token(SECRET, Uuid::new_v4(), Role::User, 3600).unwrap();
        let err = verify_token("other-secret", &token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = issue_token(SECRET, Uuid::new_v4(), Role::Admin, -3600).unwrap();
        assert!(verify_token(SECRET, &token).is_err());
    }

    #[test]
    fn test_require_admin() {
        let admin = AuthContext {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };
        let user = AuthContext {
            user_id: Uuid::new_v4(),
            role: Role::User,
        };

        assert!(admin.require_admin().is_ok());
        assert!(matches!(
            user.require_admin(),
            Err(AppError::PermissionDenied(_))
        ));
    }
}
