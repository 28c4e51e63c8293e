use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::{AppError, AppResult},
    models::{Role, User},
    repository::RepositoryState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims
///
/// JWT payload for both token kinds. Access tokens carry a role hint; the role
/// that counts is always the one loaded from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's id.
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub exp: usize,
    pub iat: usize,
}

/// issue_token
///
/// Signs an HS256 token. Access tokens live `access_token_ttl_minutes`,
/// refresh tokens `refresh_token_ttl_days`.
pub fn issue_token(config: &AppConfig, user: &User, token_type: TokenType) -> AppResult<String> {
    let now = Utc::now();
    let (ttl, role) = match token_type {
        TokenType::Access => (Duration::minutes(config.access_token_ttl_minutes), Some(user.role)),
        TokenType::Refresh => (Duration::days(config.refresh_token_ttl_days), None),
    };

    let claims = Claims {
        sub: user.id,
        role,
        token_type,
        exp: (now + ttl).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))
}

/// decode_token
///
/// Validates signature and expiry. Every failure is the same 401 to the caller;
/// the reason only reaches the debug log.
pub fn decode_token(config: &AppConfig, token: &str) -> AppResult<Claims> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("Rejected expired token"),
                other => tracing::debug!(reason = ?other, "Rejected invalid token"),
            }
            AppError::Unauthorized("Could not validate credentials".to_string())
        })
}

/// Argon2id with a random salt; returns the PHC string.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {e}")))
}

/// `false` for a wrong password and for an unparsable stored hash alike.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Handlers pass it to the
/// access-control policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Local bypass: in `Env::Local` an `x-user-id` header naming an existing
///    user authenticates as that user.
/// 2. Bearer access token, decoded with the configured secret.
/// 3. Store lookup: the user must still exist and be active.
///
/// Rejection: `AppError::Unauthorized` (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|id| Uuid::parse_str(id).ok());

            if let Some(user_id) = bypass_id {
                if let Some(user) = repo.get_user(user_id).await? {
                    if user.is_active {
                        return Ok(AuthUser::from(&user));
                    }
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;

        let claims = decode_token(&config, token)?;
        if claims.token_type != TokenType::Access {
            return Err(AppError::Unauthorized("Invalid token type".to_string()));
        }

        let user = repo
            .get_user(claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

        if !user.is_active {
            return Err(AppError::Unauthorized("Inactive user".to_string()));
        }

        Ok(AuthUser::from(&user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            email: "a@example.com".into(),
            role,
            is_active: true,
            ..Default::default()
        }
    }

    #[test]
    fn access_token_round_trips_with_role_hint() {
        let config = AppConfig::default();
        let u = user(Role::Quality);
        let token = issue_token(&config, &u, TokenType::Access).unwrap();
        let claims = decode_token(&config, &token).unwrap();
        assert_eq!(claims.sub, u.id);
        assert_eq!(claims.role, Some(Role::Quality));
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn refresh_token_outlives_access_token() {
        let config = AppConfig::default();
        let u = user(Role::Producer);
        let access = decode_token(&config, &issue_token(&config, &u, TokenType::Access).unwrap()).unwrap();
        let refresh = decode_token(&config, &issue_token(&config, &u, TokenType::Refresh).unwrap()).unwrap();
        assert_eq!(refresh.token_type, TokenType::Refresh);
        assert_eq!(refresh.role, None);
        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let u = user(Role::Admin);
        let other = AppConfig {
            jwt_secret: "a-completely-different-secret".into(),
            ..Default::default()
        };
        let token = issue_token(&other, &u, TokenType::Access).unwrap();
        assert!(matches!(
            decode_token(&AppConfig::default(), &token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = AppConfig {
            access_token_ttl_minutes: -10,
            ..Default::default()
        };
        let token = issue_token(&config, &user(Role::Client), TokenType::Access).unwrap();
        assert!(decode_token(&config, &token).is_err());
    }

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("correct-horse-battery-staple").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct-horse-battery-staple", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("anything", "not-a-phc-string"));
    }
}
