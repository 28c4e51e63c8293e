use axum::{Json, extract::State};

use crate::{
    AppState,
    accounts::{self, normalize_email},
    auth::{AuthUser, TokenType, decode_token, issue_token, verify_password},
    config::AppConfig,
    error::{AppError, AppResult},
    models::{LoginRequest, RefreshRequest, RegisterRequest, Role, TokenResponse, User},
};

fn token_pair(config: &AppConfig, user: User) -> AppResult<TokenResponse> {
    Ok(TokenResponse {
        access_token: issue_token(config, &user, TokenType::Access)?,
        refresh_token: issue_token(config, &user, TokenType::Refresh)?,
        token_type: "bearer".to_string(),
        user,
    })
}

fn bad_credentials() -> AppError {
    AppError::Unauthorized("Incorrect email or password".to_string())
}

/// register
///
/// [Public Route] Self-registration. Only `producer` (default) and `client`
/// accounts can be created this way; a taken email is a 400.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = TokenResponse),
        (status = 400, description = "Invalid input or email already registered")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<Json<TokenResponse>> {
    let role = payload.role.unwrap_or(Role::Producer);
    if !matches!(role, Role::Producer | Role::Client) {
        return Err(AppError::Validation(
            "Only producer or client accounts can self-register".to_string(),
        ));
    }
    if payload.password.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters long".to_string(),
        ));
    }

    let user = accounts::create_account(
        state.repo.as_ref(),
        &payload.email,
        Some(payload.full_name),
        Some(&payload.password),
        role,
    )
    .await?;

    Ok(Json(token_pair(&state.config, user)?))
}

/// login
///
/// [Public Route] Exchanges credentials for an access/refresh token pair.
/// Unknown email, wrong password, passwordless and inactive accounts are all 401.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = TokenResponse),
        (status = 401, description = "Bad credentials or inactive account")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let email = normalize_email(&payload.email).map_err(|_| bad_credentials())?;
    let user = state
        .repo
        .find_user_by_email(&email)
        .await?
        .ok_or_else(bad_credentials)?;

    let hash = state
        .repo
        .get_password_hash(user.id)
        .await?
        .ok_or_else(bad_credentials)?;

    if !verify_password(&payload.password, &hash) {
        tracing::debug!(user_id = %user.id, "Login rejected: wrong password");
        return Err(bad_credentials());
    }
    if !user.is_active {
        return Err(AppError::Unauthorized("Inactive user".to_string()));
    }

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(token_pair(&state.config, user)?))
}

/// refresh
///
/// [Public Route] Trades a valid refresh token for a new pair. Access tokens
/// are refused here.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 401, description = "Invalid, expired or non-refresh token")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let claims = decode_token(&state.config, &payload.refresh_token)?;
    if claims.token_type != TokenType::Refresh {
        return Err(AppError::Unauthorized("Invalid token type".to_string()));
    }

    let user = state
        .repo
        .get_user(claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Unauthorized("User not found or inactive".to_string()))?;

    Ok(Json(token_pair(&state.config, user)?))
}

/// get_me
///
/// [Authenticated Route] The caller's own account.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses((status = 200, description = "Current user", body = User))
)]
pub async fn get_me(actor: AuthUser, State(state): State<AppState>) -> AppResult<Json<User>> {
    let user = state
        .repo
        .get_user(actor.id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(user))
}
