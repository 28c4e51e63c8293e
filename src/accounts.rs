//! Account operations shared by the auth, user and project handlers.

use crate::{
    auth::hash_password,
    config::BootstrapAdmin,
    error::{AppError, AppResult},
    models::{NewUser, Role, User},
    repository::Repository,
};

/// Emails are compared trimmed and lower-cased everywhere.
pub fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.ends_with('.'));
    if !valid {
        return Err(AppError::Validation(format!("Invalid email address '{email}'")));
    }
    Ok(email)
}

/// create_account
///
/// Inserts a new account after the duplicate check. `password` is hashed when
/// present; without one the account can never log in.
pub async fn create_account(
    repo: &dyn Repository,
    email: &str,
    full_name: Option<String>,
    password: Option<&str>,
    role: Role,
) -> AppResult<User> {
    let email = normalize_email(email)?;
    if repo.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Validation("Email already registered".to_string()));
    }

    let password_hash = match password {
        Some(p) if p.is_empty() => {
            return Err(AppError::Validation("Password must not be empty".to_string()));
        }
        Some(p) => Some(hash_password(p)?),
        None => None,
    };

    let user = repo
        .create_user(NewUser {
            email,
            full_name: full_name.filter(|n| !n.trim().is_empty()),
            role,
            password_hash,
        })
        .await?;

    tracing::info!(user_id = %user.id, role = ?user.role, "Account created");
    Ok(user)
}

/// ensure_client_account
///
/// Returns the client account registered under `email`, creating a
/// passwordless, active one when none exists. An existing account with any
/// other role is a conflict.
pub async fn ensure_client_account(repo: &dyn Repository, email: &str) -> AppResult<User> {
    let email = normalize_email(email)?;
    match repo.find_user_by_email(&email).await? {
        Some(user) if user.role == Role::Client => Ok(user),
        Some(_) => Err(AppError::Conflict(format!(
            "'{email}' belongs to an account that is not a client"
        ))),
        None => create_account(repo, &email, None, None, Role::Client).await,
    }
}

/// ensure_bootstrap_admin
///
/// Makes sure the configured admin exists. An existing account with that email
/// is left untouched whatever its role.
pub async fn ensure_bootstrap_admin(repo: &dyn Repository, admin: &BootstrapAdmin) -> AppResult<User> {
    let email = normalize_email(&admin.email)?;
    if let Some(existing) = repo.find_user_by_email(&email).await? {
        if existing.role != Role::Admin {
            tracing::warn!(email = %email, role = ?existing.role, "Bootstrap admin email belongs to a non-admin account");
        }
        return Ok(existing);
    }
    create_account(
        repo,
        &email,
        Some("Administrator".to_string()),
        Some(&admin.password),
        Role::Admin,
    )
    .await
}
