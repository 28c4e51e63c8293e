//! HTTP handlers, one module per resource.
//!
//! Every handler follows the same order: policy pre-check, load the guarded
//! row, `policy::authorize`, then the query or mutation, then side effects.

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Delivery, Nce, Project},
    repository::Repository,
};

pub mod auth;
pub mod dashboard;
pub mod deliveries;
pub mod files;
pub mod nces;
pub mod notifications;
pub mod projects;
pub mod surveys;
pub mod users;

pub(crate) async fn load_project(repo: &dyn Repository, id: Uuid) -> AppResult<Project> {
    repo.get_project(id).await?.ok_or_else(|| AppError::not_found("Project"))
}

pub(crate) async fn load_delivery(repo: &dyn Repository, id: Uuid) -> AppResult<Delivery> {
    repo.get_delivery(id).await?.ok_or_else(|| AppError::not_found("Delivery"))
}

pub(crate) async fn load_nce(repo: &dyn Repository, id: Uuid) -> AppResult<Nce> {
    repo.get_nce(id).await?.ok_or_else(|| AppError::not_found("NCE"))
}

/// Trimmed, non-empty text or a validation error naming the field.
pub(crate) fn required_text(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}
