use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        Delivery, FileParent, FileRecord, Nce, NewDelivery, NewFile, NewNce, NewNotification,
        NewProject, NewSurvey, NewUser, Notification, Page, Project, Survey, SurveyType, User,
    },
    query::ListQuery,
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// Repository Trait
///
/// The persistence contract. Handlers only see `Arc<dyn Repository>`, so the
/// Postgres store and the in-memory store are interchangeable.
///
/// List methods take an already scoped `ListQuery`; the repository renders it
/// but never decides visibility itself. Single-row reads return `Ok(None)` for
/// unknown ids.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    // `None` both for unknown users and for passwordless accounts.
    async fn get_password_hash(&self, id: Uuid) -> AppResult<Option<String>>;
    async fn create_user(&self, user: NewUser) -> AppResult<User>;
    async fn list_users(&self, query: &ListQuery) -> AppResult<Page<User>>;

    // --- Projects ---
    async fn create_project(&self, project: NewProject) -> AppResult<Project>;
    async fn get_project(&self, id: Uuid) -> AppResult<Option<Project>>;
    async fn list_projects(&self, query: &ListQuery) -> AppResult<Page<Project>>;

    // --- Deliveries ---
    async fn create_delivery(&self, delivery: NewDelivery) -> AppResult<Delivery>;
    async fn get_delivery(&self, id: Uuid) -> AppResult<Option<Delivery>>;
    async fn list_deliveries(&self, query: &ListQuery) -> AppResult<Page<Delivery>>;
    async fn count_deliveries(&self, query: &ListQuery) -> AppResult<i64>;
    /// Writes back the mutable columns (title, description, status, version,
    /// delivered_at) and returns the fresh row.
    async fn save_delivery(&self, delivery: &Delivery) -> AppResult<Delivery>;
    /// Cascades to NCEs, files and surveys. `false` when nothing was deleted.
    async fn delete_delivery(&self, id: Uuid) -> AppResult<bool>;

    // --- NCEs ---
    async fn create_nce(&self, nce: NewNce) -> AppResult<Nce>;
    async fn get_nce(&self, id: Uuid) -> AppResult<Option<Nce>>;
    async fn list_nces(&self, query: &ListQuery) -> AppResult<Page<Nce>>;
    async fn count_nces(&self, query: &ListQuery) -> AppResult<i64>;
    /// Writes back severity, status, category, assignee, resolved_at and
    /// resolution_notes.
    async fn save_nce(&self, nce: &Nce) -> AppResult<Nce>;
    async fn delete_nce(&self, id: Uuid) -> AppResult<bool>;

    // --- Files ---
    async fn create_file(&self, file: NewFile) -> AppResult<FileRecord>;
    async fn get_file(&self, id: Uuid) -> AppResult<Option<FileRecord>>;
    async fn list_files(&self, parent: FileParent) -> AppResult<Vec<FileRecord>>;
    /// Files of the delivery itself plus those of its NCEs.
    async fn list_delivery_tree_files(&self, delivery_id: Uuid) -> AppResult<Vec<FileRecord>>;
    async fn delete_file(&self, id: Uuid) -> AppResult<bool>;

    // --- Surveys ---
    async fn create_survey(&self, survey: NewSurvey) -> AppResult<Survey>;
    async fn list_surveys(&self, query: &ListQuery) -> AppResult<Page<Survey>>;
    /// Mean score over completed surveys of one type; `None` when there are none.
    async fn average_score(&self, survey_type: SurveyType) -> AppResult<Option<f64>>;

    // --- Notifications ---
    async fn create_notification(&self, notification: NewNotification) -> AppResult<Notification>;
    async fn get_notification(&self, id: Uuid) -> AppResult<Option<Notification>>;
    async fn list_notifications(&self, query: &ListQuery) -> AppResult<Page<Notification>>;
    async fn mark_notification_read(&self, id: Uuid) -> AppResult<Option<Notification>>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
