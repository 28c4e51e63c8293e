use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Enumerations (mapped to Postgres enum types) ---

/// Role
///
/// The RBAC role of an account. Fixed at creation time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
    Serialize, Deserialize, sqlx::Type, TS, ToSchema,
)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    Admin,
    Quality,
    #[default]
    Producer,
    Client,
}

/// DeliveryStatus
///
/// `Draft -> Delivered -> Approved | Rejected`. Any target is accepted by the
/// status endpoint; see `workflow::apply_delivery_status`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
    Serialize, Deserialize, sqlx::Type, TS, ToSchema,
)]
#[sqlx(type_name = "delivery_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DeliveryStatus {
    #[default]
    Draft,
    Delivered,
    Approved,
    Rejected,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
    Serialize, Deserialize, sqlx::Type, TS, ToSchema,
)]
#[sqlx(type_name = "nce_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum NceStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

/// Severity
///
/// Declaration order is the sort order (`low` < `critical`), both in Postgres
/// and in memory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
    Serialize, Deserialize, sqlx::Type, TS, ToSchema,
)]
#[sqlx(type_name = "nce_severity", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
    Serialize, Deserialize, sqlx::Type, TS, ToSchema,
)]
#[sqlx(type_name = "survey_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum SurveyType {
    #[default]
    Nps,
    Csat,
}

impl SurveyType {
    /// Inclusive score bounds accepted for a completed survey.
    pub fn score_range(self) -> (i32, i32) {
        match self {
            SurveyType::Nps => (0, 10),
            SurveyType::Csat => (1, 5),
        }
    }
}

// Human-readable labels, used in notification messages.

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Admin => "Admin",
            Role::Quality => "Quality",
            Role::Producer => "Producer",
            Role::Client => "Client",
        })
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeliveryStatus::Draft => "Draft",
            DeliveryStatus::Delivered => "Delivered",
            DeliveryStatus::Approved => "Approved",
            DeliveryStatus::Rejected => "Rejected",
        })
    }
}

impl fmt::Display for NceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NceStatus::Open => "Open",
            NceStatus::InProgress => "In Progress",
            NceStatus::Resolved => "Resolved",
            NceStatus::Closed => "Closed",
        })
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        })
    }
}

impl fmt::Display for SurveyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SurveyType::Nps => "NPS",
            SurveyType::Csat => "CSAT",
        })
    }
}

// --- Core Records (mapped to database rows) ---

/// User
///
/// Account record from the `users` table. The password hash lives in the same
/// row but is only ever read through `Repository::get_password_hash`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    // Absent for client accounts created from a project's client email.
    pub full_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Insert payload for `users`. Internal only.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub password_hash: Option<String>,
}

/// Project
///
/// `client_email` / `client_name` are loaded via a LEFT JOIN on the client
/// account and take part in free-text search.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub client_id: Option<Uuid>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    pub client_email: Option<String>,
    pub client_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub client_id: Option<Uuid>,
}

/// Delivery
///
/// A versioned hand-over under a project. `project_name`, `client_id` and
/// `client_email` come from the parent project; `client_id` drives Client
/// visibility.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Delivery {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: DeliveryStatus,
    pub version: i32,
    pub created_by: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    /// First approval time. Never cleared once set.
    pub delivered_at: Option<DateTime<Utc>>,
    pub project_name: String,
    pub client_id: Option<Uuid>,
    pub client_email: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewDelivery {
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_by: Uuid,
}

/// Nce
///
/// Non-conformance event raised against a delivery.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Nce {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub status: NceStatus,
    pub category: Option<String>,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    /// Non-null iff `status == resolved`.
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    pub delivery_title: String,
    pub project_id: Uuid,
    pub project_name: String,
    pub client_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct NewNce {
    pub delivery_id: Uuid,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub category: Option<String>,
    pub created_by: Uuid,
}

/// FileParent
///
/// A file hangs off exactly one delivery or exactly one NCE. Using an enum
/// instead of two nullable ids makes the "never both, never neither" rule
/// unrepresentable to break on the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileParent {
    Delivery(Uuid),
    Nce(Uuid),
}

impl FileParent {
    /// One storage folder per parent id.
    pub fn folder(&self) -> String {
        match self {
            FileParent::Delivery(id) => format!("deliveries/{id}"),
            FileParent::Nce(id) => format!("nces/{id}"),
        }
    }

    pub fn delivery_id(&self) -> Option<Uuid> {
        match self {
            FileParent::Delivery(id) => Some(*id),
            FileParent::Nce(_) => None,
        }
    }

    pub fn nce_id(&self) -> Option<Uuid> {
        match self {
            FileParent::Nce(id) => Some(*id),
            FileParent::Delivery(_) => None,
        }
    }
}

/// FileRecord
///
/// Metadata row from the `files` table; the bytes live in the blob store under
/// `storage_key`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct FileRecord {
    pub id: Uuid,
    pub filename: String,
    pub storage_key: String,
    pub delivery_id: Option<Uuid>,
    pub nce_id: Option<Uuid>,
    #[ts(type = "string")]
    pub uploaded_at: DateTime<Utc>,
    pub is_receipt: bool,
}

impl FileRecord {
    /// Rebuilds the parent from the two nullable columns. `None` only for rows
    /// that violate the single-parent constraint.
    pub fn parent(&self) -> Option<FileParent> {
        match (self.delivery_id, self.nce_id) {
            (Some(id), None) => Some(FileParent::Delivery(id)),
            (None, Some(id)) => Some(FileParent::Nce(id)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewFile {
    pub parent: FileParent,
    pub filename: String,
    pub storage_key: String,
    pub is_receipt: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Survey {
    pub id: Uuid,
    pub delivery_id: Uuid,
    // Respondent.
    pub user_id: Uuid,
    pub survey_type: SurveyType,
    pub score: Option<i32>,
    pub comment: Option<String>,
    #[ts(type = "string")]
    pub sent_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct NewSurvey {
    pub delivery_id: Uuid,
    pub user_id: Uuid,
    pub survey_type: SurveyType,
    pub score: Option<i32>,
    pub comment: Option<String>,
}

/// Notification
///
/// A message addressed to exactly one user. Always read through the
/// recipient's own scope.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    // 'type' is a reserved keyword in Rust, so it is renamed on both sides.
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub notification_type: String,
    pub is_read: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    /// Deep link into the frontend (e.g. `/deliveries/<id>`).
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub link: Option<String>,
}

// --- Request Payloads (Input Schemas) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisterRequest {
    pub email: String,
    pub full_name: String,
    pub password: String,
    /// Only `producer` (default) and `client` may self-register.
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// CreateUserRequest
///
/// Admin-only account creation (POST /admin/users). A missing password creates
/// a passwordless account that cannot log in.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateUserRequest {
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub role: Role,
}

/// CreateProjectRequest
///
/// The client is given either by id or by email; an unknown email creates a
/// passwordless client account.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub client_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateDeliveryRequest {
    pub project_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// UpdateDeliveryRequest
///
/// Partial content edit (PATCH /deliveries/{id}); bumps `version`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateDeliveryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DeliveryStatusRequest {
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateNceRequest {
    pub delivery_id: Uuid,
    pub title: String,
    pub description: String,
    /// Defaults to `medium`.
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub category: Option<String>,
}

/// UpdateNceRequest
///
/// Generic NCE patch (PATCH /nces/{id}). Every field is optional and applied
/// independently; a `status` change additionally requires the status grant.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateNceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct NceStatusRequest {
    pub status: NceStatus,
    #[serde(default)]
    pub resolution_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateSurveyRequest {
    pub delivery_id: Uuid,
    pub survey_type: SurveyType,
    #[serde(default)]
    pub score: Option<i32>,
    #[serde(default)]
    pub comment: Option<String>,
}

// --- Output Schemas ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub user: User,
}

/// Page
///
/// The list contract shared by every scoped list endpoint. `total` is the
/// filtered count before `skip`/`limit`, never the page size.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct Page<T> {
    pub total: i64,
    pub items: Vec<T>,
}

/// DashboardStats
///
/// Role-scoped counters plus global survey averages rounded to 2 decimals.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DashboardStats {
    pub total_deliveries: i64,
    pub total_nces: i64,
    pub open_nces: i64,
    pub avg_nps: f64,
    pub avg_csat: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
