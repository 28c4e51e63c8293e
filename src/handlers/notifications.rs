use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{Notification, Page},
    policy::{self, Action, Ownership, Resource},
    query::{Collection, Filter, ListParams, ListQuery},
};

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct NotificationFilter {
    /// Only unread notifications when `true`.
    #[serde(default)]
    pub unread_only: bool,
}

/// list_notifications
///
/// [Authenticated Route] The caller's own notifications, newest first by
/// default. Nobody can read another user's inbox, Admin included.
#[utoipa::path(
    get,
    path = "/notifications",
    params(ListParams, NotificationFilter),
    responses((status = 200, description = "Notifications", body = Page<Notification>))
)]
pub async fn list_notifications(
    actor: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<NotificationFilter>,
) -> AppResult<Json<Page<Notification>>> {
    let query = ListQuery::scoped(&actor, Collection::Notifications)?
        .with_params(&params)?
        .filter_opt(filter.unread_only.then_some(Filter::UnreadOnly));

    Ok(Json(state.repo.list_notifications(&query).await?))
}

/// mark_notification_read
///
/// [Authenticated Route] Idempotent.
#[utoipa::path(
    patch,
    path = "/notifications/{id}/read",
    params(("id" = Uuid, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Marked as read", body = Notification),
        (status = 403, description = "Not the recipient"),
        (status = 404, description = "Notification not found")
    )
)]
pub async fn mark_notification_read(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Notification>> {
    let notification = state
        .repo
        .get_notification(id)
        .await?
        .ok_or_else(|| AppError::not_found("Notification"))?;
    policy::authorize(&actor, Action::Update, Resource::Notification, &Ownership::from(&notification))?;

    let updated = state
        .repo
        .mark_notification_read(id)
        .await?
        .ok_or_else(|| AppError::not_found("Notification"))?;
    Ok(Json(updated))
}
