use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{load_delivery, load_project, required_text};
use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{
        CreateDeliveryRequest, Delivery, DeliveryStatus, DeliveryStatusRequest, MessageResponse,
        NewDelivery, Page, UpdateDeliveryRequest,
    },
    notify,
    policy::{self, Action, Ownership, Resource},
    query::{Collection, Filter, ListParams, ListQuery},
    workflow,
};

/// DeliveryFilter
///
/// Delivery-specific query parameters; the shared ones live in `ListParams`.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct DeliveryFilter {
    pub status: Option<DeliveryStatus>,
    pub project_id: Option<Uuid>,
    /// Substring of the project name.
    pub project_name: Option<String>,
    /// Substring of the project client's email.
    pub client_email: Option<String>,
}

/// create_delivery
///
/// [Authenticated Route] Producers, Admin and Quality. Starts in `draft`,
/// version 1, owned by the caller.
#[utoipa::path(
    post,
    path = "/deliveries",
    request_body = CreateDeliveryRequest,
    responses(
        (status = 200, description = "Delivery created", body = Delivery),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "Project not found")
    )
)]
pub async fn create_delivery(
    actor: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateDeliveryRequest>,
) -> AppResult<Json<Delivery>> {
    policy::authorize(&actor, Action::Create, Resource::Delivery, &Ownership::none())?;
    let title = required_text("title", &payload.title)?;
    let project = load_project(state.repo.as_ref(), payload.project_id).await?;

    let delivery = state
        .repo
        .create_delivery(NewDelivery {
            project_id: project.id,
            title,
            description: payload.description,
            created_by: actor.id,
        })
        .await?;

    tracing::info!(delivery_id = %delivery.id, project_id = %project.id, user_id = %actor.id, "Delivery created");
    Ok(Json(delivery))
}

/// list_deliveries
///
/// [Authenticated Route] Producers see their own deliveries, clients those of
/// their projects. Search covers title and description.
#[utoipa::path(
    get,
    path = "/deliveries",
    params(ListParams, DeliveryFilter),
    responses(
        (status = 200, description = "Deliveries", body = Page<Delivery>),
        (status = 400, description = "Malformed date bound")
    )
)]
pub async fn list_deliveries(
    actor: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<DeliveryFilter>,
) -> AppResult<Json<Page<Delivery>>> {
    let query = ListQuery::scoped(&actor, Collection::Deliveries)?
        .with_params(&params)?
        .filter_opt(filter.status.map(Filter::DeliveryStatus))
        .filter_opt(filter.project_id.map(Filter::ProjectId))
        .filter_opt(Filter::text(filter.project_name.as_deref(), Filter::ProjectName))
        .filter_opt(Filter::text(filter.client_email.as_deref(), Filter::ClientEmail));

    Ok(Json(state.repo.list_deliveries(&query).await?))
}

/// get_delivery
///
/// [Authenticated Route]
#[utoipa::path(
    get,
    path = "/deliveries/{id}",
    params(("id" = Uuid, Path, description = "Delivery ID")),
    responses(
        (status = 200, description = "Found", body = Delivery),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "Delivery not found")
    )
)]
pub async fn get_delivery(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Delivery>> {
    policy::require_grant(&actor, Action::Read, Resource::Delivery)?;
    let delivery = load_delivery(state.repo.as_ref(), id).await?;
    policy::authorize(&actor, Action::Read, Resource::Delivery, &Ownership::from(&delivery))?;
    Ok(Json(delivery))
}

/// update_delivery
///
/// [Authenticated Route] Edits title and/or description. Each edit bumps
/// `version`; an empty patch is a no-op.
#[utoipa::path(
    patch,
    path = "/deliveries/{id}",
    params(("id" = Uuid, Path, description = "Delivery ID")),
    request_body = UpdateDeliveryRequest,
    responses(
        (status = 200, description = "Updated", body = Delivery),
        (status = 400, description = "Blank title"),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "Delivery not found")
    )
)]
pub async fn update_delivery(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateDeliveryRequest>,
) -> AppResult<Json<Delivery>> {
    policy::require_grant(&actor, Action::Update, Resource::Delivery)?;
    let mut delivery = load_delivery(state.repo.as_ref(), id).await?;
    policy::authorize(&actor, Action::Update, Resource::Delivery, &Ownership::from(&delivery))?;

    if let Some(title) = payload.title.as_deref() {
        payload.title = Some(required_text("title", title)?);
    }
    if !workflow::apply_delivery_edit(&mut delivery, &payload) {
        return Ok(Json(delivery));
    }

    let saved = state.repo.save_delivery(&delivery).await?;
    tracing::info!(delivery_id = %saved.id, version = saved.version, "Delivery edited");
    Ok(Json(saved))
}

/// update_delivery_status
///
/// [Authenticated Route] Admin/Quality only. Any target status is accepted;
/// the delivery creator is notified of every transition.
#[utoipa::path(
    put,
    path = "/deliveries/{id}/status",
    params(("id" = Uuid, Path, description = "Delivery ID")),
    request_body = DeliveryStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = Delivery),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "Delivery not found")
    )
)]
pub async fn update_delivery_status(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeliveryStatusRequest>,
) -> AppResult<Json<Delivery>> {
    policy::require_grant(&actor, Action::ChangeStatus, Resource::Delivery)?;
    let mut delivery = load_delivery(state.repo.as_ref(), id).await?;
    policy::authorize(&actor, Action::ChangeStatus, Resource::Delivery, &Ownership::from(&delivery))?;

    let previous = workflow::apply_delivery_status(&mut delivery, payload.status, Utc::now());
    let saved = state.repo.save_delivery(&delivery).await?;
    tracing::info!(
        delivery_id = %saved.id,
        from = %previous,
        to = %saved.status,
        user_id = %actor.id,
        "Delivery status changed"
    );

    notify::emit(
        state.repo.as_ref(),
        state.mailer.as_ref(),
        notify::delivery_status_changed(&saved, previous),
    )
    .await;

    Ok(Json(saved))
}

/// delete_delivery
///
/// [Authenticated Route] Removes the delivery with its NCEs, files and surveys.
/// Blobs go first, best-effort.
#[utoipa::path(
    delete,
    path = "/deliveries/{id}",
    params(("id" = Uuid, Path, description = "Delivery ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "Delivery not found")
    )
)]
pub async fn delete_delivery(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    policy::require_grant(&actor, Action::Delete, Resource::Delivery)?;
    let delivery = load_delivery(state.repo.as_ref(), id).await?;
    policy::authorize(&actor, Action::Delete, Resource::Delivery, &Ownership::from(&delivery))?;

    let files = state.repo.list_delivery_tree_files(id).await?;
    super::files::remove_blobs(state.storage.as_ref(), &files).await;

    if !state.repo.delete_delivery(id).await? {
        return Err(AppError::not_found("Delivery"));
    }

    tracing::info!(delivery_id = %id, files = files.len(), user_id = %actor.id, "Delivery deleted");
    Ok(Json(MessageResponse::new("Delivery deleted successfully")))
}
