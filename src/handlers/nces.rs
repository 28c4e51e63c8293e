use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{load_delivery, load_nce, required_text};
use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{
        CreateNceRequest, FileParent, MessageResponse, Nce, NceStatus, NceStatusRequest, NewNce, Page,
        Severity, UpdateNceRequest,
    },
    notify,
    policy::{self, Action, Ownership, Resource},
    query::{Collection, Filter, ListParams, ListQuery},
    workflow,
};

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct NceFilter {
    pub status: Option<NceStatus>,
    pub severity: Option<Severity>,
    /// Exact category.
    pub category: Option<String>,
    pub delivery_id: Option<Uuid>,
    /// Substring of the project name.
    pub project_name: Option<String>,
    /// Substring of the delivery title.
    pub delivery_title: Option<String>,
}

/// create_nce
///
/// [Authenticated Route] Producers may raise NCEs on any delivery; clients only
/// on deliveries of their projects. Severity defaults to `medium`, status
/// starts `open`. The delivery creator is notified.
#[utoipa::path(
    post,
    path = "/nces",
    request_body = CreateNceRequest,
    responses(
        (status = 200, description = "NCE created", body = Nce),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "Delivery not found")
    )
)]
pub async fn create_nce(
    actor: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateNceRequest>,
) -> AppResult<Json<Nce>> {
    policy::require_grant(&actor, Action::Create, Resource::Nce)?;
    let delivery = load_delivery(state.repo.as_ref(), payload.delivery_id).await?;
    policy::authorize(&actor, Action::Create, Resource::Nce, &Ownership::from(&delivery))?;

    let nce = state
        .repo
        .create_nce(NewNce {
            delivery_id: delivery.id,
            title: required_text("title", &payload.title)?,
            description: required_text("description", &payload.description)?,
            severity: payload.severity.unwrap_or_default(),
            category: payload.category.filter(|c| !c.trim().is_empty()),
            created_by: actor.id,
        })
        .await?;

    tracing::info!(nce_id = %nce.id, delivery_id = %delivery.id, severity = %nce.severity, "NCE created");

    notify::emit(
        state.repo.as_ref(),
        state.mailer.as_ref(),
        notify::nce_created(&nce, &delivery),
    )
    .await;

    Ok(Json(nce))
}

/// list_nces
///
/// [Authenticated Route] Producers see NCEs they raised, clients those on their
/// projects.
#[utoipa::path(
    get,
    path = "/nces",
    params(ListParams, NceFilter),
    responses(
        (status = 200, description = "NCEs", body = Page<Nce>),
        (status = 400, description = "Malformed date bound")
    )
)]
pub async fn list_nces(
    actor: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<NceFilter>,
) -> AppResult<Json<Page<Nce>>> {
    let query = ListQuery::scoped(&actor, Collection::Nces)?
        .with_params(&params)?
        .filter_opt(filter.status.map(Filter::NceStatus))
        .filter_opt(filter.severity.map(Filter::Severity))
        .filter_opt(Filter::text(filter.category.as_deref(), Filter::Category))
        .filter_opt(filter.delivery_id.map(Filter::DeliveryId))
        .filter_opt(Filter::text(filter.project_name.as_deref(), Filter::ProjectName))
        .filter_opt(Filter::text(filter.delivery_title.as_deref(), Filter::DeliveryTitle));

    Ok(Json(state.repo.list_nces(&query).await?))
}

/// get_nce
///
/// [Authenticated Route]
#[utoipa::path(
    get,
    path = "/nces/{id}",
    params(("id" = Uuid, Path, description = "NCE ID")),
    responses(
        (status = 200, description = "Found", body = Nce),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "NCE not found")
    )
)]
pub async fn get_nce(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Nce>> {
    policy::require_grant(&actor, Action::Read, Resource::Nce)?;
    let nce = load_nce(state.repo.as_ref(), id).await?;
    policy::authorize(&actor, Action::Read, Resource::Nce, &Ownership::from(&nce))?;
    Ok(Json(nce))
}

/// update_nce
///
/// [Authenticated Route] Generic patch. Severity, category and notes need the
/// Update grant; `status` and `assigned_to` also need the status grant.
#[utoipa::path(
    patch,
    path = "/nces/{id}",
    params(("id" = Uuid, Path, description = "NCE ID")),
    request_body = UpdateNceRequest,
    responses(
        (status = 200, description = "Updated", body = Nce),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "NCE or assignee not found")
    )
)]
pub async fn update_nce(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateNceRequest>,
) -> AppResult<Json<Nce>> {
    policy::require_grant(&actor, Action::Update, Resource::Nce)?;
    let nce = load_nce(state.repo.as_ref(), id).await?;
    let ownership = Ownership::from(&nce);
    policy::authorize(&actor, Action::Update, Resource::Nce, &ownership)?;
    if payload.status.is_some() || payload.assigned_to.is_some() {
        policy::authorize(&actor, Action::ChangeStatus, Resource::Nce, &ownership)?;
    }

    if let Some(assignee) = payload.assigned_to {
        state
            .repo
            .get_user(assignee)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;
    }

    Ok(Json(apply_and_notify(&state, nce, &payload).await?))
}

/// update_nce_status
///
/// [Authenticated Route] Admin/Quality only. Free transitions between the four
/// states; `resolved_at` is set only while `resolved`.
#[utoipa::path(
    patch,
    path = "/nces/{id}/status",
    params(("id" = Uuid, Path, description = "NCE ID")),
    request_body = NceStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = Nce),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "NCE not found")
    )
)]
pub async fn update_nce_status(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<NceStatusRequest>,
) -> AppResult<Json<Nce>> {
    policy::require_grant(&actor, Action::ChangeStatus, Resource::Nce)?;
    let nce = load_nce(state.repo.as_ref(), id).await?;
    policy::authorize(&actor, Action::ChangeStatus, Resource::Nce, &Ownership::from(&nce))?;

    let update = UpdateNceRequest {
        status: Some(payload.status),
        resolution_notes: payload.resolution_notes,
        ..UpdateNceRequest::default()
    };
    Ok(Json(apply_and_notify(&state, nce, &update).await?))
}

async fn apply_and_notify(state: &AppState, mut nce: Nce, update: &UpdateNceRequest) -> AppResult<Nce> {
    let change = workflow::apply_nce_update(&mut nce, update, Utc::now());
    let saved = state.repo.save_nce(&nce).await?;

    if change.status_changed() {
        tracing::info!(nce_id = %saved.id, from = %change.previous, to = %change.current, "NCE status changed");
    } else {
        tracing::info!(nce_id = %saved.id, "NCE updated");
    }

    notify::emit(
        state.repo.as_ref(),
        state.mailer.as_ref(),
        notify::nce_updated(&saved, change),
    )
    .await;

    Ok(saved)
}

/// delete_nce
///
/// [Authenticated Route] Removes the NCE and its attachments.
#[utoipa::path(
    delete,
    path = "/nces/{id}",
    params(("id" = Uuid, Path, description = "NCE ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "NCE not found")
    )
)]
pub async fn delete_nce(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    policy::require_grant(&actor, Action::Delete, Resource::Nce)?;
    let nce = load_nce(state.repo.as_ref(), id).await?;
    policy::authorize(&actor, Action::Delete, Resource::Nce, &Ownership::from(&nce))?;

    let files = state.repo.list_files(FileParent::Nce(id)).await?;
    super::files::remove_blobs(state.storage.as_ref(), &files).await;

    if !state.repo.delete_nce(id).await? {
        return Err(AppError::not_found("NCE"));
    }

    tracing::info!(nce_id = %id, user_id = %actor.id, "NCE deleted");
    Ok(Json(MessageResponse::new("NCE deleted successfully")))
}
