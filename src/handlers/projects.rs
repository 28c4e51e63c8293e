use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use super::{load_project, required_text};
use crate::{
    AppState,
    accounts,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{CreateProjectRequest, NewProject, Page, Project, Role},
    policy::{self, Action, Ownership, Resource},
    query::{Collection, Filter, ListParams, ListQuery},
};

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ProjectFilter {
    /// Substring of the linked client's email.
    pub client_email: Option<String>,
}

/// create_project
///
/// [Authenticated Route] Admin/Quality only. The client can be given either as
/// an existing client id or as an email; an unknown email gets a passwordless
/// client account created on the fly. `client_id` wins when both are sent.
#[utoipa::path(
    post,
    path = "/projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 200, description = "Project created", body = Project),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Not authorized"),
        (status = 409, description = "Email belongs to a non-client account")
    )
)]
pub async fn create_project(
    actor: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateProjectRequest>,
) -> AppResult<Json<Project>> {
    policy::authorize(&actor, Action::Create, Resource::Project, &Ownership::none())?;
    let name = required_text("name", &payload.name)?;

    let client_id = match (payload.client_id, payload.client_email.as_deref()) {
        (Some(id), _) => {
            let client = state
                .repo
                .get_user(id)
                .await?
                .ok_or_else(|| AppError::not_found("Client"))?;
            if client.role != Role::Client {
                return Err(AppError::Validation(format!(
                    "User {id} is not a client account"
                )));
            }
            Some(client.id)
        }
        (None, Some(email)) if !email.trim().is_empty() => {
            Some(accounts::ensure_client_account(state.repo.as_ref(), email).await?.id)
        }
        _ => None,
    };

    let project = state
        .repo
        .create_project(NewProject {
            name,
            description: payload.description,
            client_id,
        })
        .await?;

    tracing::info!(project_id = %project.id, user_id = %actor.id, "Project created");
    Ok(Json(project))
}

/// list_projects
///
/// [Authenticated Route] Clients only see projects linked to them.
#[utoipa::path(
    get,
    path = "/projects",
    params(ListParams, ProjectFilter),
    responses(
        (status = 200, description = "Projects", body = Page<Project>),
        (status = 400, description = "Malformed date bound")
    )
)]
pub async fn list_projects(
    actor: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<ProjectFilter>,
) -> AppResult<Json<Page<Project>>> {
    let query = ListQuery::scoped(&actor, Collection::Projects)?
        .with_params(&params)?
        .filter_opt(Filter::text(filter.client_email.as_deref(), Filter::ClientEmail));

    Ok(Json(state.repo.list_projects(&query).await?))
}

/// get_project
///
/// [Authenticated Route]
#[utoipa::path(
    get,
    path = "/projects/{id}",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Found", body = Project),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "Project not found")
    )
)]
pub async fn get_project(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Project>> {
    policy::require_grant(&actor, Action::Read, Resource::Project)?;
    let project = load_project(state.repo.as_ref(), id).await?;
    policy::authorize(&actor, Action::Read, Resource::Project, &Ownership::from(&project))?;
    Ok(Json(project))
}
