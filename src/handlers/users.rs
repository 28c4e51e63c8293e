use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::{
    AppState,
    accounts,
    auth::AuthUser,
    error::AppResult,
    models::{CreateUserRequest, Page, Role, User},
    policy::{self, Action, Ownership, Resource},
    query::{Collection, Filter, ListParams, ListQuery},
};

/// UserFilter
///
/// Extra query parameters for `GET /admin/users`.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct UserFilter {
    pub role: Option<Role>,
}

/// list_users
///
/// [Admin Route] Every account, any role. Searches email and full name.
#[utoipa::path(
    get,
    path = "/admin/users",
    params(ListParams, UserFilter),
    responses(
        (status = 200, description = "Accounts", body = Page<User>),
        (status = 403, description = "Not authorized")
    )
)]
pub async fn list_users(
    actor: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<UserFilter>,
) -> AppResult<Json<Page<User>>> {
    let query = ListQuery::scoped(&actor, Collection::Users)?
        .with_params(&params)?
        .filter_opt(filter.role.map(Filter::Role));

    Ok(Json(state.repo.list_users(&query).await?))
}

/// create_user
///
/// [Admin Route] Creates an account with any role. Without a password the
/// account exists but cannot log in.
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "Account created", body = User),
        (status = 400, description = "Invalid input or email already registered"),
        (status = 403, description = "Not authorized")
    )
)]
pub async fn create_user(
    actor: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<Json<User>> {
    policy::authorize(&actor, Action::Create, Resource::User, &Ownership::none())?;

    let user = accounts::create_account(
        state.repo.as_ref(),
        &payload.email,
        payload.full_name,
        payload.password.as_deref(),
        payload.role,
    )
    .await?;

    Ok(Json(user))
}

/// list_clients
///
/// [Authenticated Route] The client directory: active and inactive accounts
/// with the `client` role. Producers may read it; clients may not.
#[utoipa::path(
    get,
    path = "/clients",
    params(ListParams),
    responses(
        (status = 200, description = "Client accounts", body = Page<User>),
        (status = 403, description = "Not authorized")
    )
)]
pub async fn list_clients(
    actor: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<User>>> {
    let query = ListQuery::scoped(&actor, Collection::Clients)?.with_params(&params)?;
    Ok(Json(state.repo.list_users(&query).await?))
}
