use crate::{AppState, handlers::users};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Account administration. Listing is open to Admin and Quality, creation to
/// Admin only; both are enforced by the policy check in the handlers.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /admin/users
        .route("/users", get(users::list_users).post(users::create_user))
}
