use crate::{AppState, handlers::auth};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that must work without a token: the identity flow and the
/// load-balancer health check.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Returns "ok" as soon as the service is accepting requests.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/register
        // Self-registration for producer and client accounts.
        .route("/auth/register", post(auth::register))
        // POST /auth/login
        .route("/auth/login", post(auth::login))
        // POST /auth/refresh
        // Only refresh tokens are accepted here.
        .route("/auth/refresh", post(auth::refresh))
}
