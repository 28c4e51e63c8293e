use crate::{
    AppState,
    handlers::{auth, dashboard, deliveries, files, nces, notifications, projects, surveys, users},
};
use axum::{
    Router,
    routing::{get, patch, put},
};

/// Authenticated Router Module
///
/// Every route here needs a valid access token (or the local `x-user-id`
/// bypass). What the caller may actually see or change is decided per handler
/// by the access policy.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /auth/me
        .route("/auth/me", get(auth::get_me))
        // GET /clients
        // Client directory used when linking a project to a client.
        .route("/clients", get(users::list_clients))
        // --- Projects ---
        .route("/projects", get(projects::list_projects).post(projects::create_project))
        .route("/projects/{id}", get(projects::get_project))
        // --- Deliveries ---
        .route(
            "/deliveries",
            get(deliveries::list_deliveries).post(deliveries::create_delivery),
        )
        .route(
            "/deliveries/{id}",
            get(deliveries::get_delivery)
                .patch(deliveries::update_delivery)
                .delete(deliveries::delete_delivery),
        )
        // PUT /deliveries/{id}/status
        // Admin/Quality only; notifies the delivery creator.
        .route("/deliveries/{id}/status", put(deliveries::update_delivery_status))
        .route(
            "/deliveries/{id}/files",
            get(files::list_delivery_files).post(files::upload_delivery_files),
        )
        .route(
            "/deliveries/{id}/files/{file_id}/download",
            get(files::download_delivery_file),
        )
        .route(
            "/deliveries/{id}/files/{file_id}",
            axum::routing::delete(files::delete_delivery_file),
        )
        // --- NCEs ---
        .route("/nces", get(nces::list_nces).post(nces::create_nce))
        .route(
            "/nces/{id}",
            get(nces::get_nce).patch(nces::update_nce).delete(nces::delete_nce),
        )
        .route("/nces/{id}/status", patch(nces::update_nce_status))
        .route(
            "/nces/{id}/files",
            get(files::list_nce_files).post(files::upload_nce_files),
        )
        .route("/nces/{id}/files/{file_id}/download", get(files::download_nce_file))
        .route(
            "/nces/{id}/files/{file_id}",
            axum::routing::delete(files::delete_nce_file),
        )
        // --- Surveys, notifications, dashboard ---
        .route("/surveys", get(surveys::list_surveys).post(surveys::create_survey))
        .route("/notifications", get(notifications::list_notifications))
        // PATCH /notifications/{id}/read
        // Recipient only, Admin included.
        .route(
            "/notifications/{id}/read",
            patch(notifications::mark_notification_read),
        )
        .route("/dashboard/stats", get(dashboard::get_dashboard_stats))
}
