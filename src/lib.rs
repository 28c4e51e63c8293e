use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core services.
pub mod accounts;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod models;
pub mod notify;
pub mod policy;
pub mod query;
pub mod repository;
pub mod storage;
pub mod workflow;

// Routing split by guard (public, authenticated, admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use mailer::MailerState;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the
/// OpenAPI document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register, handlers::auth::login, handlers::auth::refresh,
        handlers::auth::get_me,
        handlers::users::list_users, handlers::users::create_user, handlers::users::list_clients,
        handlers::projects::create_project, handlers::projects::list_projects,
        handlers::projects::get_project,
        handlers::deliveries::create_delivery, handlers::deliveries::list_deliveries,
        handlers::deliveries::get_delivery, handlers::deliveries::update_delivery,
        handlers::deliveries::update_delivery_status, handlers::deliveries::delete_delivery,
        handlers::nces::create_nce, handlers::nces::list_nces, handlers::nces::get_nce,
        handlers::nces::update_nce, handlers::nces::update_nce_status, handlers::nces::delete_nce,
        handlers::files::list_delivery_files, handlers::files::upload_delivery_files,
        handlers::files::download_delivery_file, handlers::files::delete_delivery_file,
        handlers::files::list_nce_files, handlers::files::upload_nce_files,
        handlers::files::download_nce_file, handlers::files::delete_nce_file,
        handlers::surveys::create_survey, handlers::surveys::list_surveys,
        handlers::notifications::list_notifications,
        handlers::notifications::mark_notification_read,
        handlers::dashboard::get_dashboard_stats
    ),
    components(
        schemas(
            models::Role, models::DeliveryStatus, models::NceStatus, models::Severity,
            models::SurveyType, models::User, models::Project, models::Delivery, models::Nce,
            models::FileRecord, models::Survey, models::Notification,
            models::RegisterRequest, models::LoginRequest, models::RefreshRequest,
            models::CreateUserRequest, models::CreateProjectRequest,
            models::CreateDeliveryRequest, models::UpdateDeliveryRequest,
            models::DeliveryStatusRequest, models::CreateNceRequest, models::UpdateNceRequest,
            models::NceStatusRequest, models::CreateSurveyRequest, models::TokenResponse,
            models::DashboardStats, models::MessageResponse, handlers::files::UploadForm,
        )
    ),
    tags(
        (name = "quality-tracker", description = "Delivery quality tracking API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared state. Every service sits behind a trait object, so the
/// same router runs against Postgres/S3 in production and in-memory fakes in tests.
#[derive(Clone)]
pub struct AppState {
    /// Persistence: Postgres or the in-memory store.
    pub repo: RepositoryState,
    /// Blob store for attachments: S3/MinIO or the mock.
    pub storage: StorageState,
    /// Outbound mail for notifications.
    pub mailer: MailerState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for MailerState {
    fn from_ref(app_state: &AppState) -> MailerState {
        app_state.mailer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects the request with 401 unless `AuthUser` can be extracted. Handlers
/// extract it again to run their policy checks.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing tree, the auth layer and the observability stack.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let protected = Router::new()
        .merge(authenticated::authenticated_routes())
        .nest("/admin", admin::admin_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(protected)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer` carrying method, uri and the `x-request-id` set by
/// `SetRequestIdLayer`, so every log line of a request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
