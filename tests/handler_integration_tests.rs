use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use quality_tracker::{
    AppError, AppState, InMemoryRepository,
    auth::AuthUser,
    config::AppConfig,
    handlers::{
        self,
        deliveries::DeliveryFilter,
        nces::NceFilter,
        notifications::NotificationFilter,
        surveys::SurveyFilter,
    },
    mailer::RecordingMailer,
    models::{
        CreateNceRequest, CreateProjectRequest, CreateSurveyRequest, CreateUserRequest,
        Delivery, DeliveryStatus, DeliveryStatusRequest, NewDelivery, NewProject, NewUser,
        NceStatus, NceStatusRequest, Role, Severity, SurveyType, UpdateDeliveryRequest,
        UpdateNceRequest, User,
    },
    query::ListParams,
    repository::Repository,
    storage::MockStorageService,
};
use std::sync::Arc;
use tokio::test;
use uuid::Uuid;

// --- Fixtures ---

struct Fixture {
    state: AppState,
    repo: Arc<InMemoryRepository>,
    mailer: RecordingMailer,
}

fn fixture() -> Fixture {
    let repo = Arc::new(InMemoryRepository::new());
    let mailer = RecordingMailer::new();
    let state = AppState {
        repo: repo.clone(),
        storage: Arc::new(MockStorageService::new()),
        mailer: Arc::new(mailer.clone()),
        config: AppConfig::default(),
    };
    Fixture { state, repo, mailer }
}

impl Fixture {
    async fn user(&self, role: Role) -> (User, AuthUser) {
        let user = self
            .repo
            .create_user(NewUser {
                email: format!("{}@example.com", Uuid::new_v4()),
                full_name: Some(format!("{role:?} user")),
                role,
                password_hash: None,
            })
            .await
            .unwrap();
        let actor = AuthUser::from(&user);
        (user, actor)
    }

    async fn delivery(&self, created_by: Uuid, client_id: Option<Uuid>, title: &str) -> Delivery {
        let project = self
            .repo
            .create_project(NewProject {
                name: format!("Project for {title}"),
                description: None,
                client_id,
            })
            .await
            .unwrap();
        self.repo
            .create_delivery(NewDelivery {
                project_id: project.id,
                title: title.to_string(),
                description: None,
                created_by,
            })
            .await
            .unwrap()
    }
}

fn nce_request(delivery_id: Uuid) -> CreateNceRequest {
    CreateNceRequest {
        delivery_id,
        title: "Wrong label".to_string(),
        description: "Label shows the previous batch number".to_string(),
        ..CreateNceRequest::default()
    }
}

fn no_filter<T: Default>() -> Query<T> {
    Query(T::default())
}

// --- Tests: error body ---

#[test]
async fn test_error_body_carries_code_and_message() {
    let response = AppError::not_found("Delivery").into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["error"], "Delivery not found");
}

#[test]
async fn test_internal_errors_do_not_leak_details() {
    let response = AppError::Internal("connection string with password".into()).into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(!text.contains("password"));
}

// --- Tests: users and projects ---

#[test]
async fn test_only_admin_creates_accounts() {
    let fx = fixture();
    let (_, admin) = fx.user(Role::Admin).await;
    let (_, quality) = fx.user(Role::Quality).await;

    let request = CreateUserRequest {
        email: "New.Quality@Example.com".to_string(),
        full_name: Some("Q".to_string()),
        password: Some("initial-password".to_string()),
        role: Role::Quality,
    };

    let result =
        handlers::users::create_user(quality, State(fx.state.clone()), Json(request.clone())).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let Json(created) = handlers::users::create_user(admin, State(fx.state.clone()), Json(request))
        .await
        .unwrap();
    assert_eq!(created.email, "new.quality@example.com");
    assert_eq!(created.role, Role::Quality);
    assert!(fx.repo.get_password_hash(created.id).await.unwrap().is_some());
}

#[test]
async fn test_list_users_is_admin_only_and_filters_by_role() {
    let fx = fixture();
    let (_, admin) = fx.user(Role::Admin).await;
    let (_, producer) = fx.user(Role::Producer).await;
    fx.user(Role::Client).await;

    let result = handlers::users::list_users(
        producer,
        State(fx.state.clone()),
        no_filter(),
        no_filter(),
    )
    .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let Json(all) = handlers::users::list_users(admin, State(fx.state.clone()), no_filter(), no_filter())
        .await
        .unwrap();
    assert_eq!(all.total, 3);

    let Json(clients) = handlers::users::list_users(
        admin,
        State(fx.state.clone()),
        no_filter(),
        Query(handlers::users::UserFilter { role: Some(Role::Client) }),
    )
    .await
    .unwrap();
    assert_eq!(clients.total, 1);
    assert!(clients.items.iter().all(|u| u.role == Role::Client));

    // The client directory is readable by producers and lists clients only.
    let Json(directory) = handlers::users::list_clients(producer, State(fx.state.clone()), no_filter())
        .await
        .unwrap();
    assert_eq!(directory.total, 1);
}

#[test]
async fn test_project_with_client_email_creates_client_account() {
    let fx = fixture();
    let (_, quality) = fx.user(Role::Quality).await;

    let Json(project) = handlers::projects::create_project(
        quality,
        State(fx.state.clone()),
        Json(CreateProjectRequest {
            name: "Harbour".to_string(),
            client_email: Some("Buyer@Harbour.test".to_string()),
            ..CreateProjectRequest::default()
        }),
    )
    .await
    .unwrap();

    let client = fx
        .repo
        .find_user_by_email("buyer@harbour.test")
        .await
        .unwrap()
        .expect("client account was created");
    assert_eq!(client.role, Role::Client);
    assert_eq!(project.client_id, Some(client.id));
    // Passwordless until an admin sets one.
    assert!(fx.repo.get_password_hash(client.id).await.unwrap().is_none());

    // Reusing the email links the same account.
    let Json(second) = handlers::projects::create_project(
        quality,
        State(fx.state.clone()),
        Json(CreateProjectRequest {
            name: "Harbour II".to_string(),
            client_email: Some("buyer@harbour.test".to_string()),
            ..CreateProjectRequest::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(second.client_id, Some(client.id));
}

#[test]
async fn test_project_client_id_must_be_a_client() {
    let fx = fixture();
    let (_, admin) = fx.user(Role::Admin).await;
    let (producer_user, _) = fx.user(Role::Producer).await;

    let result = handlers::projects::create_project(
        admin,
        State(fx.state.clone()),
        Json(CreateProjectRequest {
            name: "Mislinked".to_string(),
            client_id: Some(producer_user.id),
            ..CreateProjectRequest::default()
        }),
    )
    .await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let result = handlers::projects::create_project(
        admin,
        State(fx.state.clone()),
        Json(CreateProjectRequest {
            name: "Ghost".to_string(),
            client_id: Some(Uuid::new_v4()),
            ..CreateProjectRequest::default()
        }),
    )
    .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let result = handlers::projects::create_project(
        admin,
        State(fx.state.clone()),
        Json(CreateProjectRequest {
            name: "   ".to_string(),
            ..CreateProjectRequest::default()
        }),
    )
    .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

// --- Tests: deliveries ---

#[test]
async fn test_delivery_edit_bumps_version_and_checks_owner() {
    let fx = fixture();
    let (owner_user, owner) = fx.user(Role::Producer).await;
    let (_, other) = fx.user(Role::Producer).await;
    let delivery = fx.delivery(owner_user.id, None, "Batch 1").await;

    let edit = UpdateDeliveryRequest {
        description: Some("Now with release notes".to_string()),
        ..UpdateDeliveryRequest::default()
    };

    let result = handlers::deliveries::update_delivery(
        other,
        State(fx.state.clone()),
        Path(delivery.id),
        Json(edit.clone()),
    )
    .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let Json(updated) =
        handlers::deliveries::update_delivery(owner, State(fx.state.clone()), Path(delivery.id), Json(edit))
            .await
            .unwrap();
    assert_eq!(updated.version, delivery.version + 1);
    assert_eq!(updated.description.as_deref(), Some("Now with release notes"));

    // An empty patch changes nothing.
    let Json(unchanged) = handlers::deliveries::update_delivery(
        owner,
        State(fx.state.clone()),
        Path(delivery.id),
        Json(UpdateDeliveryRequest::default()),
    )
    .await
    .unwrap();
    assert_eq!(unchanged.version, updated.version);
}

#[test]
async fn test_delivered_at_survives_later_transitions() {
    let fx = fixture();
    let (producer_user, _) = fx.user(Role::Producer).await;
    let (_, quality) = fx.user(Role::Quality).await;
    let delivery = fx.delivery(producer_user.id, None, "Batch 2").await;

    let set_status = |status| {
        handlers::deliveries::update_delivery_status(
            quality,
            State(fx.state.clone()),
            Path(delivery.id),
            Json(DeliveryStatusRequest { status }),
        )
    };

    let Json(approved) = set_status(DeliveryStatus::Approved).await.unwrap();
    let first_delivery = approved.delivered_at.expect("approval stamps delivered_at");

    let Json(rejected) = set_status(DeliveryStatus::Rejected).await.unwrap();
    assert_eq!(rejected.delivered_at, Some(first_delivery));

    let Json(again) = set_status(DeliveryStatus::Approved).await.unwrap();
    assert_eq!(again.delivered_at, Some(first_delivery));

    // One notification per transition, all to the creator.
    assert_eq!(fx.mailer.sent().len(), 3);
}

#[test]
async fn test_delivery_filters_and_client_scope() {
    let fx = fixture();
    let (producer_user, _) = fx.user(Role::Producer).await;
    let (client_user, client) = fx.user(Role::Client).await;
    let (_, admin) = fx.user(Role::Admin).await;

    let visible = fx.delivery(producer_user.id, Some(client_user.id), "Visible").await;
    fx.delivery(producer_user.id, None, "Hidden").await;

    let Json(page) = handlers::deliveries::list_deliveries(
        client,
        State(fx.state.clone()),
        no_filter(),
        no_filter(),
    )
    .await
    .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, visible.id);

    let Json(page) = handlers::deliveries::list_deliveries(
        admin,
        State(fx.state.clone()),
        no_filter(),
        Query(DeliveryFilter {
            project_id: Some(visible.project_id),
            ..DeliveryFilter::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(page.total, 1);

    let Json(page) = handlers::deliveries::list_deliveries(
        admin,
        State(fx.state.clone()),
        Query(ListParams {
            limit: Some(1),
            ..ListParams::default()
        }),
        Query(DeliveryFilter {
            status: Some(DeliveryStatus::Draft),
            ..DeliveryFilter::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);
}

#[test]
async fn test_delete_delivery_cascades() {
    let fx = fixture();
    let (producer_user, producer) = fx.user(Role::Producer).await;
    let delivery = fx.delivery(producer_user.id, None, "Doomed").await;

    let Json(nce) = handlers::nces::create_nce(producer, State(fx.state.clone()), Json(nce_request(delivery.id)))
        .await
        .unwrap();

    let Json(message) =
        handlers::deliveries::delete_delivery(producer, State(fx.state.clone()), Path(delivery.id))
            .await
            .unwrap();
    assert_eq!(message.message, "Delivery deleted successfully");

    assert!(fx.repo.get_delivery(delivery.id).await.unwrap().is_none());
    assert!(fx.repo.get_nce(nce.id).await.unwrap().is_none());

    let result =
        handlers::deliveries::delete_delivery(producer, State(fx.state.clone()), Path(delivery.id)).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

// --- Tests: NCEs ---

#[test]
async fn test_nce_patch_notifies_creator_even_without_status_change() {
    let fx = fixture();
    let (producer_user, producer) = fx.user(Role::Producer).await;
    let (_, quality) = fx.user(Role::Quality).await;
    let delivery = fx.delivery(producer_user.id, None, "Batch 3").await;

    let Json(nce) = handlers::nces::create_nce(
        producer,
        State(fx.state.clone()),
        Json(CreateNceRequest {
            severity: Some(Severity::Low),
            category: Some("labeling".to_string()),
            ..nce_request(delivery.id)
        }),
    )
    .await
    .unwrap();
    assert_eq!(nce.severity, Severity::Low);

    let Json(updated) = handlers::nces::update_nce(
        quality,
        State(fx.state.clone()),
        Path(nce.id),
        Json(UpdateNceRequest {
            severity: Some(Severity::Critical),
            ..UpdateNceRequest::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(updated.severity, Severity::Critical);
    assert_eq!(updated.status, NceStatus::Open);

    let Json(inbox) = handlers::notifications::list_notifications(
        producer,
        State(fx.state.clone()),
        no_filter(),
        no_filter(),
    )
    .await
    .unwrap();
    let kinds: Vec<&str> = inbox.items.iter().map(|n| n.notification_type.as_str()).collect();
    assert!(kinds.contains(&"nce_created"));
    assert!(kinds.contains(&"nce_updated"));
}

#[test]
async fn test_producer_cannot_change_status_or_assign() {
    let fx = fixture();
    let (producer_user, producer) = fx.user(Role::Producer).await;
    let (quality_user, quality) = fx.user(Role::Quality).await;
    let delivery = fx.delivery(producer_user.id, None, "Batch 4").await;
    let Json(nce) = handlers::nces::create_nce(producer, State(fx.state.clone()), Json(nce_request(delivery.id)))
        .await
        .unwrap();

    let result = handlers::nces::update_nce(
        producer,
        State(fx.state.clone()),
        Path(nce.id),
        Json(UpdateNceRequest {
            status: Some(NceStatus::Closed),
            ..UpdateNceRequest::default()
        }),
    )
    .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let result = handlers::nces::update_nce(
        producer,
        State(fx.state.clone()),
        Path(nce.id),
        Json(UpdateNceRequest {
            assigned_to: Some(quality_user.id),
            ..UpdateNceRequest::default()
        }),
    )
    .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let result = handlers::nces::update_nce_status(
        producer,
        State(fx.state.clone()),
        Path(nce.id),
        Json(NceStatusRequest {
            status: NceStatus::Resolved,
            resolution_notes: None,
        }),
    )
    .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    // The owner may still edit the content fields.
    let Json(edited) = handlers::nces::update_nce(
        producer,
        State(fx.state.clone()),
        Path(nce.id),
        Json(UpdateNceRequest {
            category: Some("packaging".to_string()),
            ..UpdateNceRequest::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(edited.category.as_deref(), Some("packaging"));

    // Quality assigns; an unknown assignee is a 404.
    let Json(assigned) = handlers::nces::update_nce(
        quality,
        State(fx.state.clone()),
        Path(nce.id),
        Json(UpdateNceRequest {
            assigned_to: Some(quality_user.id),
            ..UpdateNceRequest::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(assigned.assigned_to, Some(quality_user.id));

    let result = handlers::nces::update_nce(
        quality,
        State(fx.state.clone()),
        Path(nce.id),
        Json(UpdateNceRequest {
            assigned_to: Some(Uuid::new_v4()),
            ..UpdateNceRequest::default()
        }),
    )
    .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[test]
async fn test_nce_list_filters() {
    let fx = fixture();
    let (producer_user, producer) = fx.user(Role::Producer).await;
    let (_, admin) = fx.user(Role::Admin).await;
    let delivery = fx.delivery(producer_user.id, None, "Batch 5").await;

    for severity in [Severity::Low, Severity::High, Severity::High] {
        handlers::nces::create_nce(
            producer,
            State(fx.state.clone()),
            Json(CreateNceRequest {
                severity: Some(severity),
                ..nce_request(delivery.id)
            }),
        )
        .await
        .unwrap();
    }

    let Json(high) = handlers::nces::list_nces(
        admin,
        State(fx.state.clone()),
        no_filter(),
        Query(NceFilter {
            severity: Some(Severity::High),
            ..NceFilter::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(high.total, 2);

    let Json(by_title) = handlers::nces::list_nces(
        admin,
        State(fx.state.clone()),
        no_filter(),
        Query(NceFilter {
            delivery_title: Some("batch 5".to_string()),
            ..NceFilter::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(by_title.total, 3);

    let result = handlers::nces::get_nce(admin, State(fx.state.clone()), Path(Uuid::new_v4())).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

// --- Tests: surveys ---

#[test]
async fn test_surveys_validate_scores_and_feed_the_dashboard() {
    let fx = fixture();
    let (producer_user, _) = fx.user(Role::Producer).await;
    let (client_user, client) = fx.user(Role::Client).await;
    let (_, admin) = fx.user(Role::Admin).await;
    let delivery = fx.delivery(producer_user.id, Some(client_user.id), "Batch 6").await;

    let survey = |survey_type, score| CreateSurveyRequest {
        delivery_id: delivery.id,
        survey_type,
        score,
        comment: None,
    };

    let result =
        handlers::surveys::create_survey(client, State(fx.state.clone()), Json(survey(SurveyType::Csat, Some(9))))
            .await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    for (kind, score) in [
        (SurveyType::Nps, Some(9)),
        (SurveyType::Nps, Some(6)),
        (SurveyType::Csat, Some(4)),
        (SurveyType::Csat, None),
    ] {
        handlers::surveys::create_survey(client, State(fx.state.clone()), Json(survey(kind, score)))
            .await
            .unwrap();
    }

    let Json(mine) = handlers::surveys::list_surveys(
        client,
        State(fx.state.clone()),
        no_filter(),
        Query(SurveyFilter {
            survey_type: Some(SurveyType::Nps),
            ..SurveyFilter::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(mine.total, 2);

    let Json(stats) = handlers::dashboard::get_dashboard_stats(admin, State(fx.state.clone()))
        .await
        .unwrap();
    assert_eq!(stats.avg_nps, 7.5);
    // The unanswered CSAT survey does not count.
    assert_eq!(stats.avg_csat, 4.0);
    assert_eq!(stats.total_deliveries, 1);
}

#[test]
async fn test_survey_requires_visible_delivery() {
    let fx = fixture();
    let (producer_user, _) = fx.user(Role::Producer).await;
    let (_, stranger) = fx.user(Role::Client).await;
    let delivery = fx.delivery(producer_user.id, None, "Private").await;

    let result = handlers::surveys::create_survey(
        stranger,
        State(fx.state.clone()),
        Json(CreateSurveyRequest {
            delivery_id: delivery.id,
            survey_type: SurveyType::Nps,
            score: Some(10),
            comment: None,
        }),
    )
    .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

// --- Tests: notifications and dashboard ---

#[test]
async fn test_mark_read_is_recipient_only() {
    let fx = fixture();
    let (producer_user, producer) = fx.user(Role::Producer).await;
    let (_, admin) = fx.user(Role::Admin).await;
    let delivery = fx.delivery(producer_user.id, None, "Batch 7").await;

    handlers::deliveries::update_delivery_status(
        admin,
        State(fx.state.clone()),
        Path(delivery.id),
        Json(DeliveryStatusRequest {
            status: DeliveryStatus::Delivered,
        }),
    )
    .await
    .unwrap();

    let Json(inbox) = handlers::notifications::list_notifications(
        producer,
        State(fx.state.clone()),
        no_filter(),
        Query(NotificationFilter { unread_only: true }),
    )
    .await
    .unwrap();
    assert_eq!(inbox.total, 1);
    let id = inbox.items[0].id;

    let result =
        handlers::notifications::mark_notification_read(admin, State(fx.state.clone()), Path(id)).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let Json(read) =
        handlers::notifications::mark_notification_read(producer, State(fx.state.clone()), Path(id))
            .await
            .unwrap();
    assert!(read.is_read);

    let result = handlers::notifications::mark_notification_read(
        producer,
        State(fx.state.clone()),
        Path(Uuid::new_v4()),
    )
    .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    // The admin's own inbox stays empty.
    let Json(admin_inbox) =
        handlers::notifications::list_notifications(admin, State(fx.state.clone()), no_filter(), no_filter())
            .await
            .unwrap();
    assert_eq!(admin_inbox.total, 0);
}

#[test]
async fn test_dashboard_counts_are_role_scoped() {
    let fx = fixture();
    let (maker_user, maker) = fx.user(Role::Producer).await;
    let (other_user, _) = fx.user(Role::Producer).await;
    let (_, quality) = fx.user(Role::Quality).await;

    let own = fx.delivery(maker_user.id, None, "Own").await;
    fx.delivery(other_user.id, None, "Foreign").await;
    handlers::nces::create_nce(maker, State(fx.state.clone()), Json(nce_request(own.id)))
        .await
        .unwrap();

    let Json(mine) = handlers::dashboard::get_dashboard_stats(maker, State(fx.state.clone()))
        .await
        .unwrap();
    assert_eq!(mine.total_deliveries, 1);
    assert_eq!(mine.total_nces, 1);
    assert_eq!(mine.open_nces, 1);
    assert_eq!(mine.avg_nps, 0.0);

    let Json(all) = handlers::dashboard::get_dashboard_stats(quality, State(fx.state.clone()))
        .await
        .unwrap();
    assert_eq!(all.total_deliveries, 2);
}

#[test]
async fn test_mail_outage_does_not_fail_the_transition() {
    let repo = Arc::new(InMemoryRepository::new());
    let state = AppState {
        repo: repo.clone(),
        storage: Arc::new(MockStorageService::new()),
        mailer: Arc::new(RecordingMailer::new_failing()),
        config: AppConfig::default(),
    };
    let fx = Fixture {
        state,
        repo,
        mailer: RecordingMailer::new(),
    };
    let (producer_user, producer) = fx.user(Role::Producer).await;
    let (_, quality) = fx.user(Role::Quality).await;
    let delivery = fx.delivery(producer_user.id, None, "Batch 8").await;

    let Json(updated) = handlers::deliveries::update_delivery_status(
        quality,
        State(fx.state.clone()),
        Path(delivery.id),
        Json(DeliveryStatusRequest {
            status: DeliveryStatus::Rejected,
        }),
    )
    .await
    .unwrap();
    assert_eq!(updated.status, DeliveryStatus::Rejected);

    // The notification is stored even though mailing it failed.
    let Json(inbox) =
        handlers::notifications::list_notifications(producer, State(fx.state.clone()), no_filter(), no_filter())
            .await
            .unwrap();
    assert_eq!(inbox.total, 1);
}
