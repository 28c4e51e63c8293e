use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::Repository;
use crate::{
    error::{AppError, AppResult},
    models::{
        Delivery, FileParent, FileRecord, Nce, NewDelivery, NewFile, NewNce, NewNotification,
        NewProject, NewSurvey, NewUser, Notification, Page, Project, Survey, SurveyType, User,
    },
    query::ListQuery,
};

#[derive(Default)]
struct Store {
    users: Vec<(User, Option<String>)>,
    projects: Vec<Project>,
    deliveries: Vec<Delivery>,
    nces: Vec<Nce>,
    files: Vec<FileRecord>,
    surveys: Vec<Survey>,
    notifications: Vec<Notification>,
}

impl Store {
    fn user(&self, id: Uuid) -> Option<&User> {
        self.users.iter().map(|(u, _)| u).find(|u| u.id == id)
    }

    // Joined columns are recomputed on every read, like the SQL joins.

    fn project_view(&self, project: &Project) -> Project {
        let client = project.client_id.and_then(|id| self.user(id));
        Project {
            client_email: client.map(|c| c.email.clone()),
            client_name: client.and_then(|c| c.full_name.clone()),
            ..project.clone()
        }
    }

    fn delivery_view(&self, delivery: &Delivery) -> Delivery {
        let project = self.projects.iter().find(|p| p.id == delivery.project_id);
        let client_id = project.and_then(|p| p.client_id);
        Delivery {
            project_name: project.map(|p| p.name.clone()).unwrap_or_default(),
            client_id,
            client_email: client_id.and_then(|id| self.user(id)).map(|c| c.email.clone()),
            ..delivery.clone()
        }
    }

    fn nce_view(&self, nce: &Nce) -> Nce {
        let delivery = self
            .deliveries
            .iter()
            .find(|d| d.id == nce.delivery_id)
            .map(|d| self.delivery_view(d));
        match delivery {
            Some(d) => Nce {
                delivery_title: d.title,
                project_id: d.project_id,
                project_name: d.project_name,
                client_id: d.client_id,
                ..nce.clone()
            },
            None => nce.clone(),
        }
    }
}

/// InMemoryRepository
///
/// `Repository` over plain vectors behind a mutex. Evaluates list queries with
/// `ListQuery::apply`, so scoping and ordering match the SQL rendering. Used
/// by the test suites and for running the API without a database.
#[derive(Default)]
pub struct InMemoryRepository {
    store: Mutex<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeding helper: flips `is_active`. `false` when the user is unknown.
    pub fn set_user_active(&self, id: Uuid, active: bool) -> bool {
        let Ok(mut store) = self.store.lock() else {
            return false;
        };
        match store.users.iter_mut().find(|(u, _)| u.id == id) {
            Some((user, _)) => {
                user.is_active = active;
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|_| AppError::Internal("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.lock()?.user(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let store = self.lock()?;
        Ok(store.users.iter().map(|(u, _)| u).find(|u| u.email == email).cloned())
    }

    async fn get_password_hash(&self, id: Uuid) -> AppResult<Option<String>> {
        let store = self.lock()?;
        Ok(store
            .users
            .iter()
            .find(|(u, _)| u.id == id)
            .and_then(|(_, hash)| hash.clone()))
    }

    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let mut store = self.lock()?;
        if store.users.iter().any(|(u, _)| u.email == user.email) {
            return Err(AppError::Validation("Email already registered".to_string()));
        }
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            is_active: true,
            created_at: Utc::now(),
        };
        store.users.push((created.clone(), user.password_hash));
        Ok(created)
    }

    async fn list_users(&self, query: &ListQuery) -> AppResult<Page<User>> {
        let store = self.lock()?;
        Ok(query.apply(store.users.iter().map(|(u, _)| u.clone())))
    }

    async fn create_project(&self, project: NewProject) -> AppResult<Project> {
        let mut store = self.lock()?;
        let now = Utc::now();
        let created = Project {
            id: Uuid::new_v4(),
            name: project.name,
            description: project.description,
            client_id: project.client_id,
            created_at: now,
            updated_at: now,
            ..Default::default()
        };
        store.projects.push(created.clone());
        Ok(store.project_view(&created))
    }

    async fn get_project(&self, id: Uuid) -> AppResult<Option<Project>> {
        let store = self.lock()?;
        Ok(store.projects.iter().find(|p| p.id == id).map(|p| store.project_view(p)))
    }

    async fn list_projects(&self, query: &ListQuery) -> AppResult<Page<Project>> {
        let store = self.lock()?;
        Ok(query.apply(store.projects.iter().map(|p| store.project_view(p))))
    }

    async fn create_delivery(&self, delivery: NewDelivery) -> AppResult<Delivery> {
        let mut store = self.lock()?;
        let created = Delivery {
            id: Uuid::new_v4(),
            project_id: delivery.project_id,
            title: delivery.title,
            description: delivery.description,
            version: 1,
            created_by: delivery.created_by,
            created_at: Utc::now(),
            ..Default::default()
        };
        store.deliveries.push(created.clone());
        Ok(store.delivery_view(&created))
    }

    async fn get_delivery(&self, id: Uuid) -> AppResult<Option<Delivery>> {
        let store = self.lock()?;
        Ok(store.deliveries.iter().find(|d| d.id == id).map(|d| store.delivery_view(d)))
    }

    async fn list_deliveries(&self, query: &ListQuery) -> AppResult<Page<Delivery>> {
        let store = self.lock()?;
        Ok(query.apply(store.deliveries.iter().map(|d| store.delivery_view(d))))
    }

    async fn count_deliveries(&self, query: &ListQuery) -> AppResult<i64> {
        let store = self.lock()?;
        let rows: Vec<Delivery> = store.deliveries.iter().map(|d| store.delivery_view(d)).collect();
        Ok(query.count(&rows))
    }

    async fn save_delivery(&self, delivery: &Delivery) -> AppResult<Delivery> {
        let mut store = self.lock()?;
        let stored = store
            .deliveries
            .iter_mut()
            .find(|d| d.id == delivery.id)
            .ok_or_else(|| AppError::not_found("Delivery"))?;
        stored.title = delivery.title.clone();
        stored.description = delivery.description.clone();
        stored.status = delivery.status;
        stored.version = delivery.version;
        stored.delivered_at = delivery.delivered_at;
        let saved = stored.clone();
        Ok(store.delivery_view(&saved))
    }

    async fn delete_delivery(&self, id: Uuid) -> AppResult<bool> {
        let mut store = self.lock()?;
        let before = store.deliveries.len();
        store.deliveries.retain(|d| d.id != id);
        if store.deliveries.len() == before {
            return Ok(false);
        }

        let nce_ids: Vec<Uuid> = store
            .nces
            .iter()
            .filter(|n| n.delivery_id == id)
            .map(|n| n.id)
            .collect();
        store.nces.retain(|n| n.delivery_id != id);
        store.files.retain(|f| {
            f.delivery_id != Some(id) && !f.nce_id.is_some_and(|n| nce_ids.contains(&n))
        });
        store.surveys.retain(|s| s.delivery_id != id);
        Ok(true)
    }

    async fn create_nce(&self, nce: NewNce) -> AppResult<Nce> {
        let mut store = self.lock()?;
        let created = Nce {
            id: Uuid::new_v4(),
            delivery_id: nce.delivery_id,
            title: nce.title,
            description: nce.description,
            severity: nce.severity,
            category: nce.category,
            created_by: nce.created_by,
            created_at: Utc::now(),
            ..Default::default()
        };
        store.nces.push(created.clone());
        Ok(store.nce_view(&created))
    }

    async fn get_nce(&self, id: Uuid) -> AppResult<Option<Nce>> {
        let store = self.lock()?;
        Ok(store.nces.iter().find(|n| n.id == id).map(|n| store.nce_view(n)))
    }

    async fn list_nces(&self, query: &ListQuery) -> AppResult<Page<Nce>> {
        let store = self.lock()?;
        Ok(query.apply(store.nces.iter().map(|n| store.nce_view(n))))
    }

    async fn count_nces(&self, query: &ListQuery) -> AppResult<i64> {
        let store = self.lock()?;
        let rows: Vec<Nce> = store.nces.iter().map(|n| store.nce_view(n)).collect();
        Ok(query.count(&rows))
    }

    async fn save_nce(&self, nce: &Nce) -> AppResult<Nce> {
        let mut store = self.lock()?;
        let stored = store
            .nces
            .iter_mut()
            .find(|n| n.id == nce.id)
            .ok_or_else(|| AppError::not_found("NCE"))?;
        stored.severity = nce.severity;
        stored.status = nce.status;
        stored.category = nce.category.clone();
        stored.assigned_to = nce.assigned_to;
        stored.resolved_at = nce.resolved_at;
        stored.resolution_notes = nce.resolution_notes.clone();
        let saved = stored.clone();
        Ok(store.nce_view(&saved))
    }

    async fn delete_nce(&self, id: Uuid) -> AppResult<bool> {
        let mut store = self.lock()?;
        let before = store.nces.len();
        store.nces.retain(|n| n.id != id);
        if store.nces.len() == before {
            return Ok(false);
        }
        store.files.retain(|f| f.nce_id != Some(id));
        Ok(true)
    }

    async fn create_file(&self, file: NewFile) -> AppResult<FileRecord> {
        let mut store = self.lock()?;
        let created = FileRecord {
            id: Uuid::new_v4(),
            filename: file.filename,
            storage_key: file.storage_key,
            delivery_id: file.parent.delivery_id(),
            nce_id: file.parent.nce_id(),
            uploaded_at: Utc::now(),
            is_receipt: file.is_receipt,
        };
        store.files.push(created.clone());
        Ok(created)
    }

    async fn get_file(&self, id: Uuid) -> AppResult<Option<FileRecord>> {
        Ok(self.lock()?.files.iter().find(|f| f.id == id).cloned())
    }

    async fn list_files(&self, parent: FileParent) -> AppResult<Vec<FileRecord>> {
        let store = self.lock()?;
        Ok(store
            .files
            .iter()
            .filter(|f| f.parent() == Some(parent))
            .cloned()
            .collect())
    }

    async fn list_delivery_tree_files(&self, delivery_id: Uuid) -> AppResult<Vec<FileRecord>> {
        let store = self.lock()?;
        let nce_ids: Vec<Uuid> = store
            .nces
            .iter()
            .filter(|n| n.delivery_id == delivery_id)
            .map(|n| n.id)
            .collect();
        Ok(store
            .files
            .iter()
            .filter(|f| {
                f.delivery_id == Some(delivery_id) || f.nce_id.is_some_and(|n| nce_ids.contains(&n))
            })
            .cloned()
            .collect())
    }

    async fn delete_file(&self, id: Uuid) -> AppResult<bool> {
        let mut store = self.lock()?;
        let before = store.files.len();
        store.files.retain(|f| f.id != id);
        Ok(store.files.len() < before)
    }

    async fn create_survey(&self, survey: NewSurvey) -> AppResult<Survey> {
        let mut store = self.lock()?;
        let now = Utc::now();
        let created = Survey {
            id: Uuid::new_v4(),
            delivery_id: survey.delivery_id,
            user_id: survey.user_id,
            survey_type: survey.survey_type,
            score: survey.score,
            comment: survey.comment,
            sent_at: now,
            completed_at: survey.score.map(|_| now),
        };
        store.surveys.push(created.clone());
        Ok(created)
    }

    async fn list_surveys(&self, query: &ListQuery) -> AppResult<Page<Survey>> {
        let store = self.lock()?;
        Ok(query.apply(store.surveys.iter().cloned()))
    }

    async fn average_score(&self, survey_type: SurveyType) -> AppResult<Option<f64>> {
        let store = self.lock()?;
        let scores: Vec<f64> = store
            .surveys
            .iter()
            .filter(|s| s.survey_type == survey_type && s.completed_at.is_some())
            .filter_map(|s| s.score.map(f64::from))
            .collect();
        if scores.is_empty() {
            return Ok(None);
        }
        Ok(Some(scores.iter().sum::<f64>() / scores.len() as f64))
    }

    async fn create_notification(&self, notification: NewNotification) -> AppResult<Notification> {
        let mut store = self.lock()?;
        let created = Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            title: notification.title,
            message: notification.message,
            notification_type: notification.notification_type,
            is_read: false,
            created_at: Utc::now(),
            link: notification.link,
        };
        store.notifications.push(created.clone());
        Ok(created)
    }

    async fn get_notification(&self, id: Uuid) -> AppResult<Option<Notification>> {
        Ok(self.lock()?.notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn list_notifications(&self, query: &ListQuery) -> AppResult<Page<Notification>> {
        let store = self.lock()?;
        Ok(query.apply(store.notifications.iter().cloned()))
    }

    async fn mark_notification_read(&self, id: Uuid) -> AppResult<Option<Notification>> {
        let mut store = self.lock()?;
        Ok(store.notifications.iter_mut().find(|n| n.id == id).map(|n| {
            n.is_read = true;
            n.clone()
        }))
    }
}
