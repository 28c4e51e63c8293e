use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, PgPool, postgres::PgRow};
use uuid::Uuid;

use super::Repository;
use crate::{
    error::{AppError, AppResult},
    models::{
        Delivery, FileParent, FileRecord, Nce, NewDelivery, NewFile, NewNce, NewNotification,
        NewProject, NewSurvey, NewUser, Notification, Page, Project, Survey, SurveyType, User,
    },
    query::{
        Collection, ListQuery,
        sql::{count_sql, select_from, select_sql},
    },
};

const FILE_COLUMNS: &str = "id, filename, storage_key, delivery_id, nce_id, uploaded_at, is_receipt";

/// PostgresRepository
///
/// `Repository` backed by Postgres. Queries are built at runtime (no
/// compile-time database needed); list queries come from `query::sql`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Count (stage 6) and page (stage 7) for any collection.
    async fn fetch_page<T>(&self, query: &ListQuery) -> AppResult<Page<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let total = self.fetch_count(query).await?;
        let mut builder = select_sql(query);
        let items = builder.build_query_as::<T>().fetch_all(&self.pool).await?;
        Ok(Page { total, items })
    }

    async fn fetch_count(&self, query: &ListQuery) -> AppResult<i64> {
        let mut builder = count_sql(query);
        let total = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    /// Single-row read through the same joins as the list query.
    async fn fetch_by_id<T>(&self, collection: Collection, id: Uuid) -> AppResult<Option<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let sql = format!("{} WHERE {}.id = $1", select_from(collection), collection.alias());
        let row = sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn refetch<T>(&self, collection: Collection, id: Uuid) -> AppResult<T>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        self.fetch_by_id(collection, id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("row {id} vanished after write")))
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        self.fetch_by_id(Collection::Users, id).await
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let sql = format!("{} WHERE u.email = $1", select_from(Collection::Users));
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_password_hash(&self, id: Uuid) -> AppResult<Option<String>> {
        let hash = sqlx::query_scalar::<_, Option<String>>("SELECT password_hash FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(hash.flatten())
    }

    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, full_name, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, full_name, role, is_active, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn list_users(&self, query: &ListQuery) -> AppResult<Page<User>> {
        self.fetch_page(query).await
    }

    async fn create_project(&self, project: NewProject) -> AppResult<Project> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO projects (id, name, description, client_id) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(&project.name)
            .bind(&project.description)
            .bind(project.client_id)
            .execute(&self.pool)
            .await?;
        self.refetch(Collection::Projects, id).await
    }

    async fn get_project(&self, id: Uuid) -> AppResult<Option<Project>> {
        self.fetch_by_id(Collection::Projects, id).await
    }

    async fn list_projects(&self, query: &ListQuery) -> AppResult<Page<Project>> {
        self.fetch_page(query).await
    }

    async fn create_delivery(&self, delivery: NewDelivery) -> AppResult<Delivery> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO deliveries (id, project_id, title, description, created_by) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(delivery.project_id)
        .bind(&delivery.title)
        .bind(&delivery.description)
        .bind(delivery.created_by)
        .execute(&self.pool)
        .await?;
        self.refetch(Collection::Deliveries, id).await
    }

    async fn get_delivery(&self, id: Uuid) -> AppResult<Option<Delivery>> {
        self.fetch_by_id(Collection::Deliveries, id).await
    }

    async fn list_deliveries(&self, query: &ListQuery) -> AppResult<Page<Delivery>> {
        self.fetch_page(query).await
    }

    async fn count_deliveries(&self, query: &ListQuery) -> AppResult<i64> {
        self.fetch_count(query).await
    }

    async fn save_delivery(&self, delivery: &Delivery) -> AppResult<Delivery> {
        sqlx::query(
            r#"
            UPDATE deliveries
            SET title = $2, description = $3, status = $4, version = $5, delivered_at = $6
            WHERE id = $1
            "#,
        )
        .bind(delivery.id)
        .bind(&delivery.title)
        .bind(&delivery.description)
        .bind(delivery.status)
        .bind(delivery.version)
        .bind(delivery.delivered_at)
        .execute(&self.pool)
        .await?;
        self.refetch(Collection::Deliveries, delivery.id).await
    }

    async fn delete_delivery(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM deliveries WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_nce(&self, nce: NewNce) -> AppResult<Nce> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO nces (id, delivery_id, title, description, severity, category, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(nce.delivery_id)
        .bind(&nce.title)
        .bind(&nce.description)
        .bind(nce.severity)
        .bind(&nce.category)
        .bind(nce.created_by)
        .execute(&self.pool)
        .await?;
        self.refetch(Collection::Nces, id).await
    }

    async fn get_nce(&self, id: Uuid) -> AppResult<Option<Nce>> {
        self.fetch_by_id(Collection::Nces, id).await
    }

    async fn list_nces(&self, query: &ListQuery) -> AppResult<Page<Nce>> {
        self.fetch_page(query).await
    }

    async fn count_nces(&self, query: &ListQuery) -> AppResult<i64> {
        self.fetch_count(query).await
    }

    async fn save_nce(&self, nce: &Nce) -> AppResult<Nce> {
        sqlx::query(
            r#"
            UPDATE nces
            SET severity = $2, status = $3, category = $4, assigned_to = $5,
                resolved_at = $6, resolution_notes = $7
            WHERE id = $1
            "#,
        )
        .bind(nce.id)
        .bind(nce.severity)
        .bind(nce.status)
        .bind(&nce.category)
        .bind(nce.assigned_to)
        .bind(nce.resolved_at)
        .bind(&nce.resolution_notes)
        .execute(&self.pool)
        .await?;
        self.refetch(Collection::Nces, nce.id).await
    }

    async fn delete_nce(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM nces WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_file(&self, file: NewFile) -> AppResult<FileRecord> {
        let sql = format!(
            "INSERT INTO files (id, filename, storage_key, delivery_id, nce_id, uploaded_at, is_receipt) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {FILE_COLUMNS}"
        );
        let created = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&file.filename)
            .bind(&file.storage_key)
            .bind(file.parent.delivery_id())
            .bind(file.parent.nce_id())
            .bind(Utc::now())
            .bind(file.is_receipt)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn get_file(&self, id: Uuid) -> AppResult<Option<FileRecord>> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE id = $1");
        let file = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(file)
    }

    async fn list_files(&self, parent: FileParent) -> AppResult<Vec<FileRecord>> {
        let column = match parent {
            FileParent::Delivery(_) => "delivery_id",
            FileParent::Nce(_) => "nce_id",
        };
        let id = parent.delivery_id().or(parent.nce_id());
        let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE {column} = $1 ORDER BY uploaded_at, id");
        let files = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(files)
    }

    async fn list_delivery_tree_files(&self, delivery_id: Uuid) -> AppResult<Vec<FileRecord>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files \
             WHERE delivery_id = $1 OR nce_id IN (SELECT id FROM nces WHERE delivery_id = $1)"
        );
        let files = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(delivery_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(files)
    }

    async fn delete_file(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_survey(&self, survey: NewSurvey) -> AppResult<Survey> {
        let now = Utc::now();
        let completed_at = survey.score.map(|_| now);
        let created = sqlx::query_as::<_, Survey>(
            r#"
            INSERT INTO surveys (id, delivery_id, user_id, survey_type, score, comment, sent_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, delivery_id, user_id, survey_type, score, comment, sent_at, completed_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(survey.delivery_id)
        .bind(survey.user_id)
        .bind(survey.survey_type)
        .bind(survey.score)
        .bind(&survey.comment)
        .bind(now)
        .bind(completed_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn list_surveys(&self, query: &ListQuery) -> AppResult<Page<Survey>> {
        self.fetch_page(query).await
    }

    async fn average_score(&self, survey_type: SurveyType) -> AppResult<Option<f64>> {
        let avg = sqlx::query_scalar::<_, Option<f64>>(
            r#"
            SELECT AVG(score)::float8 FROM surveys
            WHERE survey_type = $1 AND score IS NOT NULL AND completed_at IS NOT NULL
            "#,
        )
        .bind(survey_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(avg)
    }

    async fn create_notification(&self, notification: NewNotification) -> AppResult<Notification> {
        let created = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (id, user_id, title, message, type, link)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, title, message, type, is_read, created_at, link
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.notification_type)
        .bind(&notification.link)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn get_notification(&self, id: Uuid) -> AppResult<Option<Notification>> {
        self.fetch_by_id(Collection::Notifications, id).await
    }

    async fn list_notifications(&self, query: &ListQuery) -> AppResult<Page<Notification>> {
        self.fetch_page(query).await
    }

    async fn mark_notification_read(&self, id: Uuid) -> AppResult<Option<Notification>> {
        let updated = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications SET is_read = TRUE
            WHERE id = $1
            RETURNING id, user_id, title, message, type, is_read, created_at, link
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }
}
