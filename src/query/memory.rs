//! In-memory evaluation of a `ListQuery`, used by `InMemoryRepository`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Filter, ListQuery, RowScope, SortField, SortOrder};
use crate::models::{Delivery, Nce, Notification, Page, Project, Survey, User};

/// Comparable sort value. `Null` sorts before everything, matching
/// `NULLS FIRST` ascending and `NULLS LAST` descending in Postgres.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Null,
    Int(i64),
    Text(String),
    Time(DateTime<Utc>),
}

impl From<Option<DateTime<Utc>>> for SortKey {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(SortKey::Null, SortKey::Time)
    }
}

impl From<Option<&String>> for SortKey {
    fn from(value: Option<&String>) -> Self {
        value.map_or(SortKey::Null, |s| SortKey::Text(s.clone()))
    }
}

/// Listable
///
/// What a row must expose for `ListQuery` to evaluate it without a database.
pub trait Listable: Clone {
    fn id(&self) -> Uuid;
    fn created_at(&self) -> DateTime<Utc>;

    /// Creator, recipient or respondent, depending on the record.
    fn owner_id(&self) -> Option<Uuid> {
        None
    }

    fn project_client_id(&self) -> Option<Uuid> {
        None
    }

    fn search_fields(&self) -> Vec<Option<&str>>;

    /// Filters that do not apply to the record type never match.
    fn matches(&self, _filter: &Filter) -> bool {
        false
    }

    fn sort_key(&self, field: SortField) -> SortKey;
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

impl ListQuery {
    /// Stages 1 to 4 for a single row.
    pub fn admits<T: Listable>(&self, row: &T) -> bool {
        let in_scope = match self.scope {
            RowScope::All => true,
            RowScope::Owner(id) => row.owner_id() == Some(id),
            RowScope::ProjectClient(id) => row.project_client_id() == Some(id),
        };

        in_scope
            && self.search.as_deref().is_none_or(|term| {
                row.search_fields()
                    .into_iter()
                    .any(|field| contains_ci(field, term))
            })
            && self.filters.iter().all(|f| row.matches(f))
            && self.range.contains(row.created_at())
    }

    pub fn count<T: Listable>(&self, rows: &[T]) -> i64 {
        rows.iter().filter(|row| self.admits(*row)).count() as i64
    }

    /// apply
    ///
    /// Runs the whole pipeline over `rows` and returns one page.
    pub fn apply<T: Listable>(&self, rows: impl IntoIterator<Item = T>) -> Page<T> {
        let mut matched: Vec<T> = rows.into_iter().filter(|row| self.admits(row)).collect();
        let total = matched.len() as i64;

        let field = self.sort_field;
        matched.sort_by(|a, b| {
            let ord = a
                .sort_key(field)
                .cmp(&b.sort_key(field))
                .then_with(|| a.id().cmp(&b.id()));
            match self.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let items = matched
            .into_iter()
            .skip(self.skip as usize)
            .take(self.limit as usize)
            .collect();

        Page { total, items }
    }
}

impl Listable for Delivery {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn owner_id(&self) -> Option<Uuid> {
        Some(self.created_by)
    }

    fn project_client_id(&self) -> Option<Uuid> {
        self.client_id
    }

    fn search_fields(&self) -> Vec<Option<&str>> {
        vec![Some(self.title.as_str()), self.description.as_deref()]
    }

    fn matches(&self, filter: &Filter) -> bool {
        match filter {
            Filter::DeliveryStatus(status) => self.status == *status,
            Filter::ProjectId(id) => self.project_id == *id,
            Filter::ProjectName(name) => contains_ci(Some(self.project_name.as_str()), name),
            Filter::ClientEmail(email) => contains_ci(self.client_email.as_deref(), email),
            _ => false,
        }
    }

    fn sort_key(&self, field: SortField) -> SortKey {
        match field {
            SortField::Title => SortKey::Text(self.title.clone()),
            SortField::Status => SortKey::Int(self.status as i64),
            SortField::Version => SortKey::Int(self.version.into()),
            SortField::DeliveredAt => self.delivered_at.into(),
            _ => SortKey::Time(self.created_at),
        }
    }
}

impl Listable for Nce {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn owner_id(&self) -> Option<Uuid> {
        Some(self.created_by)
    }

    fn project_client_id(&self) -> Option<Uuid> {
        self.client_id
    }

    fn search_fields(&self) -> Vec<Option<&str>> {
        vec![Some(self.title.as_str()), Some(self.description.as_str())]
    }

    fn matches(&self, filter: &Filter) -> bool {
        match filter {
            Filter::NceStatus(status) => self.status == *status,
            Filter::Severity(severity) => self.severity == *severity,
            Filter::Category(category) => self.category.as_deref() == Some(category.as_str()),
            Filter::DeliveryId(id) => self.delivery_id == *id,
            Filter::ProjectId(id) => self.project_id == *id,
            Filter::ProjectName(name) => contains_ci(Some(self.project_name.as_str()), name),
            Filter::DeliveryTitle(title) => contains_ci(Some(self.delivery_title.as_str()), title),
            _ => false,
        }
    }

    fn sort_key(&self, field: SortField) -> SortKey {
        match field {
            SortField::Title => SortKey::Text(self.title.clone()),
            SortField::Status => SortKey::Int(self.status as i64),
            SortField::Severity => SortKey::Int(self.severity as i64),
            SortField::Category => self.category.as_ref().into(),
            SortField::ResolvedAt => self.resolved_at.into(),
            _ => SortKey::Time(self.created_at),
        }
    }
}

impl Listable for Project {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn project_client_id(&self) -> Option<Uuid> {
        self.client_id
    }

    fn search_fields(&self) -> Vec<Option<&str>> {
        vec![
            Some(self.name.as_str()),
            self.description.as_deref(),
            self.client_email.as_deref(),
            self.client_name.as_deref(),
        ]
    }

    fn matches(&self, filter: &Filter) -> bool {
        match filter {
            Filter::ClientEmail(email) => contains_ci(self.client_email.as_deref(), email),
            _ => false,
        }
    }

    fn sort_key(&self, field: SortField) -> SortKey {
        match field {
            SortField::Name => SortKey::Text(self.name.clone()),
            _ => SortKey::Time(self.created_at),
        }
    }
}

impl Listable for User {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn owner_id(&self) -> Option<Uuid> {
        Some(self.id)
    }

    fn search_fields(&self) -> Vec<Option<&str>> {
        vec![Some(self.email.as_str()), self.full_name.as_deref()]
    }

    fn matches(&self, filter: &Filter) -> bool {
        match filter {
            Filter::Role(role) => self.role == *role,
            _ => false,
        }
    }

    fn sort_key(&self, field: SortField) -> SortKey {
        match field {
            SortField::Email => SortKey::Text(self.email.clone()),
            SortField::FullName => self.full_name.as_ref().into(),
            SortField::Role => SortKey::Int(self.role as i64),
            _ => SortKey::Time(self.created_at),
        }
    }
}

impl Listable for Survey {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.sent_at
    }

    fn owner_id(&self) -> Option<Uuid> {
        Some(self.user_id)
    }

    fn search_fields(&self) -> Vec<Option<&str>> {
        vec![self.comment.as_deref()]
    }

    fn matches(&self, filter: &Filter) -> bool {
        match filter {
            Filter::SurveyType(kind) => self.survey_type == *kind,
            Filter::DeliveryId(id) => self.delivery_id == *id,
            _ => false,
        }
    }

    fn sort_key(&self, field: SortField) -> SortKey {
        match field {
            SortField::Score => self.score.map_or(SortKey::Null, |s| SortKey::Int(s.into())),
            _ => SortKey::Time(self.sent_at),
        }
    }
}

impl Listable for Notification {
    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn owner_id(&self) -> Option<Uuid> {
        Some(self.user_id)
    }

    fn search_fields(&self) -> Vec<Option<&str>> {
        vec![Some(self.title.as_str()), Some(self.message.as_str())]
    }

    fn matches(&self, filter: &Filter) -> bool {
        match filter {
            Filter::UnreadOnly => !self.is_read,
            _ => false,
        }
    }

    fn sort_key(&self, _field: SortField) -> SortKey {
        SortKey::Time(self.created_at)
    }
}
