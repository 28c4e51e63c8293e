//! Scoped list queries.
//!
//! A `ListQuery` is built in fixed stages (scope, search, filters, date range,
//! sort, pagination) and then either rendered to SQL (`sql`) or evaluated over
//! rows held in memory (`memory`). Both renderings share the ordering rules.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{DeliveryStatus, NceStatus, Role, Severity, SurveyType},
    policy::{self, Action, Grant, Resource},
};

pub mod memory;
pub mod sql;

pub use memory::{Listable, SortKey};

/// Hard ceiling for `limit`, whatever the caller asks for.
pub const MAX_LIMIT: i64 = 100;

/// The listable collections. Each maps to one policy resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Clients,
    Projects,
    Deliveries,
    Nces,
    Surveys,
    Notifications,
}

impl Collection {
    pub fn resource(self) -> Resource {
        match self {
            Collection::Users => Resource::User,
            Collection::Clients => Resource::Client,
            Collection::Projects => Resource::Project,
            Collection::Deliveries => Resource::Delivery,
            Collection::Nces => Resource::Nce,
            Collection::Surveys => Resource::Survey,
            Collection::Notifications => Resource::Notification,
        }
    }

    /// Page size when the caller does not send `limit`.
    pub fn default_limit(self) -> i64 {
        match self {
            Collection::Notifications => 20,
            Collection::Clients => 50,
            _ => MAX_LIMIT,
        }
    }

    /// Fields accepted by `sort_by` for this collection (besides `created_at`).
    pub fn sortable(self) -> &'static [SortField] {
        use SortField::*;
        match self {
            Collection::Deliveries => &[CreatedAt, Title, Status, Version, DeliveredAt],
            Collection::Nces => &[CreatedAt, Title, Status, Severity, Category, ResolvedAt],
            Collection::Projects => &[CreatedAt, Name],
            Collection::Clients => &[CreatedAt, Email, FullName],
            Collection::Users => &[CreatedAt, Email, FullName, Role],
            Collection::Surveys => &[CreatedAt, Score],
            Collection::Notifications => &[CreatedAt],
        }
    }
}

/// Row-visibility restriction derived from the actor's Read grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowScope {
    All,
    /// Rows created by (or addressed to) this user.
    Owner(Uuid),
    /// Rows whose project's client is this user.
    ProjectClient(Uuid),
}

/// Structured filters. Exact-match unless the doc says substring; substring
/// filters are case-insensitive.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    DeliveryStatus(DeliveryStatus),
    NceStatus(NceStatus),
    Severity(Severity),
    Category(String),
    SurveyType(SurveyType),
    Role(Role),
    UnreadOnly,
    ProjectId(Uuid),
    DeliveryId(Uuid),
    /// Substring of the parent project's name.
    ProjectName(String),
    /// Substring of the project client's email.
    ClientEmail(String),
    /// Substring of the parent delivery's title.
    DeliveryTitle(String),
}

impl Filter {
    /// Builds a text filter only when the input is non-blank.
    pub fn text(value: Option<&str>, build: fn(String) -> Filter) -> Option<Filter> {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| build(v.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortField {
    CreatedAt,
    Title,
    Name,
    Email,
    FullName,
    Role,
    Status,
    Severity,
    Category,
    Version,
    DeliveredAt,
    ResolvedAt,
    Score,
}

impl SortField {
    /// parse
    ///
    /// Resolves a caller-supplied field name. Anything not sortable for the
    /// collection falls back to `created_at`; this never fails.
    pub fn parse(collection: Collection, name: Option<&str>) -> SortField {
        let field = match name.map(str::trim).unwrap_or_default() {
            "title" => SortField::Title,
            "name" => SortField::Name,
            "email" => SortField::Email,
            "full_name" => SortField::FullName,
            "role" => SortField::Role,
            "status" => SortField::Status,
            "severity" => SortField::Severity,
            "category" => SortField::Category,
            "version" => SortField::Version,
            "delivered_at" => SortField::DeliveredAt,
            "resolved_at" => SortField::ResolvedAt,
            "score" => SortField::Score,
            _ => SortField::CreatedAt,
        };
        if collection.sortable().contains(&field) {
            field
        } else {
            SortField::CreatedAt
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Only a literal `asc` (any case) sorts ascending.
    pub fn parse(value: Option<&str>) -> SortOrder {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }
}

/// DateRange
///
/// Inclusive bounds on the UTC calendar day of `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Parses `YYYY-MM-DD` bounds. Blank values count as absent; anything else
    /// that does not parse is a validation error.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> AppResult<Self> {
        Ok(Self {
            start: parse_day("start_date", start)?,
            end: parse_day("end_date", end)?,
        })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.start.is_none_or(|start| day >= start) && self.end.is_none_or(|end| day <= end)
    }
}

fn parse_day(name: &str, value: Option<&str>) -> AppResult<Option<NaiveDate>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AppError::Validation(format!("Invalid {name} '{raw}', expected YYYY-MM-DD"))),
    }
}

/// ListParams
///
/// Query parameters shared by every list endpoint. Resource-specific filters
/// are extracted separately by each handler.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
pub struct ListParams {
    /// Rows to skip (floored at 0).
    pub skip: Option<i64>,
    /// Page size, clamped to 1..=100.
    pub limit: Option<i64>,
    /// Case-insensitive substring matched against the resource's text fields.
    pub search: Option<String>,
    /// `YYYY-MM-DD`, inclusive.
    pub start_date: Option<String>,
    /// `YYYY-MM-DD`, inclusive.
    pub end_date: Option<String>,
    pub sort_by: Option<String>,
    /// `asc` or `desc` (default).
    pub sort_order: Option<String>,
}

/// ListQuery
///
/// The abstract list request. Stages only ever narrow the row set; the order in
/// which handlers call them mirrors the pipeline but does not change results.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub collection: Collection,
    pub scope: RowScope,
    pub search: Option<String>,
    pub filters: Vec<Filter>,
    pub range: DateRange,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
    pub skip: i64,
    pub limit: i64,
}

impl ListQuery {
    /// An unrestricted query over `collection`. Callers outside the
    /// repositories should go through `scoped`.
    pub fn all(collection: Collection) -> Self {
        Self {
            collection,
            scope: RowScope::All,
            search: None,
            filters: Vec::new(),
            range: DateRange::default(),
            sort_field: SortField::CreatedAt,
            sort_order: SortOrder::Desc,
            skip: 0,
            limit: collection.default_limit(),
        }
    }

    /// scoped
    ///
    /// Stage 1. Derives the base scope from the actor's Read grant; a `Never`
    /// grant is rejected here, before anything touches the store.
    pub fn scoped(actor: &AuthUser, collection: Collection) -> AppResult<Self> {
        let scope = match policy::grant(actor.role, Action::Read, collection.resource()) {
            Grant::Always => RowScope::All,
            Grant::Owner => RowScope::Owner(actor.id),
            Grant::ProjectClient => RowScope::ProjectClient(actor.id),
            Grant::Never => return Err(AppError::forbidden()),
        };

        let mut query = Self::all(collection);
        query.scope = scope;
        if collection == Collection::Clients {
            query.filters.push(Filter::Role(Role::Client));
        }
        Ok(query)
    }

    /// Stage 2. Blank terms are ignored.
    pub fn search(mut self, term: Option<&str>) -> Self {
        self.search = term
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        self
    }

    /// Stage 3. Filters combine with AND.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filter_opt(self, filter: Option<Filter>) -> Self {
        match filter {
            Some(filter) => self.filter(filter),
            None => self,
        }
    }

    /// Stage 4.
    pub fn created_between(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    /// Stage 5. Unknown fields fall back to `created_at`.
    pub fn sort(mut self, sort_by: Option<&str>, sort_order: Option<&str>) -> Self {
        self.sort_field = SortField::parse(self.collection, sort_by);
        self.sort_order = SortOrder::parse(sort_order);
        self
    }

    /// Stage 7. Counting (stage 6) ignores these values.
    pub fn paginate(mut self, skip: Option<i64>, limit: Option<i64>) -> Self {
        self.skip = skip.unwrap_or(0).max(0);
        self.limit = limit
            .unwrap_or(self.collection.default_limit())
            .max(1)
            .min(MAX_LIMIT);
        self
    }

    /// Applies every shared list parameter in pipeline order. Resource filters
    /// are added by the caller with `filter`/`filter_opt`.
    pub fn with_params(self, params: &ListParams) -> AppResult<Self> {
        let range = DateRange::parse(params.start_date.as_deref(), params.end_date.as_deref())?;
        Ok(self
            .search(params.search.as_deref())
            .created_between(range)
            .sort(params.sort_by.as_deref(), params.sort_order.as_deref())
            .paginate(params.skip, params.limit))
    }
}
