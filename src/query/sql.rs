//! Postgres rendering of a `ListQuery`.
//!
//! Every collection has a fixed FROM clause with stable aliases:
//! `d` deliveries, `n` nces, `p` projects, `c` the project's client user,
//! `u` users, `s` surveys, `nt` notifications.

use sqlx::{Postgres, QueryBuilder};

use super::{Collection, Filter, ListQuery, RowScope, SortField, SortOrder};

const DELIVERY_COLUMNS: &str = "d.id, d.project_id, d.title, d.description, d.status, d.version, \
     d.created_by, d.created_at, d.delivered_at, p.name AS project_name, p.client_id, \
     c.email AS client_email";

const NCE_COLUMNS: &str = "n.id, n.delivery_id, n.title, n.description, n.severity, n.status, \
     n.category, n.created_by, n.assigned_to, n.created_at, n.resolved_at, n.resolution_notes, \
     d.title AS delivery_title, d.project_id, p.name AS project_name, p.client_id";

const PROJECT_COLUMNS: &str = "p.id, p.name, p.description, p.client_id, p.created_at, \
     p.updated_at, c.email AS client_email, c.full_name AS client_name";

const USER_COLUMNS: &str = "u.id, u.email, u.full_name, u.role, u.is_active, u.created_at";

const SURVEY_COLUMNS: &str = "s.id, s.delivery_id, s.user_id, s.survey_type, s.score, s.comment, \
     s.sent_at, s.completed_at";

const NOTIFICATION_COLUMNS: &str =
    "nt.id, nt.user_id, nt.title, nt.message, nt.type, nt.is_read, nt.created_at, nt.link";

impl Collection {
    pub(crate) fn from_clause(self) -> &'static str {
        match self {
            Collection::Deliveries => {
                "deliveries d JOIN projects p ON p.id = d.project_id \
                 LEFT JOIN users c ON c.id = p.client_id"
            }
            Collection::Nces => {
                "nces n JOIN deliveries d ON d.id = n.delivery_id \
                 JOIN projects p ON p.id = d.project_id"
            }
            Collection::Projects => "projects p LEFT JOIN users c ON c.id = p.client_id",
            Collection::Users | Collection::Clients => "users u",
            Collection::Surveys => "surveys s",
            Collection::Notifications => "notifications nt",
        }
    }

    pub(crate) fn columns(self) -> &'static str {
        match self {
            Collection::Deliveries => DELIVERY_COLUMNS,
            Collection::Nces => NCE_COLUMNS,
            Collection::Projects => PROJECT_COLUMNS,
            Collection::Users | Collection::Clients => USER_COLUMNS,
            Collection::Surveys => SURVEY_COLUMNS,
            Collection::Notifications => NOTIFICATION_COLUMNS,
        }
    }

    /// Alias of the row's own table.
    pub(crate) fn alias(self) -> &'static str {
        match self {
            Collection::Deliveries => "d",
            Collection::Nces => "n",
            Collection::Projects => "p",
            Collection::Users | Collection::Clients => "u",
            Collection::Surveys => "s",
            Collection::Notifications => "nt",
        }
    }

    fn created_column(self) -> &'static str {
        match self {
            Collection::Deliveries => "d.created_at",
            Collection::Nces => "n.created_at",
            Collection::Projects => "p.created_at",
            Collection::Users | Collection::Clients => "u.created_at",
            Collection::Surveys => "s.sent_at",
            Collection::Notifications => "nt.created_at",
        }
    }

    fn search_columns(self) -> &'static [&'static str] {
        match self {
            Collection::Deliveries => &["d.title", "d.description"],
            Collection::Nces => &["n.title", "n.description"],
            Collection::Projects => &["p.name", "p.description", "c.email", "c.full_name"],
            Collection::Users | Collection::Clients => &["u.email", "u.full_name"],
            Collection::Surveys => &["s.comment"],
            Collection::Notifications => &["nt.title", "nt.message"],
        }
    }

    fn owner_column(self) -> Option<&'static str> {
        match self {
            Collection::Deliveries => Some("d.created_by"),
            Collection::Nces => Some("n.created_by"),
            Collection::Surveys => Some("s.user_id"),
            Collection::Notifications => Some("nt.user_id"),
            Collection::Users | Collection::Clients => Some("u.id"),
            Collection::Projects => None,
        }
    }

    fn project_client_column(self) -> Option<&'static str> {
        match self {
            Collection::Deliveries | Collection::Nces | Collection::Projects => Some("p.client_id"),
            _ => None,
        }
    }

    fn sort_column(self, field: SortField) -> &'static str {
        let column = match (self, field) {
            (Collection::Deliveries, SortField::Title) => "d.title",
            (Collection::Deliveries, SortField::Status) => "d.status",
            (Collection::Deliveries, SortField::Version) => "d.version",
            (Collection::Deliveries, SortField::DeliveredAt) => "d.delivered_at",
            (Collection::Nces, SortField::Title) => "n.title",
            (Collection::Nces, SortField::Status) => "n.status",
            (Collection::Nces, SortField::Severity) => "n.severity",
            (Collection::Nces, SortField::Category) => "n.category",
            (Collection::Nces, SortField::ResolvedAt) => "n.resolved_at",
            (Collection::Projects, SortField::Name) => "p.name",
            (Collection::Users | Collection::Clients, SortField::Email) => "u.email",
            (Collection::Users | Collection::Clients, SortField::FullName) => "u.full_name",
            (Collection::Users, SortField::Role) => "u.role",
            (Collection::Surveys, SortField::Score) => "s.score",
            _ => "",
        };
        if column.is_empty() {
            self.created_column()
        } else {
            column
        }
    }
}

/// `SELECT <columns> FROM <joins>`, shared by list and single-row reads.
pub fn select_from(collection: Collection) -> String {
    format!("SELECT {} FROM {}", collection.columns(), collection.from_clause())
}

/// Wraps a search term for ILIKE, escaping its own wildcards.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn filter_column(collection: Collection, filter: &Filter) -> Option<&'static str> {
    use Collection as C;
    let column = match (filter, collection) {
        (Filter::DeliveryStatus(_), C::Deliveries) => "d.status",
        (Filter::NceStatus(_), C::Nces) => "n.status",
        (Filter::Severity(_), C::Nces) => "n.severity",
        (Filter::Category(_), C::Nces) => "n.category",
        (Filter::SurveyType(_), C::Surveys) => "s.survey_type",
        (Filter::Role(_), C::Users | C::Clients) => "u.role",
        (Filter::UnreadOnly, C::Notifications) => "nt.is_read",
        (Filter::ProjectId(_), C::Deliveries | C::Nces) => "d.project_id",
        (Filter::DeliveryId(_), C::Nces) => "n.delivery_id",
        (Filter::DeliveryId(_), C::Surveys) => "s.delivery_id",
        (Filter::ProjectName(_), C::Deliveries | C::Nces) => "p.name",
        (Filter::ClientEmail(_), C::Deliveries | C::Projects) => "c.email",
        (Filter::DeliveryTitle(_), C::Nces) => "d.title",
        _ => return None,
    };
    Some(column)
}

fn push_filter(qb: &mut QueryBuilder<'static, Postgres>, collection: Collection, filter: &Filter) {
    // A filter that does not apply to the collection matches nothing, same as
    // the in-memory evaluation.
    let Some(column) = filter_column(collection, filter) else {
        qb.push(" AND FALSE");
        return;
    };

    qb.push(format!(" AND {column}"));
    match filter {
        Filter::DeliveryStatus(v) => qb.push(" = ").push_bind(*v),
        Filter::NceStatus(v) => qb.push(" = ").push_bind(*v),
        Filter::Severity(v) => qb.push(" = ").push_bind(*v),
        Filter::SurveyType(v) => qb.push(" = ").push_bind(*v),
        Filter::Role(v) => qb.push(" = ").push_bind(*v),
        Filter::Category(v) => qb.push(" = ").push_bind(v.clone()),
        Filter::ProjectId(v) | Filter::DeliveryId(v) => qb.push(" = ").push_bind(*v),
        Filter::UnreadOnly => qb.push(" = FALSE"),
        Filter::ProjectName(v) | Filter::ClientEmail(v) | Filter::DeliveryTitle(v) => {
            qb.push(" ILIKE ").push_bind(like_pattern(v))
        }
    };
}

fn push_conditions(qb: &mut QueryBuilder<'static, Postgres>, query: &ListQuery) {
    let collection = query.collection;
    qb.push(" WHERE TRUE");

    // 1. Scope
    let scoped = match query.scope {
        RowScope::All => None,
        RowScope::Owner(id) => Some((collection.owner_column(), id)),
        RowScope::ProjectClient(id) => Some((collection.project_client_column(), id)),
    };
    match scoped {
        None => {}
        Some((Some(column), id)) => {
            qb.push(format!(" AND {column} = ")).push_bind(id);
        }
        Some((None, _)) => {
            qb.push(" AND FALSE");
        }
    }

    // 2. Search: OR across the collection's text fields.
    if let Some(term) = &query.search {
        let pattern = like_pattern(term);
        qb.push(" AND (");
        for (i, column) in collection.search_columns().iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push(format!("{column} ILIKE ")).push_bind(pattern.clone());
        }
        qb.push(")");
    }

    // 3. Filters
    for filter in &query.filters {
        push_filter(qb, collection, filter);
    }

    // 4. Date range on the UTC day
    let created = collection.created_column();
    if let Some(start) = query.range.start {
        qb.push(format!(" AND ({created} AT TIME ZONE 'UTC')::date >= "))
            .push_bind(start);
    }
    if let Some(end) = query.range.end {
        qb.push(format!(" AND ({created} AT TIME ZONE 'UTC')::date <= "))
            .push_bind(end);
    }
}

/// count_sql
///
/// Stage 6: the filtered, unpaginated row count.
pub fn count_sql(query: &ListQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT COUNT(*) FROM {}",
        query.collection.from_clause()
    ));
    push_conditions(&mut qb, query);
    qb
}

/// select_sql
///
/// The full page query. Ties are broken by id in the same direction so that
/// consecutive pages never overlap.
pub fn select_sql(query: &ListQuery) -> QueryBuilder<'static, Postgres> {
    let collection = query.collection;
    let mut qb = QueryBuilder::new(select_from(collection));
    push_conditions(&mut qb, query);

    let column = collection.sort_column(query.sort_field);
    let alias = collection.alias();
    match query.sort_order {
        SortOrder::Asc => qb.push(format!(" ORDER BY {column} ASC NULLS FIRST, {alias}.id ASC")),
        SortOrder::Desc => qb.push(format!(" ORDER BY {column} DESC NULLS LAST, {alias}.id DESC")),
    };

    qb.push(" LIMIT ").push_bind(query.limit);
    qb.push(" OFFSET ").push_bind(query.skip);
    qb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{NceStatus, Role},
        query::DateRange,
    };
    use uuid::Uuid;

    #[test]
    fn producer_scope_filters_on_creator() {
        let mut q = ListQuery::all(Collection::Deliveries);
        q.scope = RowScope::Owner(Uuid::new_v4());
        let sql = count_sql(&q).into_sql();
        assert!(sql.starts_with("SELECT COUNT(*) FROM deliveries d"));
        assert!(sql.contains("AND d.created_by = $1"));
    }

    #[test]
    fn client_scope_goes_through_the_project() {
        let mut q = ListQuery::all(Collection::Nces);
        q.scope = RowScope::ProjectClient(Uuid::new_v4());
        let sql = select_sql(&q).into_sql();
        assert!(sql.contains("JOIN projects p ON p.id = d.project_id"));
        assert!(sql.contains("AND p.client_id = $1"));
    }

    #[test]
    fn scope_without_a_column_matches_nothing() {
        let mut q = ListQuery::all(Collection::Surveys);
        q.scope = RowScope::ProjectClient(Uuid::new_v4());
        assert!(count_sql(&q).into_sql().contains("AND FALSE"));
    }

    #[test]
    fn search_is_an_or_over_text_fields() {
        let q = ListQuery::all(Collection::Projects).search(Some("acme"));
        let sql = count_sql(&q).into_sql();
        assert!(sql.contains(
            "AND (p.name ILIKE $1 OR p.description ILIKE $2 OR c.email ILIKE $3 OR c.full_name ILIKE $4)"
        ));
    }

    #[test]
    fn filters_and_dates_are_anded() {
        let q = ListQuery::all(Collection::Nces)
            .filter(Filter::NceStatus(NceStatus::Open))
            .filter(Filter::DeliveryTitle("alpha".into()))
            .created_between(DateRange::parse(Some("2024-01-01"), Some("2024-01-31")).unwrap());
        let sql = count_sql(&q).into_sql();
        assert!(sql.contains("AND n.status = $1 AND d.title ILIKE $2"));
        assert!(sql.contains("AND (n.created_at AT TIME ZONE 'UTC')::date >= $3"));
        assert!(sql.contains("AND (n.created_at AT TIME ZONE 'UTC')::date <= $4"));
    }

    #[test]
    fn misapplied_filter_matches_nothing() {
        let q = ListQuery::all(Collection::Projects).filter(Filter::Role(Role::Client));
        assert!(count_sql(&q).into_sql().contains("AND FALSE"));
    }

    #[test]
    fn order_and_page_come_last() {
        let q = ListQuery::all(Collection::Deliveries)
            .sort(Some("delivered_at"), Some("asc"))
            .paginate(Some(20), Some(10));
        let sql = select_sql(&q).into_sql();
        assert!(sql.ends_with(
            "ORDER BY d.delivered_at ASC NULLS FIRST, d.id ASC LIMIT $1 OFFSET $2"
        ));
    }

    #[test]
    fn surveys_sort_created_at_by_sent_at() {
        let q = ListQuery::all(Collection::Surveys);
        assert!(select_sql(&q).into_sql().contains("ORDER BY s.sent_at DESC NULLS LAST, s.id DESC"));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }
}
