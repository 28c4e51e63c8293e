use axum::{Json, extract::State};

use crate::{
    AppState,
    auth::AuthUser,
    error::AppResult,
    models::{DashboardStats, NceStatus, SurveyType},
    policy::{self, Action, Ownership, Resource},
    query::{Collection, Filter, ListQuery},
};

fn round2(value: Option<f64>) -> f64 {
    value.map(|v| (v * 100.0).round() / 100.0).unwrap_or(0.0)
}

/// get_dashboard_stats
///
/// [Authenticated Route] Counters are scoped like the matching list endpoints,
/// so a producer's totals only cover its own records. Survey averages are
/// global.
#[utoipa::path(
    get,
    path = "/dashboard/stats",
    responses((status = 200, description = "Dashboard counters", body = DashboardStats))
)]
pub async fn get_dashboard_stats(
    actor: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DashboardStats>> {
    policy::authorize(&actor, Action::Read, Resource::Dashboard, &Ownership::none())?;

    let deliveries = ListQuery::scoped(&actor, Collection::Deliveries)?;
    let nces = ListQuery::scoped(&actor, Collection::Nces)?;
    let open_nces = nces.clone().filter(Filter::NceStatus(NceStatus::Open));

    let stats = DashboardStats {
        total_deliveries: state.repo.count_deliveries(&deliveries).await?,
        total_nces: state.repo.count_nces(&nces).await?,
        open_nces: state.repo.count_nces(&open_nces).await?,
        avg_nps: round2(state.repo.average_score(SurveyType::Nps).await?),
        avg_csat: round2(state.repo.average_score(SurveyType::Csat).await?),
    };

    Ok(Json(stats))
}
