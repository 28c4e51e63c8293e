use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use super::load_delivery;
use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{CreateSurveyRequest, NewSurvey, Page, Survey, SurveyType},
    policy::{self, Action, Ownership, Resource},
    query::{Collection, Filter, ListParams, ListQuery},
};

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct SurveyFilter {
    pub survey_type: Option<SurveyType>,
    pub delivery_id: Option<Uuid>,
}

fn check_score(survey_type: SurveyType, score: Option<i32>) -> AppResult<()> {
    let (min, max) = survey_type.score_range();
    match score {
        Some(s) if !(min..=max).contains(&s) => Err(AppError::Validation(format!(
            "{survey_type} score must be between {min} and {max}"
        ))),
        _ => Ok(()),
    }
}

/// create_survey
///
/// [Authenticated Route] Records a satisfaction survey about a delivery the
/// caller can see. NPS scores run 0-10, CSAT 1-5.
#[utoipa::path(
    post,
    path = "/surveys",
    request_body = CreateSurveyRequest,
    responses(
        (status = 200, description = "Survey recorded", body = Survey),
        (status = 400, description = "Score out of range"),
        (status = 403, description = "Delivery not visible to the caller"),
        (status = 404, description = "Delivery not found")
    )
)]
pub async fn create_survey(
    actor: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateSurveyRequest>,
) -> AppResult<Json<Survey>> {
    policy::authorize(&actor, Action::Create, Resource::Survey, &Ownership::none())?;
    check_score(payload.survey_type, payload.score)?;

    let delivery = load_delivery(state.repo.as_ref(), payload.delivery_id).await?;
    policy::authorize(&actor, Action::Read, Resource::Delivery, &Ownership::from(&delivery))?;

    let survey = state
        .repo
        .create_survey(NewSurvey {
            delivery_id: delivery.id,
            user_id: actor.id,
            survey_type: payload.survey_type,
            score: payload.score,
            comment: payload.comment.filter(|c| !c.trim().is_empty()),
        })
        .await?;

    tracing::info!(survey_id = %survey.id, delivery_id = %delivery.id, "Survey recorded");
    Ok(Json(survey))
}

/// list_surveys
///
/// [Authenticated Route] Admin and Quality see every survey; everyone else only
/// their own responses.
#[utoipa::path(
    get,
    path = "/surveys",
    params(ListParams, SurveyFilter),
    responses((status = 200, description = "Surveys", body = Page<Survey>))
)]
pub async fn list_surveys(
    actor: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    Query(filter): Query<SurveyFilter>,
) -> AppResult<Json<Page<Survey>>> {
    let query = ListQuery::scoped(&actor, Collection::Surveys)?
        .with_params(&params)?
        .filter_opt(filter.survey_type.map(Filter::SurveyType))
        .filter_opt(filter.delivery_id.map(Filter::DeliveryId));

    Ok(Json(state.repo.list_surveys(&query).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_are_checked_against_the_survey_scale() {
        assert!(check_score(SurveyType::Nps, Some(0)).is_ok());
        assert!(check_score(SurveyType::Nps, Some(10)).is_ok());
        assert!(check_score(SurveyType::Nps, Some(11)).is_err());
        assert!(check_score(SurveyType::Csat, Some(0)).is_err());
        assert!(check_score(SurveyType::Csat, Some(5)).is_ok());
        assert!(check_score(SurveyType::Csat, None).is_ok());
    }
}
