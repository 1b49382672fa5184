use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Applicant, NewApplicant},
    policy::{Action, Resource},
    schema::applicants,
    state::AppState,
    status::{self, ApplicantStatus},
};

use super::{forms::FormPayload, permit, to_iso};

#[derive(Serialize)]
pub struct ApplicantResponse {
    pub id: i64,
    pub status: String,
    pub created_at: String,
}

impl From<Applicant> for ApplicantResponse {
    fn from(applicant: Applicant) -> Self {
        Self {
            id: applicant.id,
            status: applicant.status,
            created_at: to_iso(applicant.created_at),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ApplicantFields {
    pub status: Option<String>,
}

pub async fn list_applicants(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ApplicantResponse>>> {
    permit(&user, Resource::Applicant, Action::List)?;

    let mut conn = state.db()?;
    let rows: Vec<Applicant> = applicants::table
        .order(applicants::id.asc())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn get_applicant(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(applicant_id): Path<i64>,
) -> AppResult<Json<ApplicantResponse>> {
    permit(&user, Resource::Applicant, Action::Retrieve)?;

    let mut conn = state.db()?;
    let applicant: Applicant = applicants::table.find(applicant_id).first(&mut conn)?;
    Ok(Json(applicant.into()))
}

pub async fn create_applicant(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    form: FormPayload,
) -> AppResult<(StatusCode, Json<ApplicantResponse>)> {
    permit(&user, Resource::Applicant, Action::Create)?;
    let fields: ApplicantFields = form.decode()?;
    let status = match fields.status.as_deref() {
        Some(raw) => raw.parse::<ApplicantStatus>()?,
        None => ApplicantStatus::default(),
    };

    let mut conn = state.db()?;
    let applicant: Applicant = diesel::insert_into(applicants::table)
        .values(&NewApplicant {
            status: status.as_str().to_string(),
        })
        .get_result(&mut conn)?;
    Ok((StatusCode::CREATED, Json(applicant.into())))
}

/// `status` is the only writable field, so full and partial updates differ only in whether it
/// may be omitted.
fn write_status(
    state: &AppState,
    applicant_id: i64,
    raw: Option<&str>,
) -> AppResult<Applicant> {
    let mut conn = state.db()?;
    let existing: Applicant = applicants::table.find(applicant_id).first(&mut conn)?;

    let Some(raw) = raw else {
        return Ok(existing);
    };
    let status: ApplicantStatus = raw.parse()?;

    let applicant = diesel::update(applicants::table.find(applicant_id))
        .set(applicants::status.eq(status.as_str()))
        .get_result(&mut conn)?;
    info!(applicant_id, status = %status, "applicant status updated");
    Ok(applicant)
}

pub async fn replace_applicant(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(applicant_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<ApplicantResponse>> {
    permit(&user, Resource::Applicant, Action::Update)?;
    let fields: ApplicantFields = form.decode()?;
    let status: ApplicantStatus = status::require(fields.status.as_deref(), "status")?;
    let applicant = write_status(&state, applicant_id, Some(status.as_str()))?;
    Ok(Json(applicant.into()))
}

pub async fn patch_applicant(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(applicant_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<ApplicantResponse>> {
    permit(&user, Resource::Applicant, Action::PartialUpdate)?;
    let fields: ApplicantFields = form.decode()?;
    let applicant = write_status(&state, applicant_id, fields.status.as_deref())?;
    Ok(Json(applicant.into()))
}

/// Unlike a partial update, a missing status is rejected here.
pub async fn update_applicant_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(applicant_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<ApplicantResponse>> {
    permit(&user, Resource::Applicant, Action::UpdateStatus)?;
    let fields: ApplicantFields = form.decode()?;
    let raw = fields.status.unwrap_or_default();
    let applicant = write_status(&state, applicant_id, Some(raw.as_str()))?;
    Ok(Json(applicant.into()))
}

pub async fn delete_applicant(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(applicant_id): Path<i64>,
) -> AppResult<StatusCode> {
    permit(&user, Resource::Applicant, Action::Destroy)?;

    let mut conn = state.db()?;
    let deleted = diesel::delete(applicants::table.find(applicant_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}
