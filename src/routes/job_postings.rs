use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{JobPosting, NewJobPosting},
    policy::{Action, Resource},
    schema::job_postings,
    state::AppState,
    utils::json::{optional_text, required, required_text},
};

use super::{forms::FormPayload, permit, to_iso};

#[derive(Serialize)]
pub struct JobPostingResponse {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub department: i64,
    pub created_at: String,
    pub deadline: String,
    pub updated_by: Option<i64>,
}

impl From<JobPosting> for JobPostingResponse {
    fn from(posting: JobPosting) -> Self {
        Self {
            id: posting.id,
            title: posting.title,
            description: posting.description,
            department: posting.department_id,
            created_at: to_iso(posting.created_at),
            deadline: to_iso(posting.deadline),
            updated_by: posting.updated_by,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JobPostingFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub department: Option<i64>,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(AsChangeset)]
#[diesel(table_name = job_postings)]
struct JobPostingChangeset {
    title: Option<String>,
    description: Option<String>,
    department_id: Option<i64>,
    deadline: Option<NaiveDateTime>,
    updated_by: Option<Option<i64>>,
}

fn full_posting(fields: JobPostingFields, editor: i64) -> AppResult<NewJobPosting> {
    Ok(NewJobPosting {
        title: required_text(fields.title.as_deref(), "title")?,
        description: required(fields.description, "description")?,
        department_id: required(fields.department, "department")?,
        deadline: required(fields.deadline, "deadline")?.naive_utc(),
        updated_by: Some(editor),
    })
}

pub async fn list_postings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<JobPostingResponse>>> {
    permit(&user, Resource::JobPosting, Action::List)?;

    let mut conn = state.db()?;
    let rows: Vec<JobPosting> = job_postings::table
        .order(job_postings::id.asc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn get_posting(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(posting_id): Path<i64>,
) -> AppResult<Json<JobPostingResponse>> {
    permit(&user, Resource::JobPosting, Action::Retrieve)?;

    let mut conn = state.db()?;
    let posting: JobPosting = job_postings::table.find(posting_id).first(&mut conn)?;
    Ok(Json(posting.into()))
}

pub async fn create_posting(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    form: FormPayload,
) -> AppResult<(StatusCode, Json<JobPostingResponse>)> {
    permit(&user, Resource::JobPosting, Action::Create)?;
    let new_posting = full_posting(form.decode()?, user.account_id)?;

    let mut conn = state.db()?;
    let posting: JobPosting = diesel::insert_into(job_postings::table)
        .values(&new_posting)
        .get_result(&mut conn)?;
    info!(posting_id = posting.id, created_by = user.account_id, "job posting created");

    Ok((StatusCode::CREATED, Json(posting.into())))
}

pub async fn replace_posting(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(posting_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<JobPostingResponse>> {
    permit(&user, Resource::JobPosting, Action::Update)?;
    let full = full_posting(form.decode()?, user.account_id)?;
    let changeset = JobPostingChangeset {
        title: Some(full.title),
        description: Some(full.description),
        department_id: Some(full.department_id),
        deadline: Some(full.deadline),
        updated_by: Some(full.updated_by),
    };

    let mut conn = state.db()?;
    let posting: JobPosting = diesel::update(job_postings::table.find(posting_id))
        .set(&changeset)
        .get_result(&mut conn)?;
    Ok(Json(posting.into()))
}

pub async fn patch_posting(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(posting_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<JobPostingResponse>> {
    permit(&user, Resource::JobPosting, Action::PartialUpdate)?;
    let fields: JobPostingFields = form.decode()?;
    // Every write records its editor, so the changeset is never empty.
    let changeset = JobPostingChangeset {
        title: optional_text(fields.title.as_deref(), "title")?,
        description: fields.description,
        department_id: fields.department,
        deadline: fields.deadline.map(|value| value.naive_utc()),
        updated_by: Some(Some(user.account_id)),
    };

    let mut conn = state.db()?;
    let posting: JobPosting = diesel::update(job_postings::table.find(posting_id))
        .set(&changeset)
        .get_result(&mut conn)?;
    Ok(Json(posting.into()))
}

pub async fn delete_posting(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(posting_id): Path<i64>,
) -> AppResult<StatusCode> {
    permit(&user, Resource::JobPosting, Action::Destroy)?;

    let mut conn = state.db()?;
    let deleted = diesel::delete(job_postings::table.find(posting_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }
    info!(posting_id, deleted_by = user.account_id, "job posting deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deadline_accepts_rfc3339_and_records_the_editor() {
        let fields: JobPostingFields = serde_json::from_value(json!({
            "title": " Payroll Analyst ",
            "description": "Runs payroll",
            "department": 2,
            "deadline": "2024-10-01T12:00:00+02:00"
        }))
        .unwrap();
        let posting = full_posting(fields, 7).unwrap();
        assert_eq!(posting.title, "Payroll Analyst");
        assert_eq!(posting.deadline.to_string(), "2024-10-01 10:00:00");
        assert_eq!(posting.updated_by, Some(7));
    }

    #[test]
    fn department_is_required() {
        let fields: JobPostingFields = serde_json::from_value(json!({
            "title": "Recruiter",
            "description": "Hires people",
            "deadline": "2024-10-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(
            full_posting(fields, 1).unwrap_err().message(),
            "department is required"
        );
    }
}
