use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Application, NewApplication},
    policy::{Action, Resource},
    schema::applications,
    state::AppState,
    status::{self, ApplicationStatus},
    storage::{self, AttachmentKind, UploadedFile},
    utils::json::{optional_text, required, required_text},
};

use super::{
    employees::{presigned, AttachmentUrlResponse},
    forms::FormPayload,
    permit, to_iso,
};

const RESUME_FIELD: &str = "resume";

#[derive(Serialize)]
pub struct ApplicationResponse {
    pub id: i64,
    pub job_posting: i64,
    pub applicant_name: String,
    pub applicant_email: String,
    pub resume: String,
    pub cover_letter: String,
    pub submitted_at: String,
    pub status: String,
}

impl From<Application> for ApplicationResponse {
    fn from(application: Application) -> Self {
        Self {
            id: application.id,
            job_posting: application.job_posting_id,
            applicant_name: application.applicant_name,
            applicant_email: application.applicant_email,
            resume: application.resume,
            cover_letter: application.cover_letter,
            submitted_at: to_iso(application.submitted_at),
            status: application.status,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApplicationFields {
    pub job_posting: Option<i64>,
    pub applicant_name: Option<String>,
    pub applicant_email: Option<String>,
    pub cover_letter: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: Option<String>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = applications)]
struct ApplicationChangeset {
    job_posting_id: Option<i64>,
    applicant_name: Option<String>,
    applicant_email: Option<String>,
    resume: Option<String>,
    cover_letter: Option<String>,
    status: Option<String>,
}

impl ApplicationChangeset {
    fn is_empty(&self) -> bool {
        self.job_posting_id.is_none()
            && self.applicant_name.is_none()
            && self.applicant_email.is_none()
            && self.resume.is_none()
            && self.cover_letter.is_none()
            && self.status.is_none()
    }
}

fn parse_status(raw: Option<&str>) -> AppResult<Option<String>> {
    Ok(raw
        .map(str::parse::<ApplicationStatus>)
        .transpose()?
        .map(|status| status.as_str().to_string()))
}

pub async fn list_applications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ApplicationResponse>>> {
    permit(&user, Resource::Application, Action::List)?;

    let mut conn = state.db()?;
    let rows: Vec<Application> = applications::table
        .order(applications::id.asc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn get_application(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(application_id): Path<i64>,
) -> AppResult<Json<ApplicationResponse>> {
    permit(&user, Resource::Application, Action::Retrieve)?;

    let mut conn = state.db()?;
    let application: Application = applications::table.find(application_id).first(&mut conn)?;
    Ok(Json(application.into()))
}

/// The resume is uploaded first; if the row cannot be written the object is removed again.
pub async fn create_application(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut form: FormPayload,
) -> AppResult<(StatusCode, Json<ApplicationResponse>)> {
    permit(&user, Resource::Application, Action::Create)?;

    let fields: ApplicationFields = form.decode()?;
    let resume = form
        .take_file(RESUME_FIELD)
        .ok_or_else(|| AppError::bad_request("resume is required"))?;

    let job_posting_id = required(fields.job_posting, "job_posting")?;
    let applicant_name = required_text(fields.applicant_name.as_deref(), "applicant_name")?;
    let applicant_email = required_text(fields.applicant_email.as_deref(), "applicant_email")?;
    let status = parse_status(fields.status.as_deref())?
        .unwrap_or_else(|| ApplicationStatus::default().as_str().to_string());

    let key = upload_attachment(&state, AttachmentKind::Resume, RESUME_FIELD, resume).await?;

    let new_application = NewApplication {
        job_posting_id,
        applicant_name,
        applicant_email,
        resume: key.clone(),
        cover_letter: fields.cover_letter.unwrap_or_default(),
        status,
    };

    let inserted = state.db().and_then(|mut conn| {
        diesel::insert_into(applications::table)
            .values(&new_application)
            .get_result::<Application>(&mut conn)
            .map_err(AppError::from)
    });

    match inserted {
        Ok(application) => {
            info!(application_id = application.id, job_posting_id, "application received");
            Ok((StatusCode::CREATED, Json(application.into())))
        }
        Err(err) => {
            discard_object(&state, &key).await;
            Err(err)
        }
    }
}

pub async fn replace_application(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(application_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<ApplicationResponse>> {
    permit(&user, Resource::Application, Action::Update)?;
    let fields: ApplicationFields = form.decode()?;
    let changeset = ApplicationChangeset {
        job_posting_id: Some(required(fields.job_posting, "job_posting")?),
        applicant_name: Some(required_text(fields.applicant_name.as_deref(), "applicant_name")?),
        applicant_email: Some(required_text(
            fields.applicant_email.as_deref(),
            "applicant_email",
        )?),
        resume: None,
        cover_letter: Some(required(fields.cover_letter, "cover_letter")?),
        status: Some(
            status::require::<ApplicationStatus>(fields.status.as_deref(), "status")?
                .as_str()
                .to_string(),
        ),
    };
    write_application(state, application_id, form, changeset).await
}

pub async fn patch_application(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(application_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<ApplicationResponse>> {
    permit(&user, Resource::Application, Action::PartialUpdate)?;
    let fields: ApplicationFields = form.decode()?;
    let changeset = ApplicationChangeset {
        job_posting_id: fields.job_posting,
        applicant_name: optional_text(fields.applicant_name.as_deref(), "applicant_name")?,
        applicant_email: optional_text(fields.applicant_email.as_deref(), "applicant_email")?,
        resume: None,
        cover_letter: fields.cover_letter,
        status: parse_status(fields.status.as_deref())?,
    };
    write_application(state, application_id, form, changeset).await
}

/// Applies an update, swapping in a new resume when the form carries one.
async fn write_application(
    state: AppState,
    application_id: i64,
    mut form: FormPayload,
    mut changeset: ApplicationChangeset,
) -> AppResult<Json<ApplicationResponse>> {
    let existing: Application = {
        let mut conn = state.db()?;
        applications::table.find(application_id).first(&mut conn)?
    };

    if let Some(file) = form.take_file(RESUME_FIELD) {
        let key = upload_attachment(&state, AttachmentKind::Resume, RESUME_FIELD, file).await?;
        changeset.resume = Some(key);
    }

    if changeset.is_empty() {
        return Ok(Json(existing.into()));
    }

    let updated = state.db().and_then(|mut conn| {
        diesel::update(applications::table.find(application_id))
            .set(&changeset)
            .get_result::<Application>(&mut conn)
            .map_err(AppError::from)
    });

    match (updated, changeset.resume.as_deref()) {
        (Ok(application), Some(_)) => {
            discard_object(&state, &existing.resume).await;
            Ok(Json(application.into()))
        }
        (Ok(application), None) => Ok(Json(application.into())),
        (Err(err), Some(new_key)) => {
            discard_object(&state, new_key).await;
            Err(err)
        }
        (Err(err), None) => Err(err),
    }
}

pub async fn update_application_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(application_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<ApplicationResponse>> {
    permit(&user, Resource::Application, Action::UpdateStatus)?;

    let mut conn = state.db()?;
    applications::table
        .find(application_id)
        .first::<Application>(&mut conn)?;

    let request: StatusRequest = form.decode()?;
    let status: ApplicationStatus = status::require(request.status.as_deref(), "status")?;

    let application: Application = diesel::update(applications::table.find(application_id))
        .set(applications::status.eq(status.as_str()))
        .get_result(&mut conn)?;
    info!(application_id, status = %status, "application status updated");

    Ok(Json(application.into()))
}

pub async fn delete_application(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(application_id): Path<i64>,
) -> AppResult<StatusCode> {
    permit(&user, Resource::Application, Action::Destroy)?;

    let removed: Option<Application> = {
        let mut conn = state.db()?;
        diesel::delete(applications::table.find(application_id))
            .get_result(&mut conn)
            .optional()?
    };
    let removed = removed.ok_or_else(AppError::not_found)?;
    discard_object(&state, &removed.resume).await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn resume_url(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(application_id): Path<i64>,
) -> AppResult<Json<AttachmentUrlResponse>> {
    permit(&user, Resource::Application, Action::Retrieve)?;

    let key = {
        let mut conn = state.db()?;
        applications::table
            .find(application_id)
            .select(applications::resume)
            .first::<String>(&mut conn)?
    };

    presigned(&state, &key).await.map(Json)
}

/// An empty part is a 400; a storage failure is logged and reported as a generic 500.
pub(crate) async fn upload_attachment(
    state: &AppState,
    kind: AttachmentKind,
    field: &str,
    file: UploadedFile,
) -> AppResult<String> {
    storage::ensure_not_empty(&file, field).map_err(|err| AppError::bad_request(err.to_string()))?;
    storage::store_attachment(state.storage.as_ref(), kind, file)
        .await
        .map_err(|err| {
            error!(kind = kind.prefix(), error = %err, "attachment upload failed");
            AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "attachment storage failed")
        })
}

pub(crate) async fn discard_object(state: &AppState, key: &str) {
    if let Err(err) = state.storage.delete_object(key).await {
        warn!(key = %key, error = %err, "failed to remove stored attachment");
    }
}
