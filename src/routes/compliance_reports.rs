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
    models::{ComplianceReport, NewComplianceReport},
    policy::{Action, Resource},
    schema::compliance_reports,
    state::AppState,
    storage::AttachmentKind,
    utils::json::{optional_text, required_text},
};

use super::{
    applications::{discard_object, upload_attachment},
    employees::{presigned, AttachmentUrlResponse},
    forms::FormPayload,
    permit, to_iso,
};

const FILE_FIELD: &str = "file";

#[derive(Serialize)]
pub struct ComplianceReportResponse {
    pub id: i64,
    pub report_name: String,
    pub generated_on: String,
    pub file: String,
}

impl From<ComplianceReport> for ComplianceReportResponse {
    fn from(report: ComplianceReport) -> Self {
        Self {
            id: report.id,
            report_name: report.report_name,
            generated_on: to_iso(report.generated_on),
            file: report.file,
        }
    }
}

/// `generated_on` is not accepted; it is fixed when the row is inserted.
#[derive(Debug, Deserialize)]
pub struct ComplianceReportFields {
    pub report_name: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = compliance_reports)]
struct ComplianceReportChangeset {
    report_name: Option<String>,
    file: Option<String>,
}

pub async fn list_reports(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ComplianceReportResponse>>> {
    permit(&user, Resource::ComplianceReport, Action::List)?;

    let mut conn = state.db()?;
    let rows: Vec<ComplianceReport> = compliance_reports::table
        .order(compliance_reports::id.asc())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn get_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(report_id): Path<i64>,
) -> AppResult<Json<ComplianceReportResponse>> {
    permit(&user, Resource::ComplianceReport, Action::Retrieve)?;

    let mut conn = state.db()?;
    let report: ComplianceReport = compliance_reports::table.find(report_id).first(&mut conn)?;
    Ok(Json(report.into()))
}

pub async fn create_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut form: FormPayload,
) -> AppResult<(StatusCode, Json<ComplianceReportResponse>)> {
    permit(&user, Resource::ComplianceReport, Action::Create)?;

    let fields: ComplianceReportFields = form.decode()?;
    let report_name = required_text(fields.report_name.as_deref(), "report_name")?;
    let file = form
        .take_file(FILE_FIELD)
        .ok_or_else(|| AppError::bad_request("file is required"))?;

    let key = upload_attachment(&state, AttachmentKind::ComplianceReport, FILE_FIELD, file).await?;

    let new_report = NewComplianceReport {
        report_name,
        file: key.clone(),
    };
    let inserted = state.db().and_then(|mut conn| {
        diesel::insert_into(compliance_reports::table)
            .values(&new_report)
            .get_result::<ComplianceReport>(&mut conn)
            .map_err(AppError::from)
    });

    match inserted {
        Ok(report) => {
            info!(report_id = report.id, "compliance report stored");
            Ok((StatusCode::CREATED, Json(report.into())))
        }
        Err(err) => {
            discard_object(&state, &key).await;
            Err(err)
        }
    }
}

pub async fn replace_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(report_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<ComplianceReportResponse>> {
    permit(&user, Resource::ComplianceReport, Action::Update)?;
    let fields: ComplianceReportFields = form.decode()?;
    let report_name = required_text(fields.report_name.as_deref(), "report_name")?;
    write_report(state, report_id, form, Some(report_name)).await
}

pub async fn patch_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(report_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<ComplianceReportResponse>> {
    permit(&user, Resource::ComplianceReport, Action::PartialUpdate)?;
    let fields: ComplianceReportFields = form.decode()?;
    let report_name = optional_text(fields.report_name.as_deref(), "report_name")?;
    write_report(state, report_id, form, report_name).await
}

async fn write_report(
    state: AppState,
    report_id: i64,
    mut form: FormPayload,
    report_name: Option<String>,
) -> AppResult<Json<ComplianceReportResponse>> {
    let existing: ComplianceReport = {
        let mut conn = state.db()?;
        compliance_reports::table.find(report_id).first(&mut conn)?
    };

    let new_key = match form.take_file(FILE_FIELD) {
        Some(file) => Some(
            upload_attachment(&state, AttachmentKind::ComplianceReport, FILE_FIELD, file).await?,
        ),
        None => None,
    };

    if report_name.is_none() && new_key.is_none() {
        return Ok(Json(existing.into()));
    }

    let changeset = ComplianceReportChangeset {
        report_name,
        file: new_key.clone(),
    };
    let updated = state.db().and_then(|mut conn| {
        diesel::update(compliance_reports::table.find(report_id))
            .set(&changeset)
            .get_result::<ComplianceReport>(&mut conn)
            .map_err(AppError::from)
    });

    match (updated, new_key) {
        (Ok(report), Some(_)) => {
            discard_object(&state, &existing.file).await;
            Ok(Json(report.into()))
        }
        (Ok(report), None) => Ok(Json(report.into())),
        (Err(err), Some(key)) => {
            discard_object(&state, &key).await;
            Err(err)
        }
        (Err(err), None) => Err(err),
    }
}

pub async fn delete_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(report_id): Path<i64>,
) -> AppResult<StatusCode> {
    permit(&user, Resource::ComplianceReport, Action::Destroy)?;

    let removed: Option<ComplianceReport> = {
        let mut conn = state.db()?;
        diesel::delete(compliance_reports::table.find(report_id))
            .get_result(&mut conn)
            .optional()?
    };
    let removed = removed.ok_or_else(AppError::not_found)?;
    discard_object(&state, &removed.file).await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn report_file_url(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(report_id): Path<i64>,
) -> AppResult<Json<AttachmentUrlResponse>> {
    permit(&user, Resource::ComplianceReport, Action::Retrieve)?;

    let key = {
        let mut conn = state.db()?;
        compliance_reports::table
            .find(report_id)
            .select(compliance_reports::file)
            .first::<String>(&mut conn)?
    };

    presigned(&state, &key).await.map(Json)
}
