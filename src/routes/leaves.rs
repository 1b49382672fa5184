use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Leave, NewLeave},
    policy::{Action, Resource},
    schema::leaves,
    state::AppState,
    utils::json::{optional_text, required, required_text},
};

use super::{forms::FormPayload, permit};

#[derive(Serialize)]
pub struct LeaveResponse {
    pub id: i64,
    pub employee: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub leave_type: String,
    pub reason: String,
    pub approved: bool,
}

impl From<Leave> for LeaveResponse {
    fn from(leave: Leave) -> Self {
        Self {
            id: leave.id,
            employee: leave.account_id,
            start_date: leave.start_date,
            end_date: leave.end_date,
            leave_type: leave.leave_type,
            reason: leave.reason,
            approved: leave.approved,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LeaveFields {
    pub employee: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub leave_type: Option<String>,
    pub reason: Option<String>,
    pub approved: Option<bool>,
}

#[derive(AsChangeset)]
#[diesel(table_name = leaves)]
struct LeaveChangeset {
    account_id: Option<i64>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    leave_type: Option<String>,
    reason: Option<String>,
    approved: Option<bool>,
}

impl LeaveChangeset {
    fn is_empty(&self) -> bool {
        self.account_id.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.leave_type.is_none()
            && self.reason.is_none()
            && self.approved.is_none()
    }
}

fn check_period(start: NaiveDate, end: NaiveDate) -> AppResult<()> {
    if start > end {
        return Err(AppError::bad_request(
            "end_date must be on or after start_date",
        ));
    }
    Ok(())
}

fn full_leave(fields: LeaveFields) -> AppResult<NewLeave> {
    let leave = NewLeave {
        account_id: required(fields.employee, "employee")?,
        start_date: required(fields.start_date, "start_date")?,
        end_date: required(fields.end_date, "end_date")?,
        leave_type: required_text(fields.leave_type.as_deref(), "leave_type")?,
        reason: required(fields.reason, "reason")?,
        approved: fields.approved.unwrap_or(false),
    };
    check_period(leave.start_date, leave.end_date)?;
    Ok(leave)
}

pub async fn list_leaves(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<LeaveResponse>>> {
    permit(&user, Resource::Leave, Action::List)?;

    let mut conn = state.db()?;
    let rows: Vec<Leave> = leaves::table.order(leaves::id.asc()).load(&mut conn)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn get_leave(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(leave_id): Path<i64>,
) -> AppResult<Json<LeaveResponse>> {
    permit(&user, Resource::Leave, Action::Retrieve)?;

    let mut conn = state.db()?;
    let leave: Leave = leaves::table.find(leave_id).first(&mut conn)?;
    Ok(Json(leave.into()))
}

pub async fn create_leave(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    form: FormPayload,
) -> AppResult<(StatusCode, Json<LeaveResponse>)> {
    permit(&user, Resource::Leave, Action::Create)?;
    let new_leave = full_leave(form.decode()?)?;

    let mut conn = state.db()?;
    let leave: Leave = diesel::insert_into(leaves::table)
        .values(&new_leave)
        .get_result(&mut conn)?;
    Ok((StatusCode::CREATED, Json(leave.into())))
}

pub async fn replace_leave(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(leave_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<LeaveResponse>> {
    permit(&user, Resource::Leave, Action::Update)?;
    let full = full_leave(form.decode()?)?;
    let changeset = LeaveChangeset {
        account_id: Some(full.account_id),
        start_date: Some(full.start_date),
        end_date: Some(full.end_date),
        leave_type: Some(full.leave_type),
        reason: Some(full.reason),
        approved: Some(full.approved),
    };

    let mut conn = state.db()?;
    let leave: Leave = diesel::update(leaves::table.find(leave_id))
        .set(&changeset)
        .get_result(&mut conn)?;
    Ok(Json(leave.into()))
}

pub async fn patch_leave(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(leave_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<LeaveResponse>> {
    permit(&user, Resource::Leave, Action::PartialUpdate)?;
    let fields: LeaveFields = form.decode()?;
    let changeset = LeaveChangeset {
        account_id: fields.employee,
        start_date: fields.start_date,
        end_date: fields.end_date,
        leave_type: optional_text(fields.leave_type.as_deref(), "leave_type")?,
        reason: fields.reason,
        approved: fields.approved,
    };

    let mut conn = state.db()?;
    let existing: Leave = leaves::table.find(leave_id).first(&mut conn)?;
    if changeset.is_empty() {
        return Ok(Json(existing.into()));
    }
    check_period(
        changeset.start_date.unwrap_or(existing.start_date),
        changeset.end_date.unwrap_or(existing.end_date),
    )?;

    let leave: Leave = diesel::update(leaves::table.find(leave_id))
        .set(&changeset)
        .get_result(&mut conn)?;
    Ok(Json(leave.into()))
}

pub async fn delete_leave(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(leave_id): Path<i64>,
) -> AppResult<StatusCode> {
    permit(&user, Resource::Leave, Action::Destroy)?;

    let mut conn = state.db()?;
    let deleted = diesel::delete(leaves::table.find(leave_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}
