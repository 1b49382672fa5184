use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{NewPayroll, Payroll},
    policy::{Action, Resource},
    schema::payrolls,
    state::AppState,
    utils::json::required,
};

use super::{forms::FormPayload, permit};

#[derive(Serialize)]
pub struct PayrollResponse {
    pub id: i64,
    pub employee: i64,
    pub payment_date: NaiveDate,
    pub amount: Decimal,
    pub details: String,
}

impl From<Payroll> for PayrollResponse {
    fn from(payroll: Payroll) -> Self {
        Self {
            id: payroll.id,
            employee: payroll.account_id,
            payment_date: payroll.payment_date,
            amount: payroll.amount,
            details: payroll.details,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PayrollFields {
    pub employee: Option<i64>,
    pub payment_date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub details: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = payrolls)]
struct PayrollChangeset {
    account_id: Option<i64>,
    payment_date: Option<NaiveDate>,
    amount: Option<Decimal>,
    details: Option<String>,
}

fn check_amount(amount: Option<Decimal>) -> AppResult<()> {
    match amount {
        Some(value) if value < Decimal::ZERO => {
            Err(AppError::bad_request("amount must not be negative"))
        }
        _ => Ok(()),
    }
}

fn full_payroll(fields: PayrollFields) -> AppResult<NewPayroll> {
    check_amount(fields.amount)?;
    Ok(NewPayroll {
        account_id: required(fields.employee, "employee")?,
        payment_date: required(fields.payment_date, "payment_date")?,
        amount: required(fields.amount, "amount")?,
        details: fields.details.unwrap_or_default(),
    })
}

pub async fn list_payrolls(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<PayrollResponse>>> {
    permit(&user, Resource::Payroll, Action::List)?;

    let mut conn = state.db()?;
    let rows: Vec<Payroll> = payrolls::table.order(payrolls::id.asc()).load(&mut conn)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn get_payroll(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(payroll_id): Path<i64>,
) -> AppResult<Json<PayrollResponse>> {
    permit(&user, Resource::Payroll, Action::Retrieve)?;

    let mut conn = state.db()?;
    let payroll: Payroll = payrolls::table.find(payroll_id).first(&mut conn)?;
    Ok(Json(payroll.into()))
}

pub async fn create_payroll(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    form: FormPayload,
) -> AppResult<(StatusCode, Json<PayrollResponse>)> {
    permit(&user, Resource::Payroll, Action::Create)?;
    let new_payroll = full_payroll(form.decode()?)?;

    let mut conn = state.db()?;
    let payroll: Payroll = diesel::insert_into(payrolls::table)
        .values(&new_payroll)
        .get_result(&mut conn)?;
    Ok((StatusCode::CREATED, Json(payroll.into())))
}

pub async fn replace_payroll(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(payroll_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<PayrollResponse>> {
    permit(&user, Resource::Payroll, Action::Update)?;
    let fields: PayrollFields = form.decode()?;
    let details = required(fields.details.clone(), "details")?;
    let full = full_payroll(fields)?;
    let changeset = PayrollChangeset {
        account_id: Some(full.account_id),
        payment_date: Some(full.payment_date),
        amount: Some(full.amount),
        details: Some(details),
    };

    let mut conn = state.db()?;
    let payroll: Payroll = diesel::update(payrolls::table.find(payroll_id))
        .set(&changeset)
        .get_result(&mut conn)?;
    Ok(Json(payroll.into()))
}

pub async fn patch_payroll(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(payroll_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<PayrollResponse>> {
    permit(&user, Resource::Payroll, Action::PartialUpdate)?;
    let fields: PayrollFields = form.decode()?;
    check_amount(fields.amount)?;
    let changeset = PayrollChangeset {
        account_id: fields.employee,
        payment_date: fields.payment_date,
        amount: fields.amount,
        details: fields.details,
    };

    let mut conn = state.db()?;
    let unchanged = changeset.account_id.is_none()
        && changeset.payment_date.is_none()
        && changeset.amount.is_none()
        && changeset.details.is_none();
    let payroll: Payroll = if unchanged {
        payrolls::table.find(payroll_id).first(&mut conn)?
    } else {
        diesel::update(payrolls::table.find(payroll_id))
            .set(&changeset)
            .get_result(&mut conn)?
    };
    Ok(Json(payroll.into()))
}

pub async fn delete_payroll(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(payroll_id): Path<i64>,
) -> AppResult<StatusCode> {
    permit(&user, Resource::Payroll, Action::Destroy)?;

    let mut conn = state.db()?;
    let deleted = diesel::delete(payrolls::table.find(payroll_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}
