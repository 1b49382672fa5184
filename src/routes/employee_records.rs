use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{EmployeeRecord, NewEmployeeRecord},
    policy::{Action, Resource},
    schema::employee_records,
    state::AppState,
    utils::json::required,
};

use super::{forms::FormPayload, permit};

#[derive(Serialize)]
pub struct EmployeeRecordResponse {
    pub id: i64,
    pub employee: i64,
    pub contract_type: String,
    pub job_history: String,
    pub current_salary: Decimal,
    pub benefits: String,
}

impl From<EmployeeRecord> for EmployeeRecordResponse {
    fn from(record: EmployeeRecord) -> Self {
        Self {
            id: record.id,
            employee: record.account_id,
            contract_type: record.contract_type,
            job_history: record.job_history,
            current_salary: record.current_salary,
            benefits: record.benefits,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EmployeeRecordFields {
    pub employee: Option<i64>,
    pub contract_type: Option<String>,
    pub job_history: Option<String>,
    pub current_salary: Option<Decimal>,
    pub benefits: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = employee_records)]
struct EmployeeRecordChangeset {
    account_id: Option<i64>,
    contract_type: Option<String>,
    job_history: Option<String>,
    current_salary: Option<Decimal>,
    benefits: Option<String>,
}

impl EmployeeRecordChangeset {
    fn is_empty(&self) -> bool {
        self.account_id.is_none()
            && self.contract_type.is_none()
            && self.job_history.is_none()
            && self.current_salary.is_none()
            && self.benefits.is_none()
    }
}

fn check_salary(salary: Option<Decimal>) -> AppResult<()> {
    match salary {
        Some(value) if value < Decimal::ZERO => {
            Err(AppError::bad_request("current_salary must not be negative"))
        }
        _ => Ok(()),
    }
}

fn full_record(fields: EmployeeRecordFields) -> AppResult<NewEmployeeRecord> {
    check_salary(fields.current_salary)?;
    Ok(NewEmployeeRecord {
        account_id: required(fields.employee, "employee")?,
        contract_type: required(fields.contract_type, "contract_type")?,
        job_history: required(fields.job_history, "job_history")?,
        current_salary: required(fields.current_salary, "current_salary")?,
        benefits: required(fields.benefits, "benefits")?,
    })
}

pub async fn list_records(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<EmployeeRecordResponse>>> {
    permit(&user, Resource::EmployeeRecord, Action::List)?;

    let mut conn = state.db()?;
    let rows: Vec<EmployeeRecord> = employee_records::table
        .order(employee_records::id.asc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn get_record(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(record_id): Path<i64>,
) -> AppResult<Json<EmployeeRecordResponse>> {
    permit(&user, Resource::EmployeeRecord, Action::Retrieve)?;

    let mut conn = state.db()?;
    let record: EmployeeRecord = employee_records::table.find(record_id).first(&mut conn)?;
    Ok(Json(record.into()))
}

pub async fn create_record(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    form: FormPayload,
) -> AppResult<(StatusCode, Json<EmployeeRecordResponse>)> {
    permit(&user, Resource::EmployeeRecord, Action::Create)?;
    let new_record = full_record(form.decode()?)?;

    let mut conn = state.db()?;
    let record: EmployeeRecord = diesel::insert_into(employee_records::table)
        .values(&new_record)
        .get_result(&mut conn)?;

    Ok((StatusCode::CREATED, Json(record.into())))
}

pub async fn replace_record(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(record_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<EmployeeRecordResponse>> {
    permit(&user, Resource::EmployeeRecord, Action::Update)?;
    let full = full_record(form.decode()?)?;
    let changeset = EmployeeRecordChangeset {
        account_id: Some(full.account_id),
        contract_type: Some(full.contract_type),
        job_history: Some(full.job_history),
        current_salary: Some(full.current_salary),
        benefits: Some(full.benefits),
    };

    let mut conn = state.db()?;
    let record: EmployeeRecord = diesel::update(employee_records::table.find(record_id))
        .set(&changeset)
        .get_result(&mut conn)?;
    Ok(Json(record.into()))
}

pub async fn patch_record(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(record_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<EmployeeRecordResponse>> {
    permit(&user, Resource::EmployeeRecord, Action::PartialUpdate)?;
    let fields: EmployeeRecordFields = form.decode()?;
    check_salary(fields.current_salary)?;
    let changeset = EmployeeRecordChangeset {
        account_id: fields.employee,
        contract_type: fields.contract_type,
        job_history: fields.job_history,
        current_salary: fields.current_salary,
        benefits: fields.benefits,
    };

    let mut conn = state.db()?;
    let record: EmployeeRecord = if changeset.is_empty() {
        employee_records::table.find(record_id).first(&mut conn)?
    } else {
        diesel::update(employee_records::table.find(record_id))
            .set(&changeset)
            .get_result(&mut conn)?
    };
    Ok(Json(record.into()))
}

pub async fn delete_record(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(record_id): Path<i64>,
) -> AppResult<StatusCode> {
    permit(&user, Resource::EmployeeRecord, Action::Destroy)?;

    let mut conn = state.db()?;
    let deleted = diesel::delete(employee_records::table.find(record_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_record_names_the_first_missing_field() {
        let fields: EmployeeRecordFields = serde_json::from_value(json!({
            "employee": 4,
            "contract_type": "permanent",
            "job_history": "",
            "benefits": "medical"
        }))
        .unwrap();
        let err = full_record(fields).unwrap_err();
        assert_eq!(err.message(), "current_salary is required");
    }

    #[test]
    fn salary_accepts_strings_and_rejects_negatives() {
        let fields: EmployeeRecordFields =
            serde_json::from_value(json!({ "current_salary": "-1.00" })).unwrap();
        assert!(check_salary(fields.current_salary).is_err());

        let fields: EmployeeRecordFields =
            serde_json::from_value(json!({ "current_salary": "52000.50" })).unwrap();
        assert!(check_salary(fields.current_salary).is_ok());
    }

    #[test]
    fn negative_zero_salary_counts_as_zero() {
        let fields: EmployeeRecordFields =
            serde_json::from_value(json!({ "current_salary": "-0.00" })).unwrap();
        assert!(check_salary(fields.current_salary).is_ok());
    }
}
