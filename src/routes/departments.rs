use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Account, Department, NewDepartment},
    policy::{self, Action, Actor, Relation, Resource, Scope},
    schema::{accounts, departments},
    state::AppState,
    utils::json::{nullable, optional_text, required_text},
};

use super::{forms::FormPayload, to_iso};

#[derive(Serialize)]
pub struct DepartmentResponse {
    pub id: i64,
    pub name: String,
    pub manager: Option<i64>,
    pub created_at: String,
}

impl From<Department> for DepartmentResponse {
    fn from(department: Department) -> Self {
        Self {
            id: department.id,
            name: department.name,
            manager: department.manager_id,
            created_at: to_iso(department.created_at),
        }
    }
}

#[derive(Serialize)]
pub struct MemberSummary {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub position: Option<String>,
}

impl From<Account> for MemberSummary {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            username: account.username,
            first_name: account.first_name,
            last_name: account.last_name,
            position: account.position,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DepartmentFields {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub manager: Option<Option<i64>>,
}

#[derive(AsChangeset)]
#[diesel(table_name = departments)]
struct DepartmentChangeset {
    name: Option<String>,
    manager_id: Option<Option<i64>>,
}

fn scoped_query(scope: Scope) -> departments::BoxedQuery<'static, diesel::pg::Pg> {
    let query = departments::table.into_boxed();
    match scope {
        Scope::All => query,
        Scope::Department(Some(department_id)) => query.filter(departments::id.eq(department_id)),
        // No department means nothing to see; ids are never negative.
        Scope::Department(None) => query.filter(departments::id.lt(0)),
    }
}

fn own_department_id(actor: &Actor) -> AppResult<i64> {
    actor
        .department_id
        .ok_or_else(|| AppError::not_found_with("No department assigned"))
}

pub async fn list_departments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<DepartmentResponse>>> {
    let actor = user.actor();
    policy::authorize(&actor, Resource::Department, Action::List, Relation::Collection)?;

    let mut conn = state.db()?;
    let rows: Vec<Department> = scoped_query(policy::visibility(&actor, Resource::Department))
        .order(departments::id.asc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(DepartmentResponse::from).collect()))
}

pub async fn get_department(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(department_id): Path<i64>,
) -> AppResult<Json<DepartmentResponse>> {
    let actor = user.actor();
    policy::authorize(&actor, Resource::Department, Action::Retrieve, Relation::Other)?;

    let mut conn = state.db()?;
    let department: Department = scoped_query(policy::visibility(&actor, Resource::Department))
        .filter(departments::id.eq(department_id))
        .first(&mut conn)?;

    Ok(Json(department.into()))
}

pub async fn my_department(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<DepartmentResponse>> {
    let department_id = own_department_id(&user.actor())?;

    let mut conn = state.db()?;
    let department: Department = departments::table
        .find(department_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_with("No department assigned"))?;

    Ok(Json(department.into()))
}

/// Accounts sharing the caller's department; a caller without one sees the other unassigned accounts.
pub async fn department_members(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<MemberSummary>>> {
    let mut conn = state.db()?;
    let query = accounts::table.into_boxed();
    let query = match user.department_id {
        Some(department_id) => query.filter(accounts::department_id.eq(department_id)),
        None => query.filter(accounts::department_id.is_null()),
    };
    let members: Vec<Account> = query.order(accounts::id.asc()).load(&mut conn)?;

    Ok(Json(members.into_iter().map(MemberSummary::from).collect()))
}

pub async fn create_department(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    form: FormPayload,
) -> AppResult<(StatusCode, Json<DepartmentResponse>)> {
    let actor = user.actor();
    policy::authorize(&actor, Resource::Department, Action::Create, Relation::Collection)?;

    let fields: DepartmentFields = form.decode()?;
    let new_department = NewDepartment {
        name: required_text(fields.name.as_deref(), "name")?,
        manager_id: fields.manager.flatten(),
    };

    let mut conn = state.db()?;
    let department: Department = diesel::insert_into(departments::table)
        .values(&new_department)
        .get_result(&mut conn)?;
    info!(department_id = department.id, "department created");

    Ok((StatusCode::CREATED, Json(department.into())))
}

pub async fn replace_department(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(department_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<DepartmentResponse>> {
    let actor = user.actor();
    policy::authorize(&actor, Resource::Department, Action::Update, Relation::Other)?;

    let fields: DepartmentFields = form.decode()?;
    let changeset = DepartmentChangeset {
        name: Some(required_text(fields.name.as_deref(), "name")?),
        manager_id: Some(fields.manager.flatten()),
    };

    let mut conn = state.db()?;
    let department: Department = diesel::update(departments::table.find(department_id))
        .set(&changeset)
        .get_result(&mut conn)?;

    Ok(Json(department.into()))
}

/// A non-null `manager` in the payload takes the reassignment path and ignores every other field.
pub async fn patch_department(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(department_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<DepartmentResponse>> {
    let actor = user.actor();
    policy::authorize(&actor, Resource::Department, Action::PartialUpdate, Relation::Other)?;

    let fields: DepartmentFields = form.decode()?;
    let mut conn = state.db()?;

    if let Some(Some(manager_id)) = fields.manager {
        let department = reassign_manager(&mut conn, department_id, manager_id)?;
        return Ok(Json(department.into()));
    }

    let changeset = DepartmentChangeset {
        name: optional_text(fields.name.as_deref(), "name")?,
        manager_id: fields.manager,
    };

    let department: Department = if changeset.name.is_none() && changeset.manager_id.is_none() {
        departments::table.find(department_id).first(&mut conn)?
    } else {
        diesel::update(departments::table.find(department_id))
            .set(&changeset)
            .get_result(&mut conn)?
    };

    Ok(Json(department.into()))
}

fn reassign_manager(
    conn: &mut PgConnection,
    department_id: i64,
    manager_id: i64,
) -> AppResult<Department> {
    let department: Department = departments::table.find(department_id).first(conn)?;

    let manager_exists: bool = diesel::select(diesel::dsl::exists(
        accounts::table.filter(accounts::id.eq(manager_id)),
    ))
    .get_result(conn)?;
    if !manager_exists {
        return Err(AppError::not_found_with("Manager not found"));
    }

    let updated: Department = diesel::update(departments::table.find(department.id))
        .set(departments::manager_id.eq(Some(manager_id)))
        .get_result(conn)?;
    info!(department_id, manager_id, "department manager reassigned");
    Ok(updated)
}

pub async fn delete_department(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(department_id): Path<i64>,
) -> AppResult<StatusCode> {
    let actor = user.actor();
    policy::authorize(&actor, Resource::Department, Action::Destroy, Relation::Other)?;

    let mut conn = state.db()?;
    let deleted = diesel::delete(departments::table.find(department_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }
    info!(department_id, "department deleted");

    Ok(StatusCode::NO_CONTENT)
}
