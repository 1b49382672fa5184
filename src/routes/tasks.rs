use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{NewTask, NewTaskComment, Task, TaskAssignee, TaskComment},
    policy::{Action, Resource},
    schema::{task_assignees, task_comments, tasks},
    state::AppState,
    status::{self, TaskPriority, TaskStatus},
    utils::json::{nullable, optional_text, required, required_text},
};

use super::{forms::FormPayload, permit, to_iso};

#[derive(Serialize)]
pub struct TaskResponse {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub due_date: Option<NaiveDate>,
    pub department: Option<i64>,
    pub assignees: Vec<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskResponse {
    fn new(task: Task, assignees: Vec<i64>) -> Self {
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            status: task.status,
            priority: task.priority,
            due_date: task.due_date,
            department: task.department_id,
            assignees,
            created_at: to_iso(task.created_at),
            updated_at: to_iso(task.updated_at),
        }
    }
}

#[derive(Serialize)]
pub struct CommentResponse {
    pub id: i64,
    pub task: i64,
    pub author: i64,
    pub comment: String,
    pub created_at: String,
}

impl From<TaskComment> for CommentResponse {
    fn from(comment: TaskComment) -> Self {
        Self {
            id: comment.id,
            task: comment.task_id,
            author: comment.author_id,
            comment: comment.comment,
            created_at: to_iso(comment.created_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TaskFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub department: Option<Option<i64>>,
    pub assignees: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
pub struct CommentFields {
    pub comment: Option<String>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = tasks)]
struct TaskChangeset {
    title: Option<String>,
    description: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    due_date: Option<Option<NaiveDate>>,
    department_id: Option<Option<i64>>,
}

impl TaskChangeset {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.department_id.is_none()
    }
}

fn parse_vocabulary<T>(raw: Option<&str>) -> AppResult<Option<String>>
where
    T: std::str::FromStr<Err = status::InvalidValue> + std::fmt::Display,
{
    Ok(raw.map(str::parse::<T>).transpose()?.map(|v| v.to_string()))
}

fn assignees_of(conn: &mut PgConnection, task_ids: &[i64]) -> AppResult<HashMap<i64, Vec<i64>>> {
    let rows: Vec<TaskAssignee> = task_assignees::table
        .filter(task_assignees::task_id.eq_any(task_ids))
        .order((task_assignees::task_id.asc(), task_assignees::account_id.asc()))
        .load(conn)?;

    let mut grouped: HashMap<i64, Vec<i64>> = HashMap::new();
    for row in rows {
        grouped.entry(row.task_id).or_default().push(row.account_id);
    }
    Ok(grouped)
}

fn replace_assignees(conn: &mut PgConnection, task_id: i64, account_ids: &[i64]) -> AppResult<()> {
    diesel::delete(task_assignees::table.filter(task_assignees::task_id.eq(task_id)))
        .execute(conn)?;

    let mut unique = account_ids.to_vec();
    unique.sort_unstable();
    unique.dedup();
    let rows: Vec<TaskAssignee> = unique
        .into_iter()
        .map(|account_id| TaskAssignee {
            task_id,
            account_id,
        })
        .collect();
    if !rows.is_empty() {
        diesel::insert_into(task_assignees::table)
            .values(&rows)
            .execute(conn)?;
    }
    Ok(())
}

fn load_task(conn: &mut PgConnection, task_id: i64) -> AppResult<TaskResponse> {
    let task: Task = tasks::table.find(task_id).first(conn)?;
    let assignees = assignees_of(conn, &[task_id])?
        .remove(&task_id)
        .unwrap_or_default();
    Ok(TaskResponse::new(task, assignees))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<TaskResponse>>> {
    permit(&user, Resource::Task, Action::List)?;

    let mut conn = state.db()?;
    let rows: Vec<Task> = tasks::table.order(tasks::id.asc()).load(&mut conn)?;
    let ids: Vec<i64> = rows.iter().map(|task| task.id).collect();
    let mut assignees = assignees_of(&mut conn, &ids)?;

    let response = rows
        .into_iter()
        .map(|task| {
            let members = assignees.remove(&task.id).unwrap_or_default();
            TaskResponse::new(task, members)
        })
        .collect();
    Ok(Json(response))
}

pub async fn get_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(task_id): Path<i64>,
) -> AppResult<Json<TaskResponse>> {
    permit(&user, Resource::Task, Action::Retrieve)?;

    let mut conn = state.db()?;
    load_task(&mut conn, task_id).map(Json)
}

pub async fn create_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    form: FormPayload,
) -> AppResult<(StatusCode, Json<TaskResponse>)> {
    permit(&user, Resource::Task, Action::Create)?;
    let fields: TaskFields = form.decode()?;

    let new_task = NewTask {
        title: required_text(fields.title.as_deref(), "title")?,
        description: fields.description.unwrap_or_default(),
        status: parse_vocabulary::<TaskStatus>(fields.status.as_deref())?
            .unwrap_or_else(|| TaskStatus::default().to_string()),
        priority: parse_vocabulary::<TaskPriority>(fields.priority.as_deref())?
            .unwrap_or_else(|| TaskPriority::default().to_string()),
        due_date: fields.due_date.flatten(),
        department_id: fields.department.flatten(),
    };
    let assignees = fields.assignees.unwrap_or_default();

    let mut conn = state.db()?;
    let response = conn.transaction::<TaskResponse, AppError, _>(|conn| {
        let task: Task = diesel::insert_into(tasks::table)
            .values(&new_task)
            .get_result(conn)?;
        replace_assignees(conn, task.id, &assignees)?;
        load_task(conn, task.id)
    })?;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn replace_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(task_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<TaskResponse>> {
    permit(&user, Resource::Task, Action::Update)?;
    let fields: TaskFields = form.decode()?;

    let changeset = TaskChangeset {
        title: Some(required_text(fields.title.as_deref(), "title")?),
        description: Some(required(fields.description, "description")?),
        status: Some(
            status::require::<TaskStatus>(fields.status.as_deref(), "status")?.to_string(),
        ),
        priority: Some(
            status::require::<TaskPriority>(fields.priority.as_deref(), "priority")?.to_string(),
        ),
        due_date: Some(fields.due_date.flatten()),
        department_id: Some(fields.department.flatten()),
    };
    let assignees = Some(fields.assignees.unwrap_or_default());

    write_task(&state, task_id, changeset, assignees).map(Json)
}

pub async fn patch_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(task_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<TaskResponse>> {
    permit(&user, Resource::Task, Action::PartialUpdate)?;
    let fields: TaskFields = form.decode()?;

    let changeset = TaskChangeset {
        title: optional_text(fields.title.as_deref(), "title")?,
        description: fields.description,
        status: parse_vocabulary::<TaskStatus>(fields.status.as_deref())?,
        priority: parse_vocabulary::<TaskPriority>(fields.priority.as_deref())?,
        due_date: fields.due_date,
        department_id: fields.department,
    };

    write_task(&state, task_id, changeset, fields.assignees).map(Json)
}

fn write_task(
    state: &AppState,
    task_id: i64,
    changeset: TaskChangeset,
    assignees: Option<Vec<i64>>,
) -> AppResult<TaskResponse> {
    let mut conn = state.db()?;
    conn.transaction::<TaskResponse, AppError, _>(|conn| {
        tasks::table.find(task_id).select(tasks::id).first::<i64>(conn)?;

        if !changeset.is_empty() {
            diesel::update(tasks::table.find(task_id))
                .set((&changeset, tasks::updated_at.eq(Utc::now().naive_utc())))
                .execute(conn)?;
        }
        if let Some(account_ids) = assignees.as_deref() {
            replace_assignees(conn, task_id, account_ids)?;
        }
        load_task(conn, task_id)
    })
}

pub async fn delete_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(task_id): Path<i64>,
) -> AppResult<StatusCode> {
    permit(&user, Resource::Task, Action::Destroy)?;

    let mut conn = state.db()?;
    let deleted = diesel::delete(tasks::table.find(task_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_comments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(task_id): Path<i64>,
) -> AppResult<Json<Vec<CommentResponse>>> {
    permit(&user, Resource::Task, Action::Retrieve)?;

    let mut conn = state.db()?;
    tasks::table.find(task_id).select(tasks::id).first::<i64>(&mut conn)?;
    let comments: Vec<TaskComment> = task_comments::table
        .filter(task_comments::task_id.eq(task_id))
        .order(task_comments::id.asc())
        .load(&mut conn)?;

    Ok(Json(comments.into_iter().map(Into::into).collect()))
}

pub async fn add_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(task_id): Path<i64>,
    form: FormPayload,
) -> AppResult<(StatusCode, Json<CommentResponse>)> {
    permit(&user, Resource::Task, Action::PartialUpdate)?;
    let fields: CommentFields = form.decode()?;
    let comment = required_text(fields.comment.as_deref(), "comment")?;

    let mut conn = state.db()?;
    tasks::table.find(task_id).select(tasks::id).first::<i64>(&mut conn)?;
    let created: TaskComment = diesel::insert_into(task_comments::table)
        .values(&NewTaskComment {
            task_id,
            author_id: user.account_id,
            comment,
        })
        .get_result(&mut conn)?;

    Ok((StatusCode::CREATED, Json(created.into())))
}
