use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{NaiveDate, Utc};
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::{Account, NewAccount},
    policy::{self, Action, Actor, Relation, Resource, Role, Scope},
    schema::accounts,
    state::AppState,
    storage::{self, AttachmentKind, UploadedFile, PRESIGNED_URL_EXPIRY_SECONDS},
    utils::json::{nullable, optional_text, required_text},
};

use super::{forms::FormPayload, to_iso};

const PROFILE_IMAGE_FIELD: &str = "profile_image";

#[derive(Serialize)]
pub struct AccountResponse {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub position: Option<String>,
    pub role: String,
    pub department: Option<i64>,
    pub profile_image: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_warning: Option<String>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            username: account.username,
            first_name: account.first_name,
            last_name: account.last_name,
            email: account.email,
            phone: account.phone,
            address: account.address,
            date_of_birth: account.date_of_birth,
            position: account.position,
            role: account.role,
            department: account.department_id,
            profile_image: account.profile_image,
            is_active: account.is_active,
            created_at: to_iso(account.created_at),
            updated_at: to_iso(account.updated_at),
            attachment_warning: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AccountFields {
    pub username: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub date_of_birth: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub position: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub department: Option<Option<i64>>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = accounts)]
struct AccountChangeset {
    username: Option<String>,
    password_hash: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<Option<String>>,
    address: Option<Option<String>>,
    date_of_birth: Option<Option<NaiveDate>>,
    position: Option<Option<String>>,
    department_id: Option<Option<i64>>,
    role: Option<String>,
    is_active: Option<bool>,
}

/// Outcome of the second step of an account write: attaching the profile image.
///
/// The account row is already committed when this runs, so a failure here is reported alongside
/// the saved record instead of undoing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentOutcome {
    NotRequested,
    Stored(String),
    Failed(String),
}

impl AttachmentOutcome {
    fn warning(&self) -> Option<String> {
        match self {
            AttachmentOutcome::Failed(reason) => Some(format!(
                "account saved but profile image was not stored: {reason}"
            )),
            _ => None,
        }
    }
}

fn validate_email(email: &str) -> AppResult<()> {
    if !email.is_empty() && !email.contains('@') {
        return Err(AppError::bad_request("email must be a valid address"));
    }
    Ok(())
}

fn ensure_may_assign_role(actor: &Actor, fields: &AccountFields) -> AppResult<()> {
    if fields.role.is_some() || fields.is_active.is_some() {
        policy::authorize(actor, Resource::Account, Action::AssignRole, Relation::Other)?;
    }
    Ok(())
}

fn take_profile_image(form: &mut FormPayload) -> AppResult<Option<UploadedFile>> {
    let Some(file) = form.take_file(PROFILE_IMAGE_FIELD) else {
        return Ok(None);
    };
    storage::ensure_profile_image(&file).map_err(|err| AppError::bad_request(err.to_string()))?;
    Ok(Some(file))
}

fn scoped_query(scope: Scope) -> accounts::BoxedQuery<'static, diesel::pg::Pg> {
    let query = accounts::table.into_boxed();
    match scope {
        Scope::All => query,
        Scope::Department(Some(department_id)) => {
            query.filter(accounts::department_id.eq(department_id))
        }
        Scope::Department(None) => query.filter(accounts::department_id.is_null()),
    }
}

fn load_visible(conn: &mut PgConnection, actor: &Actor, account_id: i64) -> AppResult<Account> {
    let scope = policy::visibility(actor, Resource::Account);
    scoped_query(scope)
        .filter(accounts::id.eq(account_id))
        .first::<Account>(conn)
        .map_err(AppError::from)
}

/// Anonymous callers get an empty list rather than an error.
pub async fn list_accounts(
    State(state): State<AppState>,
    user: Option<AuthenticatedUser>,
) -> AppResult<Json<Vec<AccountResponse>>> {
    let Some(user) = user else {
        return Ok(Json(Vec::new()));
    };
    let actor = user.actor();
    policy::authorize(&actor, Resource::Account, Action::List, Relation::Collection)?;

    let mut conn = state.db()?;
    let rows: Vec<Account> = scoped_query(policy::visibility(&actor, Resource::Account))
        .order(accounts::id.asc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(AccountResponse::from).collect()))
}

pub async fn get_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(account_id): Path<i64>,
) -> AppResult<Json<AccountResponse>> {
    let actor = user.actor();
    policy::authorize(
        &actor,
        Resource::Account,
        Action::Retrieve,
        actor.relation_to_account(account_id),
    )?;

    let mut conn = state.db()?;
    let account = load_visible(&mut conn, &actor, account_id)?;
    Ok(Json(account.into()))
}

pub async fn create_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut form: FormPayload,
) -> AppResult<(StatusCode, Json<AccountResponse>)> {
    let actor = user.actor();
    policy::authorize(&actor, Resource::Account, Action::Create, Relation::Collection)?;

    let fields: AccountFields = form.decode()?;
    let image = take_profile_image(&mut form)?;

    let username = required_text(fields.username.as_deref(), "username")?;
    let raw_password = fields
        .password
        .as_deref()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::bad_request("password is required"))?;
    let email = fields.email.unwrap_or_default().trim().to_string();
    validate_email(&email)?;

    let new_account = NewAccount {
        username,
        first_name: fields.first_name.unwrap_or_default().trim().to_string(),
        last_name: fields.last_name.unwrap_or_default().trim().to_string(),
        email,
        password_hash: password::hash_password(raw_password)?,
        phone: fields.phone.flatten(),
        address: fields.address.flatten(),
        date_of_birth: fields.date_of_birth.flatten(),
        position: fields.position.flatten(),
        role: fields.role.unwrap_or(Role::Employee).as_str().to_string(),
        department_id: fields.department.flatten(),
        is_active: fields.is_active.unwrap_or(true),
    };

    let account: Account = {
        let mut conn = state.db()?;
        diesel::insert_into(accounts::table)
            .values(&new_account)
            .get_result(&mut conn)?
    };
    info!(account_id = account.id, created_by = actor.id, "account created");

    let response = finish_account_write(&state, account, image).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn replace_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(account_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<AccountResponse>> {
    update_account(state, user, account_id, form, Action::Update).await
}

pub async fn patch_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(account_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<AccountResponse>> {
    update_account(state, user, account_id, form, Action::PartialUpdate).await
}

async fn update_account(
    state: AppState,
    user: AuthenticatedUser,
    account_id: i64,
    mut form: FormPayload,
    action: Action,
) -> AppResult<Json<AccountResponse>> {
    let actor = user.actor();
    policy::authorize(
        &actor,
        Resource::Account,
        action,
        actor.relation_to_account(account_id),
    )?;

    let fields: AccountFields = form.decode()?;
    ensure_may_assign_role(&actor, &fields)?;
    let image = take_profile_image(&mut form)?;

    if action == Action::Update {
        for (present, name) in [
            (fields.username.is_some(), "username"),
            (fields.first_name.is_some(), "first_name"),
            (fields.last_name.is_some(), "last_name"),
            (fields.email.is_some(), "email"),
        ] {
            if !present {
                return Err(AppError::bad_request(format!("{name} is required")));
            }
        }
    }

    let email = fields.email.as_deref().map(|value| value.trim().to_string());
    if let Some(email) = email.as_deref() {
        validate_email(email)?;
    }

    let password_hash = match fields.password.as_deref() {
        Some(raw) if !raw.is_empty() => Some(password::hash_password(raw)?),
        Some(_) => return Err(AppError::bad_request("password must not be empty")),
        None => None,
    };

    let changeset = AccountChangeset {
        username: optional_text(fields.username.as_deref(), "username")?,
        password_hash,
        first_name: fields.first_name.map(|value| value.trim().to_string()),
        last_name: fields.last_name.map(|value| value.trim().to_string()),
        email,
        phone: fields.phone,
        address: fields.address,
        date_of_birth: fields.date_of_birth,
        position: fields.position,
        department_id: fields.department,
        role: fields.role.map(|role| role.as_str().to_string()),
        is_active: fields.is_active,
    };

    let account: Account = {
        let mut conn = state.db()?;
        let existing: Account = accounts::table.find(account_id).first(&mut conn)?;
        if changeset_is_empty(&changeset) {
            existing
        } else {
            diesel::update(accounts::table.find(account_id))
                .set((&changeset, accounts::updated_at.eq(Utc::now().naive_utc())))
                .get_result(&mut conn)?
        }
    };

    let response = finish_account_write(&state, account, image).await?;
    Ok(Json(response))
}

fn changeset_is_empty(changeset: &AccountChangeset) -> bool {
    changeset.username.is_none()
        && changeset.password_hash.is_none()
        && changeset.first_name.is_none()
        && changeset.last_name.is_none()
        && changeset.email.is_none()
        && changeset.phone.is_none()
        && changeset.address.is_none()
        && changeset.date_of_birth.is_none()
        && changeset.position.is_none()
        && changeset.department_id.is_none()
        && changeset.role.is_none()
        && changeset.is_active.is_none()
}

async fn finish_account_write(
    state: &AppState,
    account: Account,
    image: Option<UploadedFile>,
) -> AppResult<AccountResponse> {
    let outcome = match image {
        Some(file) => attach_profile_image(state, &account, file).await,
        None => AttachmentOutcome::NotRequested,
    };

    let account = match &outcome {
        AttachmentOutcome::Stored(_) => {
            let mut conn = state.db()?;
            accounts::table.find(account.id).first(&mut conn)?
        }
        _ => account,
    };

    let mut response = AccountResponse::from(account);
    response.attachment_warning = outcome.warning();
    Ok(response)
}

/// Step two of an account write. Never fails the request; the outcome says what happened.
pub async fn attach_profile_image(
    state: &AppState,
    account: &Account,
    file: UploadedFile,
) -> AttachmentOutcome {
    let key = match storage::store_attachment(
        state.storage.as_ref(),
        AttachmentKind::ProfileImage,
        file,
    )
    .await
    {
        Ok(key) => key,
        Err(err) => {
            warn!(account_id = account.id, error = %err, "profile image upload failed");
            return AttachmentOutcome::Failed("upload failed".to_string());
        }
    };

    let recorded = state.db().and_then(|mut conn| {
        diesel::update(accounts::table.find(account.id))
            .set((
                accounts::profile_image.eq(Some(key.as_str())),
                accounts::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(&mut conn)
            .map_err(AppError::from)
    });

    if let Err(err) = recorded {
        warn!(
            account_id = account.id,
            key = %key,
            error = %err.message(),
            "failed to record profile image"
        );
        if let Err(err) = state.storage.delete_object(&key).await {
            warn!(key = %key, error = %err, "failed to remove orphaned profile image");
        }
        return AttachmentOutcome::Failed("could not record image".to_string());
    }

    if let Some(previous) = account.profile_image.as_deref() {
        if previous != key {
            if let Err(err) = state.storage.delete_object(previous).await {
                warn!(key = %previous, error = %err, "failed to remove replaced profile image");
            }
        }
    }

    AttachmentOutcome::Stored(key)
}

pub async fn delete_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(account_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let actor = user.actor();
    policy::authorize(
        &actor,
        Resource::Account,
        Action::Destroy,
        actor.relation_to_account(account_id),
    )?;

    let removed: Option<Account> = {
        let mut conn = state.db()?;
        diesel::delete(accounts::table.find(account_id))
            .get_result(&mut conn)
            .optional()?
    };
    let Some(removed) = removed else {
        return Err(AppError::not_found());
    };
    info!(account_id, deleted_by = actor.id, "account deleted");

    if let Some(key) = removed.profile_image.as_deref() {
        if let Err(err) = state.storage.delete_object(key).await {
            warn!(key = %key, error = %err, "failed to remove profile image of deleted account");
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct AttachmentUrlResponse {
    pub url: String,
    pub expires_in: u64,
}

pub async fn profile_image_url(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(account_id): Path<i64>,
) -> AppResult<Json<AttachmentUrlResponse>> {
    let actor = user.actor();
    policy::authorize(
        &actor,
        Resource::Account,
        Action::Retrieve,
        actor.relation_to_account(account_id),
    )?;

    let key = {
        let mut conn = state.db()?;
        load_visible(&mut conn, &actor, account_id)?
            .profile_image
            .ok_or_else(|| AppError::not_found_with("no profile image"))?
    };

    presigned(&state, &key).await.map(Json)
}

pub(crate) async fn presigned(state: &AppState, key: &str) -> AppResult<AttachmentUrlResponse> {
    let url = state
        .storage
        .presign_get_object(key, Duration::from_secs(PRESIGNED_URL_EXPIRY_SECONDS))
        .await
        .map_err(|err| AppError::internal(format!("failed to generate attachment URL: {err}")))?;
    Ok(AttachmentUrlResponse {
        url,
        expires_in: PRESIGNED_URL_EXPIRY_SECONDS,
    })
}
