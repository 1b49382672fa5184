use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use axum_extra::{headers::Cookie, typed_header::TypedHeader};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use diesel::{prelude::*, PgConnection};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::{Account, NewRefreshToken, RefreshToken},
    policy::Role,
    schema::{accounts, refresh_tokens},
    state::AppState,
};

use super::employees::AccountResponse;

const REFRESH_COOKIE_NAME: &str = "refresh_token";

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let mut conn = state.db()?;

    let account: Account = accounts::table
        .filter(accounts::username.eq(payload.username.trim()))
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

    let valid = password::verify_password(&payload.password, &account.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid || !account.is_active {
        return Err(AppError::unauthorized());
    }

    let (headers, response) = issue_session(&state, &mut conn, &account)?;
    info!(account_id = account.id, "account logged in");
    Ok((headers, Json(response)))
}

pub async fn refresh(
    State(state): State<AppState>,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let cookies = jar.ok_or_else(AppError::unauthorized)?;
    let refresh_value = cookies
        .get(REFRESH_COOKIE_NAME)
        .ok_or_else(AppError::unauthorized)?;

    let hashed = hash_refresh_token(refresh_value);
    let mut conn = state.db()?;
    let now = Utc::now().naive_utc();

    let token: RefreshToken = refresh_tokens::table
        .filter(refresh_tokens::token_hash.eq(&hashed))
        .filter(refresh_tokens::revoked_at.is_null())
        .filter(refresh_tokens::expires_at.gt(now))
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

    diesel::update(refresh_tokens::table.find(token.id))
        .set((
            refresh_tokens::revoked_at.eq(now),
            refresh_tokens::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let account: Account = accounts::table
        .find(token.account_id)
        .first::<Account>(&mut conn)
        .optional()?
        .filter(|account| account.is_active)
        .ok_or_else(AppError::unauthorized)?;

    let (headers, response) = issue_session(&state, &mut conn, &account)?;
    Ok((headers, Json(response)))
}

/// Revokes the presented refresh token, or every live token of the account when none matches.
pub async fn logout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, StatusCode)> {
    let mut conn = state.db()?;
    let now = Utc::now().naive_utc();
    let mut revoked = 0;

    if let Some(value) = jar.as_ref().and_then(|cookies| cookies.get(REFRESH_COOKIE_NAME)) {
        revoked = diesel::update(
            refresh_tokens::table
                .filter(refresh_tokens::token_hash.eq(hash_refresh_token(value)))
                .filter(refresh_tokens::account_id.eq(user.account_id))
                .filter(refresh_tokens::revoked_at.is_null()),
        )
        .set((
            refresh_tokens::revoked_at.eq(now),
            refresh_tokens::updated_at.eq(now),
        ))
        .execute(&mut conn)?;
    }

    if revoked == 0 {
        diesel::update(
            refresh_tokens::table
                .filter(refresh_tokens::account_id.eq(user.account_id))
                .filter(refresh_tokens::revoked_at.is_null()),
        )
        .set((
            refresh_tokens::revoked_at.eq(now),
            refresh_tokens::updated_at.eq(now),
        ))
        .execute(&mut conn)?;
    }

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, clear_refresh_cookie(&state)?);
    Ok((headers, StatusCode::NO_CONTENT))
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<AccountResponse>> {
    let mut conn = state.db()?;
    let account: Account = accounts::table.find(user.account_id).first(&mut conn)?;
    Ok(Json(account.into()))
}

fn issue_session(
    state: &AppState,
    conn: &mut PgConnection,
    account: &Account,
) -> AppResult<(HeaderMap, LoginResponse)> {
    let role = account.role.parse::<Role>().map_err(AppError::internal)?;
    let access_token = state
        .jwt
        .generate_token(account.id, &account.username, role)?;

    let now = Utc::now();
    let refresh_value = generate_refresh_token();
    let expires_at = now + ChronoDuration::days(state.config.refresh_token_expiry_days);

    diesel::insert_into(refresh_tokens::table)
        .values(&NewRefreshToken {
            id: Uuid::new_v4(),
            account_id: account.id,
            token_hash: hash_refresh_token(&refresh_value),
            issued_at: now.naive_utc(),
            expires_at: expires_at.naive_utc(),
        })
        .execute(conn)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        refresh_cookie(state, &refresh_value, expires_at)?,
    );

    Ok((
        headers,
        LoginResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: state.config.jwt_expiry_minutes * 60,
        },
    ))
}

fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn cookie_attributes(state: &AppState, mut parts: Vec<String>) -> AppResult<HeaderValue> {
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Strict".into());
    if state.config.refresh_cookie_secure {
        parts.push("Secure".into());
    }
    if let Some(domain) = &state.config.refresh_cookie_domain {
        parts.push(format!("Domain={domain}"));
    }
    HeaderValue::from_str(&parts.join("; ")).map_err(AppError::internal)
}

fn refresh_cookie(state: &AppState, token: &str, expires_at: DateTime<Utc>) -> AppResult<HeaderValue> {
    let max_age = ChronoDuration::days(state.config.refresh_token_expiry_days).num_seconds();
    cookie_attributes(
        state,
        vec![
            format!("{REFRESH_COOKIE_NAME}={token}"),
            format!("Max-Age={max_age}"),
            format!("Expires={}", expires_at.to_rfc2822()),
        ],
    )
}

fn clear_refresh_cookie(state: &AppState) -> AppResult<HeaderValue> {
    cookie_attributes(
        state,
        vec![
            format!("{REFRESH_COOKIE_NAME}="),
            "Max-Age=0".into(),
            "Expires=Thu, 01 Jan 1970 00:00:00 GMT".into(),
        ],
    )
}
