pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    models::Account,
    policy::{Actor, Role},
    schema::accounts,
    state::AppState,
};

/// The account behind a valid bearer token, re-read from the store on every request so role and
/// department changes apply immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub account_id: i64,
    pub username: String,
    pub role: Role,
    pub department_id: Option<i64>,
}

impl AuthenticatedUser {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.account_id,
            role: self.role,
            department_id: self.department_id,
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        let mut conn = state.db()?;
        let account = accounts::table
            .find(claims.sub)
            .first::<Account>(&mut conn)
            .optional()?
            .ok_or_else(AppError::unauthorized)?;

        if !account.is_active {
            return Err(AppError::unauthorized());
        }

        let role = account
            .role
            .parse::<Role>()
            .map_err(AppError::internal)?;

        Ok(AuthenticatedUser {
            account_id: account.id,
            username: account.username,
            role,
            department_id: account.department_id,
        })
    }
}
