use std::ops::RangeInclusive;

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
    models::{NewPerformanceReview, PerformanceReview},
    policy::{Action, Resource},
    schema::performance_reviews,
    state::AppState,
    utils::json::{nullable, required},
};

use super::{forms::FormPayload, permit};

const RATING_SCALE: RangeInclusive<i32> = 1..=5;

#[derive(Serialize)]
pub struct PerformanceReviewResponse {
    pub id: i64,
    pub employee: i64,
    pub reviewer: Option<i64>,
    pub review_date: NaiveDate,
    pub comments: String,
    pub rating: i32,
}

impl From<PerformanceReview> for PerformanceReviewResponse {
    fn from(review: PerformanceReview) -> Self {
        Self {
            id: review.id,
            employee: review.account_id,
            reviewer: review.reviewer_id,
            review_date: review.review_date,
            comments: review.comments,
            rating: review.rating,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PerformanceReviewFields {
    pub employee: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub reviewer: Option<Option<i64>>,
    pub review_date: Option<NaiveDate>,
    pub comments: Option<String>,
    pub rating: Option<i32>,
}

#[derive(AsChangeset)]
#[diesel(table_name = performance_reviews)]
struct PerformanceReviewChangeset {
    account_id: Option<i64>,
    reviewer_id: Option<Option<i64>>,
    review_date: Option<NaiveDate>,
    comments: Option<String>,
    rating: Option<i32>,
}

fn check_rating(rating: Option<i32>) -> AppResult<()> {
    match rating {
        Some(value) if !RATING_SCALE.contains(&value) => Err(AppError::bad_request(format!(
            "rating must be between {} and {}",
            RATING_SCALE.start(),
            RATING_SCALE.end()
        ))),
        _ => Ok(()),
    }
}

fn full_review(fields: PerformanceReviewFields) -> AppResult<NewPerformanceReview> {
    check_rating(fields.rating)?;
    Ok(NewPerformanceReview {
        account_id: required(fields.employee, "employee")?,
        reviewer_id: fields.reviewer.flatten(),
        review_date: required(fields.review_date, "review_date")?,
        comments: required(fields.comments, "comments")?,
        rating: required(fields.rating, "rating")?,
    })
}

pub async fn list_reviews(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<PerformanceReviewResponse>>> {
    permit(&user, Resource::PerformanceReview, Action::List)?;

    let mut conn = state.db()?;
    let rows: Vec<PerformanceReview> = performance_reviews::table
        .order(performance_reviews::id.asc())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

pub async fn get_review(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(review_id): Path<i64>,
) -> AppResult<Json<PerformanceReviewResponse>> {
    permit(&user, Resource::PerformanceReview, Action::Retrieve)?;

    let mut conn = state.db()?;
    let review: PerformanceReview = performance_reviews::table.find(review_id).first(&mut conn)?;
    Ok(Json(review.into()))
}

pub async fn create_review(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    form: FormPayload,
) -> AppResult<(StatusCode, Json<PerformanceReviewResponse>)> {
    permit(&user, Resource::PerformanceReview, Action::Create)?;
    let new_review = full_review(form.decode()?)?;

    let mut conn = state.db()?;
    let review: PerformanceReview = diesel::insert_into(performance_reviews::table)
        .values(&new_review)
        .get_result(&mut conn)?;
    Ok((StatusCode::CREATED, Json(review.into())))
}

pub async fn replace_review(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(review_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<PerformanceReviewResponse>> {
    permit(&user, Resource::PerformanceReview, Action::Update)?;
    let full = full_review(form.decode()?)?;
    let changeset = PerformanceReviewChangeset {
        account_id: Some(full.account_id),
        reviewer_id: Some(full.reviewer_id),
        review_date: Some(full.review_date),
        comments: Some(full.comments),
        rating: Some(full.rating),
    };

    let mut conn = state.db()?;
    let review: PerformanceReview = diesel::update(performance_reviews::table.find(review_id))
        .set(&changeset)
        .get_result(&mut conn)?;
    Ok(Json(review.into()))
}

pub async fn patch_review(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(review_id): Path<i64>,
    form: FormPayload,
) -> AppResult<Json<PerformanceReviewResponse>> {
    permit(&user, Resource::PerformanceReview, Action::PartialUpdate)?;
    let fields: PerformanceReviewFields = form.decode()?;
    check_rating(fields.rating)?;
    let changeset = PerformanceReviewChangeset {
        account_id: fields.employee,
        reviewer_id: fields.reviewer,
        review_date: fields.review_date,
        comments: fields.comments,
        rating: fields.rating,
    };

    let mut conn = state.db()?;
    let unchanged = changeset.account_id.is_none()
        && changeset.reviewer_id.is_none()
        && changeset.review_date.is_none()
        && changeset.comments.is_none()
        && changeset.rating.is_none();
    let review: PerformanceReview = if unchanged {
        performance_reviews::table.find(review_id).first(&mut conn)?
    } else {
        diesel::update(performance_reviews::table.find(review_id))
            .set(&changeset)
            .get_result(&mut conn)?
    };
    Ok(Json(review.into()))
}

pub async fn delete_review(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(review_id): Path<i64>,
) -> AppResult<StatusCode> {
    permit(&user, Resource::PerformanceReview, Action::Destroy)?;

    let mut conn = state.db()?;
    let deleted = diesel::delete(performance_reviews::table.find(review_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratings_outside_one_to_five_are_rejected() {
        for bad in [0, 6, -1] {
            let err = check_rating(Some(bad)).unwrap_err();
            assert_eq!(err.message(), "rating must be between 1 and 5");
        }
        for good in 1..=5 {
            assert!(check_rating(Some(good)).is_ok());
        }
    }
}
