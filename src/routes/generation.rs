use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    generation::{self, JobDetails, JobDetailsInput, JobPostInput},
    state::AppState,
};

use super::forms::FormPayload;

const JOB_POST_FIELDS: [&str; 6] = [
    "title",
    "description",
    "qualifications",
    "specifications",
    "location",
    "job_type",
];
const JOB_DETAILS_FIELDS: [&str; 3] = ["title", "qualifications", "experience"];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub post_content: String,
}

fn has_text(object: &Map<String, Value>, field: &str) -> bool {
    matches!(object.get(field), Some(Value::String(value)) if !value.trim().is_empty())
}

fn job_post_input(body: &Value) -> AppResult<JobPostInput> {
    let job = match body.get("job") {
        Some(Value::Object(job)) if !job.is_empty() => job,
        _ => return Err(AppError::bad_request("No job data provided")),
    };
    if !JOB_POST_FIELDS.iter().all(|field| has_text(job, field)) {
        return Err(AppError::bad_request("All job fields are required."));
    }
    serde_json::from_value(Value::Object(job.clone()))
        .map_err(|_| AppError::bad_request("All job fields are required."))
}

fn job_details_input(body: &Value) -> AppResult<JobDetailsInput> {
    let missing = || AppError::bad_request("Title, experience and qualifications are required.");
    let object = body.as_object().ok_or_else(missing)?;
    if !JOB_DETAILS_FIELDS.iter().all(|field| has_text(object, field)) {
        return Err(missing());
    }
    serde_json::from_value(body.clone()).map_err(|_| missing())
}

pub async fn generate_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    form: FormPayload,
) -> AppResult<Json<PostResponse>> {
    let job = job_post_input(&form.data)?;
    tracing::info!(account_id = user.account_id, title = %job.title, "generating job post");

    let post_content = generation::generate_post(state.generator.as_ref(), &job).await?;
    Ok(Json(PostResponse { post_content }))
}

pub async fn generate_job_details(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    form: FormPayload,
) -> AppResult<Json<JobDetails>> {
    let input = job_details_input(&form.data)?;
    tracing::info!(account_id = user.account_id, title = %input.title, "generating job details");

    let details = generation::generate_job_details(state.generator.as_ref(), &input).await?;
    Ok(Json(details))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_job() -> Value {
        json!({
            "title": "Site Engineer",
            "description": "Supervise works",
            "qualifications": "BSc Civil",
            "specifications": "Full site ownership",
            "location": "Nairobi",
            "job_type": "Full-time"
        })
    }

    #[test]
    fn missing_job_object_is_reported() {
        let err = job_post_input(&json!({})).unwrap_err();
        assert_eq!(err.message(), "No job data provided");
        let err = job_post_input(&json!({ "job": {} })).unwrap_err();
        assert_eq!(err.message(), "No job data provided");
    }

    #[test]
    fn every_job_field_is_required() {
        for field in JOB_POST_FIELDS {
            let mut job = full_job();
            job[field] = json!("  ");
            let err = job_post_input(&json!({ "job": job })).unwrap_err();
            assert_eq!(err.message(), "All job fields are required.");
        }
        let input = job_post_input(&json!({ "job": full_job() })).unwrap();
        assert_eq!(input.location, "Nairobi");
        assert_eq!(input.posted_by, None);
    }

    #[test]
    fn posted_by_may_be_an_account_id() {
        let mut job = full_job();
        job["posted_by"] = json!(7);
        let input = job_post_input(&json!({ "job": job })).unwrap();
        assert_eq!(input.posted_by, Some(json!(7)));

        let mut job = full_job();
        job["posted_by"] = Value::Null;
        assert!(job_post_input(&json!({ "job": job })).is_ok());
    }

    #[test]
    fn job_details_need_three_fields() {
        let err = job_details_input(&json!({ "title": "Clerk", "experience": "2 years" }))
            .unwrap_err();
        assert_eq!(
            err.message(),
            "Title, experience and qualifications are required."
        );
        let input = job_details_input(&json!({
            "title": "Clerk",
            "experience": "2 years",
            "qualifications": "Diploma"
        }))
        .unwrap();
        assert_eq!(input.qualifications, "Diploma");
    }

    #[test]
    fn post_response_uses_camel_case() {
        let body = serde_json::to_value(PostResponse {
            post_content: "We're hiring".into(),
        })
        .unwrap();
        assert_eq!(body, json!({ "postContent": "We're hiring" }));
    }
}
