use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::{
    auth::AuthenticatedUser,
    error::AppResult,
    policy::{self, Action, Actor, Relation, Resource},
    state::AppState,
};

pub mod applicants;
pub mod applications;
pub mod auth;
pub mod compliance_reports;
pub mod departments;
pub mod employee_records;
pub mod employees;
pub mod forms;
pub mod generation;
pub mod health;
pub mod job_postings;
pub mod leaves;
pub mod payrolls;
pub mod performance_reviews;
pub mod tasks;

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

/// Authorizes an action that does not depend on who owns the target record.
pub(crate) fn permit(
    user: &AuthenticatedUser,
    resource: Resource,
    action: Action,
) -> AppResult<Actor> {
    let actor = user.actor();
    let relation = match action {
        Action::List | Action::Create => Relation::Collection,
        _ => Relation::Other,
    };
    policy::authorize(&actor, resource, action, relation)?;
    Ok(actor)
}

fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(err) => {
                        warn!(origin = value, error = %err, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Every handler except login, refresh, health and the employee list takes an
/// [`AuthenticatedUser`], so authentication is enforced per route.
pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let employee_routes = Router::new()
        .route(
            "/",
            get(employees::list_accounts).post(employees::create_account),
        )
        .route(
            "/:id",
            get(employees::get_account)
                .put(employees::replace_account)
                .patch(employees::patch_account)
                .delete(employees::delete_account),
        )
        .route("/:id/profile-image", get(employees::profile_image_url));

    let department_routes = Router::new()
        .route(
            "/",
            get(departments::list_departments).post(departments::create_department),
        )
        .route("/mine", get(departments::my_department))
        .route("/members", get(departments::department_members))
        .route(
            "/:id",
            get(departments::get_department)
                .put(departments::replace_department)
                .patch(departments::patch_department)
                .delete(departments::delete_department),
        );

    let record_routes = Router::new()
        .route(
            "/",
            get(employee_records::list_records).post(employee_records::create_record),
        )
        .route(
            "/:id",
            get(employee_records::get_record)
                .put(employee_records::replace_record)
                .patch(employee_records::patch_record)
                .delete(employee_records::delete_record),
        );

    let posting_routes = Router::new()
        .route(
            "/",
            get(job_postings::list_postings).post(job_postings::create_posting),
        )
        .route(
            "/:id",
            get(job_postings::get_posting)
                .put(job_postings::replace_posting)
                .patch(job_postings::patch_posting)
                .delete(job_postings::delete_posting),
        );

    let application_routes = Router::new()
        .route(
            "/",
            get(applications::list_applications).post(applications::create_application),
        )
        .route(
            "/:id",
            get(applications::get_application)
                .put(applications::replace_application)
                .patch(applications::patch_application)
                .delete(applications::delete_application),
        )
        .route(
            "/:id/update_status",
            patch(applications::update_application_status),
        )
        .route("/:id/resume", get(applications::resume_url));

    let applicant_routes = Router::new()
        .route(
            "/",
            get(applicants::list_applicants).post(applicants::create_applicant),
        )
        .route(
            "/:id",
            get(applicants::get_applicant)
                .put(applicants::replace_applicant)
                .patch(applicants::patch_applicant)
                .delete(applicants::delete_applicant),
        )
        .route(
            "/:id/update_status",
            post(applicants::update_applicant_status),
        );

    let leave_routes = Router::new()
        .route("/", get(leaves::list_leaves).post(leaves::create_leave))
        .route(
            "/:id",
            get(leaves::get_leave)
                .put(leaves::replace_leave)
                .patch(leaves::patch_leave)
                .delete(leaves::delete_leave),
        );

    let payroll_routes = Router::new()
        .route(
            "/",
            get(payrolls::list_payrolls).post(payrolls::create_payroll),
        )
        .route(
            "/:id",
            get(payrolls::get_payroll)
                .put(payrolls::replace_payroll)
                .patch(payrolls::patch_payroll)
                .delete(payrolls::delete_payroll),
        );

    let review_routes = Router::new()
        .route(
            "/",
            get(performance_reviews::list_reviews).post(performance_reviews::create_review),
        )
        .route(
            "/:id",
            get(performance_reviews::get_review)
                .put(performance_reviews::replace_review)
                .patch(performance_reviews::patch_review)
                .delete(performance_reviews::delete_review),
        );

    let report_routes = Router::new()
        .route(
            "/",
            get(compliance_reports::list_reports).post(compliance_reports::create_report),
        )
        .route(
            "/:id",
            get(compliance_reports::get_report)
                .put(compliance_reports::replace_report)
                .patch(compliance_reports::patch_report)
                .delete(compliance_reports::delete_report),
        )
        .route("/:id/file", get(compliance_reports::report_file_url));

    let task_routes = Router::new()
        .route("/", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/:id",
            get(tasks::get_task)
                .put(tasks::replace_task)
                .patch(tasks::patch_task)
                .delete(tasks::delete_task),
        )
        .route(
            "/:id/comments",
            get(tasks::list_comments).post(tasks::add_comment),
        );

    let generation_routes = Router::new()
        .route("/post", post(generation::generate_post))
        .route("/job-details", post(generation::generate_job_details));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/employees", employee_routes)
        .nest("/api/departments", department_routes)
        .nest("/api/employee-records", record_routes)
        .nest("/api/job-postings", posting_routes)
        .nest("/api/applications", application_routes)
        .nest("/api/applicants", applicant_routes)
        .nest("/api/leaves", leave_routes)
        .nest("/api/payrolls", payroll_routes)
        .nest("/api/performance-reviews", review_routes)
        .nest("/api/compliance-reports", report_routes)
        .nest("/api/tasks", task_routes)
        .nest("/api/generate", generation_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}
