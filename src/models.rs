use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = accounts)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub position: Option<String>,
    pub role: String,
    pub department_id: Option<i64>,
    pub profile_image: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = accounts)]
pub struct NewAccount {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub position: Option<String>,
    pub role: String,
    pub department_id: Option<i64>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = departments)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub manager_id: Option<i64>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = departments)]
pub struct NewDepartment {
    pub name: String,
    pub manager_id: Option<i64>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = employee_records)]
pub struct EmployeeRecord {
    pub id: i64,
    pub account_id: i64,
    pub contract_type: String,
    pub job_history: String,
    pub current_salary: Decimal,
    pub benefits: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = employee_records)]
pub struct NewEmployeeRecord {
    pub account_id: i64,
    pub contract_type: String,
    pub job_history: String,
    pub current_salary: Decimal,
    pub benefits: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = job_postings)]
pub struct JobPosting {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub department_id: i64,
    pub created_at: NaiveDateTime,
    pub deadline: NaiveDateTime,
    pub updated_by: Option<i64>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = job_postings)]
pub struct NewJobPosting {
    pub title: String,
    pub description: String,
    pub department_id: i64,
    pub deadline: NaiveDateTime,
    pub updated_by: Option<i64>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = applications)]
#[diesel(belongs_to(JobPosting))]
pub struct Application {
    pub id: i64,
    pub job_posting_id: i64,
    pub applicant_name: String,
    pub applicant_email: String,
    pub resume: String,
    pub cover_letter: String,
    pub submitted_at: NaiveDateTime,
    pub status: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = applications)]
pub struct NewApplication {
    pub job_posting_id: i64,
    pub applicant_name: String,
    pub applicant_email: String,
    pub resume: String,
    pub cover_letter: String,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = applicants)]
pub struct Applicant {
    pub id: i64,
    pub status: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = applicants)]
pub struct NewApplicant {
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = leaves)]
pub struct Leave {
    pub id: i64,
    pub account_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub leave_type: String,
    pub reason: String,
    pub approved: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = leaves)]
pub struct NewLeave {
    pub account_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub leave_type: String,
    pub reason: String,
    pub approved: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = payrolls)]
pub struct Payroll {
    pub id: i64,
    pub account_id: i64,
    pub payment_date: NaiveDate,
    pub amount: Decimal,
    pub details: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = payrolls)]
pub struct NewPayroll {
    pub account_id: i64,
    pub payment_date: NaiveDate,
    pub amount: Decimal,
    pub details: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = performance_reviews)]
pub struct PerformanceReview {
    pub id: i64,
    pub account_id: i64,
    pub reviewer_id: Option<i64>,
    pub review_date: NaiveDate,
    pub comments: String,
    pub rating: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = performance_reviews)]
pub struct NewPerformanceReview {
    pub account_id: i64,
    pub reviewer_id: Option<i64>,
    pub review_date: NaiveDate,
    pub comments: String,
    pub rating: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = compliance_reports)]
pub struct ComplianceReport {
    pub id: i64,
    pub report_name: String,
    pub generated_on: NaiveDateTime,
    pub file: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = compliance_reports)]
pub struct NewComplianceReport {
    pub report_name: String,
    pub file: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = tasks)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub due_date: Option<NaiveDate>,
    pub department_id: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub due_date: Option<NaiveDate>,
    pub department_id: Option<i64>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = task_assignees)]
pub struct TaskAssignee {
    pub task_id: i64,
    pub account_id: i64,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = task_comments)]
pub struct TaskComment {
    pub id: i64,
    pub task_id: i64,
    pub author_id: i64,
    pub comment: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = task_comments)]
pub struct NewTaskComment {
    pub task_id: i64,
    pub author_id: i64,
    pub comment: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(Account))]
pub struct RefreshToken {
    pub id: Uuid,
    pub account_id: i64,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub account_id: i64,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
