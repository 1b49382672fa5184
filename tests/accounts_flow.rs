mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use common::{acquire_db_lock, body_json, TestApp, TINY_PNG};
use diesel::prelude::*;
use hr_backend::policy::Role;
use hr_backend::schema::{accounts, employee_records, leaves, payrolls, performance_reviews};
use serde_json::{json, Value};

fn ids(list: &Value) -> Vec<i64> {
    list.as_array()
        .map(|rows| rows.iter().filter_map(|row| row["id"].as_i64()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn employees_only_see_their_department() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let sales = app.insert_department("Sales").await?;
    let ops = app.insert_department("Operations").await?;
    let (dana, dana_token) = app.account_with_token("dana", Role::Employee, Some(sales)).await?;
    let eli = app.insert_account("eli", "pw", Role::Employee, Some(sales)).await?;
    let fay = app.insert_account("fay", "pw", Role::Employee, Some(ops)).await?;
    let loner = app.insert_account("gus", "pw", Role::Employee, None).await?;
    let (_, hr_token) = app.account_with_token("hana", Role::HrManager, Some(ops)).await?;

    let listed = body_json(app.get("/api/employees", Some(&dana_token)).await?).await?;
    assert_eq!(ids(&listed), vec![dana, eli]);

    let hidden = app
        .get(&format!("/api/employees/{fay}"), Some(&dana_token))
        .await?;
    assert_eq!(hidden.status(), StatusCode::NOT_FOUND);

    let everyone = body_json(app.get("/api/employees", Some(&hr_token)).await?).await?;
    assert_eq!(ids(&everyone).len(), 5);
    assert!(ids(&everyone).contains(&loner));

    let anonymous = app.get("/api/employees", None).await?;
    assert_eq!(anonymous.status(), StatusCode::OK);
    assert_eq!(body_json(anonymous).await?, json!([]));

    let anonymous_detail = app.get(&format!("/api/employees/{dana}"), None).await?;
    assert_eq!(anonymous_detail.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn hr_manager_updates_others_but_not_self_in_full() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let (hr_id, hr_token) = app.account_with_token("ivy", Role::HrManager, None).await?;
    let target = app.insert_account("jon", "pw", Role::Employee, None).await?;

    let full = json!({
        "username": "jon",
        "first_name": "Jonathan",
        "last_name": "Otieno",
        "email": "jon@example.com",
        "position": "Analyst"
    });

    let updated = app
        .send_json(
            Method::PUT,
            &format!("/api/employees/{target}"),
            &full,
            Some(&hr_token),
        )
        .await?;
    assert_eq!(updated.status(), StatusCode::OK);
    let body = body_json(updated).await?;
    assert_eq!(body["first_name"], "Jonathan");
    assert_eq!(body["position"], "Analyst");
    assert!(body.get("attachment_warning").is_none());

    let own_full = app
        .send_json(
            Method::PUT,
            &format!("/api/employees/{hr_id}"),
            &json!({
                "username": "ivy",
                "first_name": "Ivy",
                "last_name": "Wambui",
                "email": "ivy@example.com"
            }),
            Some(&hr_token),
        )
        .await?;
    assert_eq!(own_full.status(), StatusCode::FORBIDDEN);

    let own_patch = app
        .send_json(
            Method::PATCH,
            &format!("/api/employees/{hr_id}"),
            &json!({ "phone": "+254700000000" }),
            Some(&hr_token),
        )
        .await?;
    assert_eq!(own_patch.status(), StatusCode::OK);
    assert_eq!(body_json(own_patch).await?["phone"], "+254700000000");

    let promote = app
        .send_json(
            Method::PATCH,
            &format!("/api/employees/{target}"),
            &json!({ "role": "superuser" }),
            Some(&hr_token),
        )
        .await?;
    assert_eq!(promote.status(), StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn employees_cannot_delete_accounts() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let (_, staff_token) = app.account_with_token("kim", Role::Employee, None).await?;
    let (admin_id, admin_token) = app.account_with_token("root", Role::Superuser, None).await?;
    let target = app.insert_account("lee", "pw", Role::Employee, None).await?;

    let denied = app
        .delete(&format!("/api/employees/{target}"), Some(&staff_token))
        .await?;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let still_there: i64 = app
        .with_conn(move |conn| {
            Ok(accounts::table
                .filter(accounts::id.eq(target))
                .count()
                .get_result(conn)?)
        })
        .await?;
    assert_eq!(still_there, 1);

    let own = app
        .delete(&format!("/api/employees/{admin_id}"), Some(&admin_token))
        .await?;
    assert_eq!(own.status(), StatusCode::FORBIDDEN);

    let removed = app
        .delete(&format!("/api/employees/{target}"), Some(&admin_token))
        .await?;
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);

    let again = app
        .delete(&format!("/api/employees/{target}"), Some(&admin_token))
        .await?;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn deleting_an_account_cascades_and_clears_reviewer() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let (_, admin) = app.account_with_token("root", Role::Superuser, None).await?;
    let worker = app.insert_account("mo", "pw", Role::Employee, None).await?;
    let reviewer = app.insert_account("nia", "pw", Role::HrManager, None).await?;

    let payloads = [
        (
            "/api/employee-records",
            json!({
                "employee": worker,
                "contract_type": "permanent",
                "job_history": "joined 2021",
                "current_salary": "48000.00",
                "benefits": "medical"
            }),
        ),
        (
            "/api/leaves",
            json!({
                "employee": worker,
                "start_date": "2024-12-23",
                "end_date": "2024-12-27",
                "leave_type": "annual",
                "reason": "holidays"
            }),
        ),
        (
            "/api/payrolls",
            json!({
                "employee": worker,
                "payment_date": "2024-08-31",
                "amount": "4000.00",
                "details": "August"
            }),
        ),
    ];
    for (path, payload) in &payloads {
        let created = app.send_json(Method::POST, path, payload, Some(&admin)).await?;
        assert_eq!(created.status(), StatusCode::CREATED, "{path}");
    }

    let other = app.insert_account("oli", "pw", Role::Employee, None).await?;
    let review = app
        .send_json(
            Method::POST,
            "/api/performance-reviews",
            &json!({
                "employee": other,
                "reviewer": reviewer,
                "review_date": "2024-06-30",
                "comments": "steady",
                "rating": 4
            }),
            Some(&admin),
        )
        .await?;
    assert_eq!(review.status(), StatusCode::CREATED);
    let review_id = body_json(review).await?["id"].as_i64().unwrap_or_default();

    for doomed in [worker, reviewer] {
        let response = app
            .delete(&format!("/api/employees/{doomed}"), Some(&admin))
            .await?;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let (records, leave_rows, payroll_rows, reviewer_now) = app
        .with_conn(move |conn| {
            let records: i64 = employee_records::table
                .filter(employee_records::account_id.eq(worker))
                .count()
                .get_result(conn)?;
            let leave_rows: i64 = leaves::table
                .filter(leaves::account_id.eq(worker))
                .count()
                .get_result(conn)?;
            let payroll_rows: i64 = payrolls::table
                .filter(payrolls::account_id.eq(worker))
                .count()
                .get_result(conn)?;
            let reviewer_now: Option<i64> = performance_reviews::table
                .find(review_id)
                .select(performance_reviews::reviewer_id)
                .first(conn)?;
            Ok((records, leave_rows, payroll_rows, reviewer_now))
        })
        .await?;

    assert_eq!((records, leave_rows, payroll_rows), (0, 0, 0));
    assert_eq!(reviewer_now, None);

    Ok(())
}

#[tokio::test]
async fn profile_image_is_attached_after_the_account_is_saved() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let (_, admin) = app.account_with_token("root", Role::Superuser, None).await?;
    let data = json!({
        "username": "pat",
        "password": "pat-pass",
        "first_name": "Pat",
        "last_name": "Kariuki",
        "email": "pat@example.com"
    });

    let created = app
        .send_multipart(
            Method::POST,
            "/api/employees",
            &data,
            "profile_image",
            "pat.png",
            TINY_PNG,
            &admin,
        )
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = body_json(created).await?;
    let key = body["profile_image"].as_str().unwrap_or_default().to_string();
    assert!(key.starts_with("profile_images/"));
    assert!(app.storage().get(&key).await.is_some());

    let account_id = body["id"].as_i64().unwrap_or_default();
    let url = app
        .get(&format!("/api/employees/{account_id}/profile-image"), Some(&admin))
        .await?;
    assert_eq!(url.status(), StatusCode::OK);
    assert!(body_json(url).await?["url"]
        .as_str()
        .unwrap_or_default()
        .contains(&key));

    let not_an_image = app
        .send_multipart(
            Method::PATCH,
            &format!("/api/employees/{account_id}"),
            &json!({ "position": "Designer" }),
            "profile_image",
            "notes.txt",
            b"plain text",
            &admin,
        )
        .await?;
    assert_eq!(not_an_image.status(), StatusCode::BAD_REQUEST);

    app.storage().reject_uploads(true);
    let degraded = app
        .send_multipart(
            Method::PATCH,
            &format!("/api/employees/{account_id}"),
            &json!({ "position": "Designer" }),
            "profile_image",
            "new.png",
            TINY_PNG,
            &admin,
        )
        .await?;
    assert_eq!(degraded.status(), StatusCode::OK);
    let body = body_json(degraded).await?;
    assert_eq!(body["position"], "Designer");
    assert_eq!(body["profile_image"], key.as_str());
    assert!(body["attachment_warning"].is_string());

    Ok(())
}

#[tokio::test]
async fn plain_form_fields_are_typed_on_multipart_create() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let department = app.insert_department("Finance").await?;
    let (_, admin) = app.account_with_token("root", Role::Superuser, None).await?;
    let department_text = department.to_string();

    let created = app
        .send_form(
            Method::POST,
            "/api/employees",
            &[
                ("username", "kim"),
                ("password", "kim-pass"),
                ("first_name", "Kim"),
                ("last_name", "Achieng"),
                ("email", "kim@example.com"),
                ("department", department_text.as_str()),
                ("is_active", "true"),
                ("phone", "5551234"),
            ],
            Some(("profile_image", "kim.png", TINY_PNG)),
            &admin,
        )
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = body_json(created).await?;
    assert_eq!(body["department"], department);
    assert_eq!(body["is_active"], true);
    assert_eq!(body["phone"], "5551234");
    assert!(body["profile_image"].is_string());

    let account_id = body["id"].as_i64().unwrap_or_default();
    let cleared = app
        .send_form(
            Method::PATCH,
            &format!("/api/employees/{account_id}"),
            &[("department", "")],
            None,
            &admin,
        )
        .await?;
    assert_eq!(cleared.status(), StatusCode::OK);
    assert_eq!(body_json(cleared).await?["department"], Value::Null);

    let not_a_number = app
        .send_form(
            Method::PATCH,
            &format!("/api/employees/{account_id}"),
            &[("department", "finance")],
            None,
            &admin,
        )
        .await?;
    assert_eq!(not_a_number.status(), StatusCode::BAD_REQUEST);

    Ok(())
}
