use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use hr_backend::auth::{jwt::JwtService, password};
use hr_backend::config::AppConfig;
use hr_backend::db::{self, PgPool, MIGRATIONS};
use hr_backend::generation::{GenerationError, Prompt, TextGenerator};
use hr_backend::models::{NewAccount, NewDepartment};
use hr_backend::policy::Role;
use hr_backend::routes;
use hr_backend::schema::{accounts, departments};
use hr_backend::state::AppState;
use hr_backend::storage::ObjectStorage;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
    reject_uploads: AtomicBool,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
        _content_disposition: Option<String>,
    ) -> Result<()> {
        if self.reject_uploads.load(Ordering::SeqCst) {
            bail!("storage unavailable");
        }
        let mut guard = self.objects.lock().await;
        guard.insert(
            key.to_string(),
            StoredObject {
                key: key.to_string(),
                bytes,
                content_type,
            },
        );
        Ok(())
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let guard = self.objects.lock().await;
        ensure!(guard.contains_key(key), "object {key} missing");
        Ok(format!(
            "https://fake-storage/{key}?expires_in={}",
            expires_in.as_secs()
        ))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.remove(key);
        Ok(())
    }
}

impl FakeStorage {
    #[allow(dead_code)]
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        let guard = self.objects.lock().await;
        guard.get(key).cloned()
    }

    #[allow(dead_code)]
    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }

    #[allow(dead_code)]
    pub fn reject_uploads(&self, reject: bool) {
        self.reject_uploads.store(reject, Ordering::SeqCst);
    }
}

/// Answers every prompt with a canned line naming the token budget it was given.
#[derive(Default)]
pub struct FakeGenerator {
    failing: AtomicBool,
    prompts: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.text.clone());
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(GenerationError::Upstream(
                "invalid api token sk-test-123".to_string(),
            ));
        }
        Ok(format!("generated text ({} tokens)", prompt.max_tokens))
    }
}

impl FakeGenerator {
    #[allow(dead_code)]
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().map(|prompts| prompts.len()).unwrap_or(0)
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
    generator: Arc<FakeGenerator>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            refresh_token_expiry_days: 30,
            refresh_cookie_secure: false,
            refresh_cookie_domain: None,
            cors_allowed_origin: None,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "us-east-1".to_string(),
            s3_bucket: "test-bucket".to_string(),
            cohere_api_key: None,
            cohere_base_url: "http://localhost".to_string(),
            cohere_model: "test-model".to_string(),
            generation_timeout_seconds: 5,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let generator = Arc::new(FakeGenerator::default());
        let storage_for_state: Arc<dyn ObjectStorage> = storage.clone();
        let generator_for_state: Arc<dyn TextGenerator> = generator.clone();
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(
            pool.clone(),
            config,
            storage_for_state,
            generator_for_state,
            jwt,
        );
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
            generator,
        })
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    #[allow(dead_code)]
    pub fn generator(&self) -> Arc<FakeGenerator> {
        self.generator.clone()
    }

    pub async fn insert_department(&self, name: &str) -> Result<i64> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            diesel::insert_into(departments::table)
                .values(&NewDepartment {
                    name,
                    manager_id: None,
                })
                .returning(departments::id)
                .get_result(conn)
                .context("failed to insert department")
        })
        .await
    }

    pub async fn insert_account(
        &self,
        username: &str,
        password_text: &str,
        role: Role,
        department_id: Option<i64>,
    ) -> Result<i64> {
        let username = username.to_string();
        let password_text = password_text.to_string();
        self.with_conn(move |conn| {
            let account = NewAccount {
                email: format!("{username}@example.com"),
                first_name: username.clone(),
                last_name: "Tester".to_string(),
                username,
                password_hash: password::hash_password(&password_text)?,
                phone: None,
                address: None,
                date_of_birth: None,
                position: None,
                role: role.as_str().to_string(),
                department_id,
                is_active: true,
            };
            diesel::insert_into(accounts::table)
                .values(&account)
                .returning(accounts::id)
                .get_result(conn)
                .context("failed to insert account")
        })
        .await
    }

    /// Inserts an account and logs it in, returning its id and access token.
    #[allow(dead_code)]
    pub async fn account_with_token(
        &self,
        username: &str,
        role: Role,
        department_id: Option<i64>,
    ) -> Result<(i64, String)> {
        let password_text = format!("{username}-pass");
        let id = self
            .insert_account(username, &password_text, role, department_id)
            .await?;
        let token = self.login_token(username, &password_text).await?;
        Ok((id, token))
    }

    pub async fn login_token(&self, username: &str, password_text: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            username: &'a str,
            password: &'a str,
        }

        let response = self
            .send_json(
                Method::POST,
                "/api/auth/login",
                &LoginPayload {
                    username,
                    password: password_text,
                },
                None,
            )
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = body_json(response).await?;
        body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("login response carried no access token"))
    }

    pub async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.dispatch(builder.body(Body::from(body))?).await
    }

    #[allow(dead_code)]
    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.without_body(Method::GET, path, token).await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.without_body(Method::DELETE, path, token).await
    }

    /// POSTs with no body, presenting `cookie` as the request's Cookie header.
    #[allow(dead_code)]
    pub async fn post_with_cookie(&self, path: &str, cookie: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("cookie", cookie)
            .body(Body::empty())?;
        self.dispatch(request).await
    }

    async fn without_body(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.dispatch(builder.body(Body::empty())?).await
    }

    /// Sends a multipart form with a JSON `data` part and one file part.
    #[allow(dead_code)]
    pub async fn send_multipart(
        &self,
        method: Method,
        path: &str,
        data: &Value,
        file_field: &str,
        file_name: &str,
        file_bytes: &[u8],
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(b"Content-Disposition: form-data; name=\"data\"\r\n\r\n");
        body.extend(serde_json::to_vec(data)?);
        body.extend(b"\r\n");

        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"{file_field}\"; filename=\"{file_name}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend(file_bytes);
        body.extend(b"\r\n");
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(method)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;
        self.dispatch(request).await
    }

    /// Sends a multipart form made of plain text parts and an optional file part.
    #[allow(dead_code)]
    pub async fn send_form(
        &self,
        method: Method,
        path: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &str, &[u8])>,
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend(value.as_bytes());
            body.extend(b"\r\n");
        }
        if let Some((field, file_name, bytes)) = file {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
                )
                .as_bytes(),
            );
            body.extend(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend(bytes);
            body.extend(b"\r\n");
        }
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(method)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;
        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

/// The `name=value` pair of the response's first Set-Cookie header.
#[allow(dead_code)]
pub fn cookie_pair(response: &hyper::Response<Body>) -> Option<String> {
    let header = response.headers().get("set-cookie")?.to_str().ok()?;
    header.split(';').next().map(|pair| pair.trim().to_string())
}

pub async fn body_json(response: hyper::Response<Body>) -> Result<Value> {
    let collected = response
        .into_body()
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    let bytes = collected.to_bytes();
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).context("response body is not JSON")
}

/// A 1x1 PNG.
#[allow(dead_code)]
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE task_comments, task_assignees, tasks, refresh_tokens, compliance_reports, \
         performance_reviews, payrolls, leaves, applicants, applications, job_postings, \
         employee_records, accounts, departments RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
