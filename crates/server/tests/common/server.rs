//! Server test utilities.

use super::fixtures::MultipartForm;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use bytes::Bytes;
use portal_core::config::{AppConfig, MetadataConfig, StorageConfig};
use portal_metadata::repos::UserRepo;
use portal_metadata::{MetadataStore, SqliteStore};
use portal_server::{AppState, create_router};
use portal_storage::{FilesystemBackend, ObjectStore};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A captured response.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[allow(dead_code)]
impl TestResponse {
    /// Body as JSON, `Null` when empty or not JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    /// The `name=value` pair of the `Set-Cookie` header, if any.
    pub fn cookie(&self) -> Option<String> {
        self.set_cookie()
            .and_then(|c| c.split(';').next())
            .map(|pair| pair.trim().to_string())
    }

    pub fn set_cookie(&self) -> Option<&str> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A test server wrapper with all dependencies.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(modifier, |storage| storage).await
    }

    /// Create a test server whose object store is wrapped by `wrap`.
    pub async fn with_storage<W>(wrap: W) -> Self
    where
        W: FnOnce(Arc<dyn ObjectStore>) -> Arc<dyn ObjectStore>,
    {
        Self::build(|_| {}, wrap).await
    }

    async fn build<F, W>(modifier: F, wrap: W) -> Self
    where
        F: FnOnce(&mut AppConfig),
        W: FnOnce(Arc<dyn ObjectStore>) -> Arc<dyn ObjectStore>,
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("artifacts");
        let backend: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );
        let storage = wrap(backend);

        let db_path = temp_dir.path().join("portal.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, 1)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem { path: storage_path };
        config.metadata = MetadataConfig {
            path: db_path,
            max_connections: 1,
        };
        modifier(&mut config);

        let state = AppState::new(config, storage, metadata);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Send a request through the router.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: Value, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(serde_json::to_vec(&body).unwrap())).unwrap())
            .await
    }

    pub async fn post_multipart(
        &self,
        uri: &str,
        form: MultipartForm,
        cookie: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, MultipartForm::content_type());
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(form.finish())).unwrap())
            .await
    }

    pub async fn register(&self, username: &str, password: &str, email: &str) -> TestResponse {
        self.post_json(
            "/api/register",
            json!({ "username": username, "password": password, "email": email }),
            None,
        )
        .await
    }

    pub async fn login(&self, username: &str, password: &str) -> TestResponse {
        self.post_json(
            "/api/login",
            json!({ "username": username, "password": password }),
            None,
        )
        .await
    }

    /// Register and log in a user, returning the session cookie.
    pub async fn user_session(&self, username: &str, is_admin: bool) -> String {
        let password = format!("{username}-password");
        let response = self
            .register(username, &password, &format!("{username}@example.com"))
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "register {username}");

        if is_admin {
            let id = response.json()["userId"].as_i64().unwrap();
            self.metadata().set_admin(id, true).await.unwrap();
        }

        let response = self.login(username, &password).await;
        assert_eq!(response.status, StatusCode::OK, "login {username}");
        response.cookie().expect("login sets a session cookie")
    }

    /// Publish a version through the API.
    pub async fn upload(&self, cookie: &str, form: MultipartForm) -> TestResponse {
        self.post_multipart("/api/versions", form, Some(cookie)).await
    }
}
