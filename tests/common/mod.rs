// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use social_backend::{
    config::Config,
    db,
    error::AppError,
    routes,
    state::AppState,
    utils::blob::{BlobStore, ImageUpload},
};
use sqlx::SqlitePool;

pub const PNG_DATA_URI: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// How the recording store answers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BlobBehavior {
    #[default]
    Succeed,
    /// Uploads work, deletes report an error.
    FailDeletes,
    /// Every call outlives the app's blob timeout.
    Hang,
}

/// How long a hanging call sleeps; far past `TEST_BLOB_TIMEOUT`.
const HANG_FOR: Duration = Duration::from_secs(30);
const TEST_BLOB_TIMEOUT: Duration = Duration::from_millis(200);

/// Blob store that keeps nothing and remembers every call.
#[derive(Default)]
pub struct RecordingBlobStore {
    pub behavior: BlobBehavior,
    pub uploads: Mutex<Vec<String>>,
    pub deletes: Mutex<Vec<String>>,
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn upload(&self, folder: &str, image: &ImageUpload) -> Result<String, AppError> {
        if self.behavior == BlobBehavior::Hang {
            tokio::time::sleep(HANG_FOR).await;
        }
        let mut uploads = self.uploads.lock().unwrap();
        let url = format!(
            "https://blobs.test/v1/{}/img{}.{}",
            folder,
            uploads.len(),
            image.extension
        );
        uploads.push(url.clone());
        Ok(url)
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.deletes.lock().unwrap().push(key.to_string());
        match self.behavior {
            BlobBehavior::Succeed => Ok(()),
            BlobBehavior::FailDeletes => Err(AppError::InternalServerError(format!(
                "blob backend refused to delete '{}'",
                key
            ))),
            BlobBehavior::Hang => {
                tokio::time::sleep(HANG_FOR).await;
                Ok(())
            }
        }
    }
}

pub struct TestApp {
    pub address: String,
    pub pool: SqlitePool,
    pub blobs: Arc<RecordingBlobStore>,
    pub client: reqwest::Client,
}

/// Spawns the app on a random port over a fresh in-memory database.
pub async fn spawn_app() -> TestApp {
    spawn_app_with_blobs(BlobBehavior::Succeed).await
}

/// Same as [`spawn_app`], with a blob store that behaves as told.
pub async fn spawn_app_with_blobs(behavior: BlobBehavior) -> TestApp {
    let pool = db::connect_in_memory()
        .await
        .expect("Failed to open in-memory SQLite");
    db::run_migrations(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        app_env: "development".to_string(),
        rust_log: "error".to_string(),
        port: 0,
        upload_dir: std::env::temp_dir(),
        public_url: "http://localhost".to_string(),
        store_timeout: Duration::from_secs(5),
        blob_timeout: TEST_BLOB_TIMEOUT,
        admin_username: None,
        admin_email: None,
        admin_password: None,
    };

    let blobs = Arc::new(RecordingBlobStore {
        behavior,
        ..Default::default()
    });
    let state = AppState {
        pool: pool.clone(),
        config,
        blobs: blobs.clone(),
    };

    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        pool,
        blobs,
        client: reqwest::Client::new(),
    }
}

/// A signed-up user and the cookie header that authenticates them.
pub struct Session {
    pub id: String,
    pub user_name: String,
    pub cookie: String,
}

/// Pulls `jwt=<token>` out of a response's `Set-Cookie` header.
pub fn session_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("jwt="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn signup(&self, user_name: &str) -> Session {
        let response = self
            .client
            .post(self.url("/auth/signup"))
            .json(&serde_json::json!({
                "userName": user_name,
                "fullName": user_name.to_uppercase(),
                "email": format!("{}@x.com", user_name),
                "password": "pass",
            }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201, "signup of {} failed", user_name);

        let cookie = session_cookie(&response).expect("signup sets a session cookie");
        let body: serde_json::Value = response.json().await.unwrap();
        Session {
            id: body["data"]["_id"].as_str().unwrap().to_string(),
            user_name: user_name.to_string(),
            cookie,
        }
    }

    pub async fn get(&self, session: &Session, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header(reqwest::header::COOKIE, &session.cookie)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, session: &Session, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header(reqwest::header::COOKIE, &session.cookie)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, session: &Session, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .header(reqwest::header::COOKIE, &session.cookie)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Creates a text post and returns its id.
    pub async fn create_post(&self, session: &Session, body: serde_json::Value) -> String {
        let response = self.post(session, "/posts/create", body).await;
        assert_eq!(response.status().as_u16(), 201);
        let body: serde_json::Value = response.json().await.unwrap();
        body["post"]["_id"].as_str().unwrap().to_string()
    }

    pub async fn me(&self, session: &Session) -> serde_json::Value {
        let body: serde_json::Value = self.get(session, "/auth/me").await.json().await.unwrap();
        body["data"].clone()
    }
}
