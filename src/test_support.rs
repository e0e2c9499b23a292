//! Fixtures shared by the in-crate unit tests.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;

pub async fn memory_pool() -> SqlitePool {
    let pool = db::connect_in_memory().await.expect("in-memory sqlite");
    db::run_migrations(&pool).await.expect("migrations apply");
    pool
}

/// A WAL database file with the production pool settings, for tests that
/// need several connections contending for the write lock. The files are
/// removed when the guard drops.
pub struct FileDb {
    pub pool: SqlitePool,
    path: PathBuf,
}

impl Drop for FileDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

pub async fn file_pool() -> FileDb {
    let path = std::env::temp_dir().join(format!("social-backend-{}.db", Uuid::new_v4()));
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let pool = db::connect(&url, Duration::from_secs(5)).await.expect("file sqlite");
    db::run_migrations(&pool).await.expect("migrations apply");
    FileDb { pool, path }
}

/// Inserts a user straight into the store and returns its id.
pub async fn insert_user(pool: &SqlitePool, user_name: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users (id, user_name, full_name, email, password, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 'x', ?, ?)",
    )
    .bind(&id)
    .bind(user_name)
    .bind(user_name)
    .bind(format!("{}@example.com", user_name))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .expect("insert user");
    id
}

/// Inserts a text post owned by `user_id` and returns its id.
pub async fn insert_post(pool: &SqlitePool, user_id: &str, text: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query("INSERT INTO posts (id, user_id, text, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&id)
        .bind(user_id)
        .bind(text)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .expect("insert post");
    id
}

pub async fn count_notifications(pool: &SqlitePool, to: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE to_user = ?")
        .bind(to)
        .fetch_one(pool)
        .await
        .expect("count notifications")
}
