// src/config.rs

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

/// Session lifetime used when `JWT_EXPIRATION` is not set (one day).
pub const DEFAULT_JWT_EXPIRATION: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Session lifetime in seconds.
    pub jwt_expiration: u64,
    /// `development` disables the `Secure` cookie attribute.
    pub app_env: String,
    pub rust_log: String,
    pub port: u16,
    /// Directory backing the local blob store.
    pub upload_dir: PathBuf,
    /// Base URL under which uploaded blobs are reachable.
    pub public_url: String,
    pub store_timeout: Duration,
    pub blob_timeout: Duration,
    pub admin_username: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://social.db?mode=rwc".to_string());

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let port = parse_or("PORT", 8080);

        let public_url =
            env::var("PUBLIC_URL").unwrap_or_else(|_| format!("http://localhost:{}", port));

        Self {
            database_url,
            jwt_secret,
            jwt_expiration: parse_or("JWT_EXPIRATION", DEFAULT_JWT_EXPIRATION),
            app_env: env::var("APP_ENV").unwrap_or_else(|_| "production".to_string()),
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            port,
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            public_url,
            store_timeout: Duration::from_secs(parse_or("STORE_TIMEOUT_SECS", 5)),
            blob_timeout: Duration::from_secs(parse_or("BLOB_TIMEOUT_SECS", 10)),
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_email: env::var("ADMIN_EMAIL").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
        }
    }

    /// Whether session cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.app_env != "development"
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
