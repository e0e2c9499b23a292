// src/handlers/auth.rs

use axum::{
    Extension, Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::Config,
    db,
    error::{AppError, is_unique_violation},
    extract::AppJson,
    models::user::{LoginRequest, SignupRequest, UserProfile},
    utils::{
        cookie::{clear_session_cookie, session_cookie},
        hash::{hash_password, verify_password},
        jwt::sign_jwt,
    },
};

/// Registers a new user.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created with the user (no password) and sets the session cookie.
pub async fn signup(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    AppJson(payload): AppJson<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if db::fetch_user_by_name(&pool, &payload.user_name).await?.is_some() {
        return Err(AppError::BadRequest("User name already taken.".to_string()));
    }

    let email_taken: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(&payload.email)
        .fetch_optional(&pool)
        .await?;
    if email_taken.is_some() {
        return Err(AppError::BadRequest("Email already taken.".to_string()));
    }

    let hashed_password = hash_password(&payload.password)?;
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (id, user_name, full_name, email, password, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&payload.user_name)
    .bind(&payload.full_name)
    .bind(&payload.email)
    .bind(&hashed_password)
    .bind(now)
    .bind(now)
    .execute(&pool)
    .await
    .map_err(|e| {
        // Lost a race with a concurrent signup for the same handle/email.
        if is_unique_violation(&e, "users.user_name") {
            AppError::BadRequest("User name already taken.".to_string())
        } else if is_unique_violation(&e, "users.email") {
            AppError::BadRequest("Email already taken.".to_string())
        } else {
            tracing::error!("Failed to register user: {:?}", e);
            AppError::from(e)
        }
    })?;

    let user = db::fetch_profile(&pool, &id)
        .await?
        .ok_or_else(|| AppError::InternalServerError(format!("user {} vanished after insert", id)))?;

    let token = sign_jwt(&user.id, &config.jwt_secret, config.jwt_expiration)?;
    let cookie = session_cookie(&token, config.jwt_expiration, config.secure_cookies())?;

    tracing::info!("New user signed up: {}", user.user_name);

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "success": true, "data": user })),
    ))
}

/// Authenticates a user by handle and password and sets the session cookie.
pub async fn login(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = db::fetch_user_by_name(&pool, &payload.user_name)
        .await
        .map_err(|e| {
            tracing::error!("Login DB error: {:?}", e);
            AppError::from(e)
        })?
        .ok_or_else(|| AppError::BadRequest("User name not found.".to_string()))?;

    if !verify_password(&payload.password, &user.password)? {
        return Err(AppError::BadRequest("Invalid password.".to_string()));
    }

    let token = sign_jwt(&user.id, &config.jwt_secret, config.jwt_expiration)?;
    let cookie = session_cookie(&token, config.jwt_expiration, config.secure_cookies())?;

    let profile = db::fetch_profile(&pool, &user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))?;

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "success": true, "data": profile })),
    ))
}

/// Clears the session cookie. Always succeeds, with or without a session.
pub async fn logout(State(config): State<Config>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, clear_session_cookie(config.secure_cookies()))],
        Json(json!({ "success": true, "message": "Logged out successfully" })),
    )
}

/// Returns the user resolved by the access guard.
pub async fn get_me(Extension(me): Extension<UserProfile>) -> impl IntoResponse {
    Json(json!({ "success": true, "data": me }))
}
