use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db,
    error::AppError,
    extract::AppPath,
    models::{
        notification::{Notification, NotificationType, NotificationView},
        user::UserProfile,
    },
};

/// Records an activity for `to`. Runs after the triggering write has
/// committed; a failure here is logged and never undoes that write.
pub async fn create_notification(pool: &SqlitePool, kind: NotificationType, from: &str, to: &str) {
    let result = sqlx::query(
        "INSERT INTO notifications (id, from_user, to_user, type, read, created_at) VALUES (?, ?, ?, ?, 0, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(from)
    .bind(to)
    .bind(kind)
    .bind(Utc::now())
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!("Failed to record {:?} notification {} -> {}: {:?}", kind, from, to, e);
    }
}

/// Returns every notification addressed to `user_id`, newest first, and marks
/// them all read in the same transaction.
///
/// The returned items carry the read flag as it was before this call, so a
/// caller can tell which ones are new.
pub async fn list_and_mark_read(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<NotificationView>, AppError> {
    let mut tx = pool.begin().await?;

    // Write first so the transaction holds the write lock from the start.
    let newly_read: HashSet<String> = sqlx::query_scalar::<_, String>(
        "UPDATE notifications SET read = 1 WHERE to_user = ? AND read = 0 RETURNING id",
    )
    .bind(user_id)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .collect();

    let mut notifications = sqlx::query_as::<_, Notification>(
        r#"
        SELECT id, from_user, to_user, type, read, created_at
        FROM notifications
        WHERE to_user = ?
        ORDER BY created_at DESC, rowid DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    for n in &mut notifications {
        if newly_read.contains(&n.id) {
            n.read = false;
        }
    }

    Ok(db::populate_notifications(pool, notifications).await?)
}

/// `GET /notifications/`
pub async fn get_notifications(
    State(pool): State<SqlitePool>,
    Extension(me): Extension<UserProfile>,
) -> Result<impl IntoResponse, AppError> {
    let notifications = list_and_mark_read(&pool, &me.id).await?;

    Ok(Json(json!({
        "success": true,
        "notifications": notifications,
    })))
}

/// `DELETE /notifications/delete-one/{id}`
/// Only the recipient may delete a notification; anything else is a 404.
pub async fn delete_notification(
    State(pool): State<SqlitePool>,
    Extension(me): Extension<UserProfile>,
    AppPath(id): AppPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let removed = sqlx::query("DELETE FROM notifications WHERE id = ? AND to_user = ?")
        .bind(&id)
        .bind(&me.id)
        .execute(&pool)
        .await?
        .rows_affected();

    if removed == 0 {
        return Err(AppError::NotFound("Notification not found".to_string()));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Notification deleted successfully",
    })))
}

/// `DELETE /notifications/delete-all`
pub async fn delete_all_notifications(
    State(pool): State<SqlitePool>,
    Extension(me): Extension<UserProfile>,
) -> Result<impl IntoResponse, AppError> {
    let removed = sqlx::query("DELETE FROM notifications WHERE to_user = ?")
        .bind(&me.id)
        .execute(&pool)
        .await?
        .rows_affected();

    tracing::debug!("Deleted {} notifications for {}", removed, me.id);

    Ok(Json(json!({
        "success": true,
        "message": "All notifications deleted successfully",
    })))
}
