use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    config::Config,
    db::{self, USER_COLUMNS},
    error::{AppError, is_unique_violation},
    extract::{AppJson, AppPath, AppQuery},
    handlers::notifications::create_notification,
    models::{
        notification::NotificationType,
        user::{SuggestedParams, UpdateUserRequest, User, UserProfile, validate_email_format},
    },
    utils::{
        blob::{BlobStore, remove_image, upload_image},
        hash::{MIN_PASSWORD_LEN, hash_password, verify_password},
    },
};

/// Upper bound on the random sample suggestions are drawn from.
const SUGGESTED_SAMPLE_SIZE: usize = 10;

/// Result of a follow toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed,
    Unfollowed,
}

/// Flips whether `actor_id` follows `target_id`.
///
/// The pair is a single `follows` row, so both `actor.following` and
/// `target.followers` change in one statement: remove-if-present, otherwise
/// add-if-absent. Concurrent toggles serialize on the write lock taken by the
/// first statement. A "follow" notification is emitted after commit, never on
/// unfollow.
pub async fn toggle_follow(
    pool: &SqlitePool,
    actor_id: &str,
    target_id: &str,
) -> Result<FollowOutcome, AppError> {
    if actor_id == target_id {
        return Err(AppError::BadRequest(
            "You cannot follow/unfollow yourself".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let removed = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND following_id = ?")
        .bind(actor_id)
        .bind(target_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let outcome = if removed > 0 {
        FollowOutcome::Unfollowed
    } else {
        let target_exists: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
            .bind(target_id)
            .fetch_optional(&mut *tx)
            .await?;
        if target_exists.is_none() {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        sqlx::query(
            "INSERT INTO follows (follower_id, following_id, created_at) VALUES (?, ?, ?) \
             ON CONFLICT (follower_id, following_id) DO NOTHING",
        )
        .bind(actor_id)
        .bind(target_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        FollowOutcome::Followed
    };

    tx.commit().await?;

    if outcome == FollowOutcome::Followed {
        create_notification(pool, NotificationType::Follow, actor_id, target_id).await;
    }

    tracing::info!("{} {:?} {}", actor_id, outcome, target_id);
    Ok(outcome)
}

/// `GET /users/profile/{userName}`
pub async fn get_user_profile(
    State(pool): State<SqlitePool>,
    AppPath(user_name): AppPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = db::fetch_user_by_name(&pool, &user_name)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let profile = db::fetch_profile(&pool, &user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(json!({ "success": true, "user": profile })))
}

/// `GET /users/suggested`
///
/// A random sample of users the caller does not follow yet (never the
/// caller), cut to the page window.
pub async fn get_suggested_users(
    State(pool): State<SqlitePool>,
    Extension(me): Extension<UserProfile>,
    AppQuery(params): AppQuery<SuggestedParams>,
) -> Result<impl IntoResponse, AppError> {
    let take = params.window().min(SUGGESTED_SAMPLE_SIZE);

    let users = sqlx::query_as::<_, User>(&format!(
        r#"
        SELECT {}
        FROM users
        WHERE id <> ?
          AND id NOT IN (SELECT following_id FROM follows WHERE follower_id = ?)
        ORDER BY RANDOM()
        LIMIT ?
        "#,
        USER_COLUMNS
    ))
    .bind(&me.id)
    .bind(&me.id)
    .bind(take as i64)
    .fetch_all(&pool)
    .await?;

    let users = db::profiles_for(&pool, users).await?;

    Ok(Json(json!({ "success": true, "users": users })))
}

/// `POST /users/follow/{id}`
pub async fn follow_unfollow_user(
    State(pool): State<SqlitePool>,
    Extension(me): Extension<UserProfile>,
    AppPath(id): AppPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let message = match toggle_follow(&pool, &me.id, &id).await? {
        FollowOutcome::Followed => "Followed successfully",
        FollowOutcome::Unfollowed => "Unfollowed successfully",
    };

    Ok(Json(json!({ "success": true, "message": message })))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn discard_images(blobs: &dyn BlobStore, config: &Config, urls: &[String]) {
    for url in urls.iter().filter(|url| !url.is_empty()) {
        remove_image(blobs, config.blob_timeout, url).await;
    }
}

/// `POST /users/update`
///
/// Profile fields, an optional password change (current + new, both or
/// neither) and optional profile/cover image replacement. New images are
/// uploaded before the record is saved; the old blobs are removed only once
/// the new URLs are stored, and the new ones are removed if saving fails.
pub async fn update_user(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    State(blobs): State<Arc<dyn BlobStore>>,
    Extension(me): Extension<UserProfile>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut user = db::fetch_user_by_id(&pool, &me.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    match (non_empty(payload.current_password), non_empty(payload.new_password)) {
        (None, None) => {}
        (Some(current), Some(new)) => {
            if !verify_password(&current, &user.password)? {
                return Err(AppError::BadRequest("Current password is incorrect.".to_string()));
            }
            if new.len() < MIN_PASSWORD_LEN {
                return Err(AppError::BadRequest(
                    "New password must be at least 4 characters long.".to_string(),
                ));
            }
            if new == current {
                return Err(AppError::BadRequest(
                    "New password cannot be the same as current password.".to_string(),
                ));
            }
            user.password = hash_password(&new)?;
        }
        _ => {
            return Err(AppError::BadRequest(
                "Please provide both current and new password or none.".to_string(),
            ));
        }
    }

    if let Some(email) = non_empty(payload.email) {
        validate_email_format(&email)
            .map_err(|_| AppError::BadRequest("Invalid email format".to_string()))?;
        user.email = email;
    }
    if let Some(user_name) = non_empty(payload.user_name) {
        user.user_name = user_name;
    }
    if let Some(full_name) = non_empty(payload.full_name) {
        user.full_name = full_name;
    }
    if let Some(bio) = non_empty(payload.bio) {
        user.bio = bio;
    }
    if let Some(link) = non_empty(payload.link) {
        user.link = link;
    }

    let mut stale_images = Vec::new();
    let mut fresh_images = Vec::new();
    if let Some(img) = non_empty(payload.profile_img) {
        let url = upload_image(blobs.as_ref(), config.blob_timeout, "profile", &img).await?;
        fresh_images.push(url.clone());
        stale_images.push(std::mem::replace(&mut user.profile_img, url));
    }
    if let Some(img) = non_empty(payload.cover_img) {
        let url = match upload_image(blobs.as_ref(), config.blob_timeout, "cover", &img).await {
            Ok(url) => url,
            Err(e) => {
                discard_images(blobs.as_ref(), &config, &fresh_images).await;
                return Err(e);
            }
        };
        fresh_images.push(url.clone());
        stale_images.push(std::mem::replace(&mut user.cover_img, url));
    }

    let saved = sqlx::query(
        r#"
        UPDATE users
        SET user_name = ?, full_name = ?, email = ?, password = ?, bio = ?, link = ?,
            profile_img = ?, cover_img = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.user_name)
    .bind(&user.full_name)
    .bind(&user.email)
    .bind(&user.password)
    .bind(&user.bio)
    .bind(&user.link)
    .bind(&user.profile_img)
    .bind(&user.cover_img)
    .bind(Utc::now())
    .bind(&user.id)
    .execute(&pool)
    .await;

    if let Err(e) = saved {
        // The record still points at the old images.
        discard_images(blobs.as_ref(), &config, &fresh_images).await;
        return Err(if is_unique_violation(&e, "users.user_name") {
            AppError::BadRequest("User name already taken.".to_string())
        } else if is_unique_violation(&e, "users.email") {
            AppError::BadRequest("Email already taken.".to_string())
        } else {
            tracing::error!("Failed to update user {}: {:?}", user.id, e);
            AppError::from(e)
        });
    }

    discard_images(blobs.as_ref(), &config, &stale_images).await;

    let profile = db::fetch_profile(&pool, &user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    tracing::info!("User {} updated their profile", user.id);

    Ok(Json(json!({
        "success": true,
        "message": "User updated successfully",
        "user": profile,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{count_notifications, file_pool, insert_user, memory_pool};

    async fn profile(pool: &SqlitePool, id: &str) -> UserProfile {
        db::fetch_profile(pool, id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn follow_updates_both_sides_and_notifies() {
        let pool = memory_pool().await;
        let ann = insert_user(&pool, "ann").await;
        let bob = insert_user(&pool, "bob").await;

        let outcome = toggle_follow(&pool, &ann, &bob).await.unwrap();
        assert_eq!(outcome, FollowOutcome::Followed);

        assert_eq!(profile(&pool, &ann).await.following, vec![bob.clone()]);
        assert_eq!(profile(&pool, &bob).await.followers, vec![ann.clone()]);
        assert_eq!(count_notifications(&pool, &bob).await, 1);
    }

    #[tokio::test]
    async fn follow_then_unfollow_restores_state() {
        let pool = memory_pool().await;
        let ann = insert_user(&pool, "ann").await;
        let bob = insert_user(&pool, "bob").await;

        let before_ann = profile(&pool, &ann).await;
        let before_bob = profile(&pool, &bob).await;

        toggle_follow(&pool, &ann, &bob).await.unwrap();
        let outcome = toggle_follow(&pool, &ann, &bob).await.unwrap();
        assert_eq!(outcome, FollowOutcome::Unfollowed);

        let after_ann = profile(&pool, &ann).await;
        let after_bob = profile(&pool, &bob).await;
        assert_eq!(before_ann.following, after_ann.following);
        assert_eq!(before_ann.followers, after_ann.followers);
        assert_eq!(before_bob.following, after_bob.following);
        assert_eq!(before_bob.followers, after_bob.followers);

        // Unfollow leaves the earlier notification alone and adds none.
        assert_eq!(count_notifications(&pool, &bob).await, 1);
    }

    #[tokio::test]
    async fn self_follow_is_rejected() {
        let pool = memory_pool().await;
        let ann = insert_user(&pool, "ann").await;

        let err = toggle_follow(&pool, &ann, &ann).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(profile(&pool, &ann).await.following.is_empty());
    }

    #[tokio::test]
    async fn unknown_target_is_not_found() {
        let pool = memory_pool().await;
        let ann = insert_user(&pool, "ann").await;

        let err = toggle_follow(&pool, &ann, "missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_toggles_never_half_apply() {
        let pool = memory_pool().await;
        let ann = insert_user(&pool, "ann").await;
        let bob = insert_user(&pool, "bob").await;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                let (ann, bob) = (ann.clone(), bob.clone());
                tokio::spawn(async move { toggle_follow(&pool, &ann, &bob).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        // Four flips land back on "not following", on both sides.
        assert!(profile(&pool, &ann).await.following.is_empty());
        assert!(profile(&pool, &bob).await.followers.is_empty());
    }

    #[tokio::test]
    async fn concurrent_toggles_serialize_across_connections() {
        let db = file_pool().await;
        let pool = db.pool.clone();
        let ann = insert_user(&pool, "ann").await;
        let bob = insert_user(&pool, "bob").await;

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let pool = pool.clone();
                let (ann, bob) = (ann.clone(), bob.clone());
                tokio::spawn(async move { toggle_follow(&pool, &ann, &bob).await })
            })
            .collect();

        let mut followed = 0;
        for h in handles {
            if h.await.unwrap().unwrap() == FollowOutcome::Followed {
                followed += 1;
            }
        }

        // Every toggle landed and they alternated: an even count ends unfollowed.
        assert_eq!(followed, 10);
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM follows")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
        assert!(profile(&pool, &ann).await.following.is_empty());
        assert!(profile(&pool, &bob).await.followers.is_empty());
        assert_eq!(count_notifications(&pool, &bob).await, 10);
    }
}
