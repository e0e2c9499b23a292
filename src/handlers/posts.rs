use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::Config,
    db::{self, POST_COLUMNS},
    error::AppError,
    extract::{AppJson, AppPath},
    handlers::notifications::create_notification,
    models::{
        comment::{CommentView, CreateCommentRequest},
        notification::NotificationType,
        post::{CreatePostRequest, LikeOutcome, LikeToggle, Post},
        user::UserProfile,
    },
    utils::{
        blob::{BlobStore, remove_image, upload_image},
        html::clean_html,
    },
};

/// Flips whether `user_id` likes `post_id`.
///
/// `post.likes` and `user.likedPosts` are the same `post_likes` row, so both
/// views move together: remove-if-present, otherwise add-if-absent. The like
/// set is read back inside the transaction. A "like" notification goes to the
/// post owner after commit (the owner included); unliking never touches
/// notifications.
pub async fn toggle_like(pool: &SqlitePool, user_id: &str, post_id: &str) -> Result<LikeToggle, AppError> {
    let mut tx = pool.begin().await?;

    let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = ? AND user_id = ?")
        .bind(post_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let (outcome, owner) = if removed > 0 {
        (LikeOutcome::Unliked, None)
    } else {
        let owner = sqlx::query_scalar::<_, String>("SELECT user_id FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

        sqlx::query(
            "INSERT INTO post_likes (post_id, user_id, created_at) VALUES (?, ?, ?) \
             ON CONFLICT (post_id, user_id) DO NOTHING",
        )
        .bind(post_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        (LikeOutcome::Liked, Some(owner))
    };

    let likes: Vec<String> =
        sqlx::query_scalar("SELECT user_id FROM post_likes WHERE post_id = ? ORDER BY rowid")
            .bind(post_id)
            .fetch_all(&mut *tx)
            .await?;

    tx.commit().await?;

    if let Some(owner) = owner {
        create_notification(pool, NotificationType::Like, user_id, &owner).await;
    }

    Ok(LikeToggle { outcome, likes })
}

async fn fetch_post(pool: &SqlitePool, post_id: &str) -> Result<Post, AppError> {
    sqlx::query_as::<_, Post>(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
        .bind(post_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))
}

/// `POST /posts/create`
/// Text, image or both. The image goes to the blob store; only its URL is kept.
pub async fn create_post(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    State(blobs): State<Arc<dyn BlobStore>>,
    Extension(me): Extension<UserProfile>,
    AppJson(payload): AppJson<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let text = payload.text().map(clean_html).filter(|t| !t.is_empty());
    let img = match payload.img() {
        Some(data) => Some(upload_image(blobs.as_ref(), config.blob_timeout, "posts", data).await?),
        None => None,
    };
    if text.is_none() && img.is_none() {
        return Err(AppError::BadRequest("Text or image is required".to_string()));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query("INSERT INTO posts (id, user_id, text, img, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)")
        .bind(&id)
        .bind(&me.id)
        .bind(&text)
        .bind(&img)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create post: {:?}", e);
            AppError::from(e)
        })?;

    let post = fetch_post(&pool, &id).await?;
    let post = db::populate_posts(&pool, vec![post])
        .await?
        .pop()
        .ok_or_else(|| AppError::InternalServerError(format!("post {} vanished after insert", id)))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Post created successfully",
            "post": post,
        })),
    ))
}

/// `DELETE /posts/delete/{postId}`
/// Requires: author or admin. Cleans up the stored image first; a failed
/// cleanup is logged and does not keep the post alive.
pub async fn delete_post(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    State(blobs): State<Arc<dyn BlobStore>>,
    Extension(me): Extension<UserProfile>,
    AppPath(post_id): AppPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let post = fetch_post(&pool, &post_id).await?;

    if post.user_id != me.id && !me.is_admin() {
        return Err(AppError::Forbidden(
            "You are not authorized to delete this post".to_string(),
        ));
    }

    if let Some(img) = post.img.as_deref().filter(|i| !i.is_empty()) {
        if !remove_image(blobs.as_ref(), config.blob_timeout, img).await {
            tracing::warn!("Post {} deleted with an orphaned image {}", post.id, img);
        }
    }

    // Likes and comments go with the post (ON DELETE CASCADE).
    sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(&post.id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete post: {:?}", e);
            AppError::from(e)
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Post deleted successfully",
    })))
}

/// `POST /posts/comment/{postId}`
pub async fn comment_on_post(
    State(pool): State<SqlitePool>,
    Extension(me): Extension<UserProfile>,
    AppPath(post_id): AppPath<String>,
    AppJson(payload): AppJson<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let post = fetch_post(&pool, &post_id).await?;

    if payload.comment.trim().is_empty() {
        return Err(AppError::BadRequest("Comment is required".to_string()));
    }
    payload.validate()?;

    let text = clean_html(payload.comment.trim());
    let id = Uuid::new_v4().to_string();
    let created_at = Utc::now();

    sqlx::query("INSERT INTO comments (id, post_id, user_id, text, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&id)
        .bind(&post.id)
        .bind(&me.id)
        .bind(&text)
        .bind(created_at)
        .execute(&pool)
        .await?;

    sqlx::query("UPDATE posts SET updated_at = ? WHERE id = ?")
        .bind(created_at)
        .bind(&post.id)
        .execute(&pool)
        .await?;

    let comment = CommentView {
        id,
        user: me,
        text,
        created_at,
    };

    Ok(Json(json!({
        "success": true,
        "message": "Comment added successfully",
        "comment": comment,
    })))
}

/// `POST /posts/like/{postId}`
pub async fn like_unlike_post(
    State(pool): State<SqlitePool>,
    Extension(me): Extension<UserProfile>,
    AppPath(post_id): AppPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let toggle = toggle_like(&pool, &me.id, &post_id).await?;

    let message = match toggle.outcome {
        LikeOutcome::Liked => "Post liked successfully",
        LikeOutcome::Unliked => "Post unliked successfully",
    };

    Ok(Json(json!({
        "success": true,
        "message": message,
        "likesCount": toggle.likes.len(),
        "likes": toggle.likes,
    })))
}

/// `GET /posts/allposts`
/// Newest first, authors and commenters populated.
pub async fn get_all_posts(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let posts = sqlx::query_as::<_, Post>(&format!(
        "SELECT {} FROM posts ORDER BY created_at DESC, rowid DESC",
        POST_COLUMNS
    ))
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list posts: {:?}", e);
        AppError::from(e)
    })?;

    let posts = db::populate_posts(&pool, posts).await?;

    Ok(Json(json!({ "success": true, "posts": posts })))
}

/// `GET /posts/following`
/// Posts by the users the caller follows.
pub async fn get_following_posts(
    State(pool): State<SqlitePool>,
    Extension(me): Extension<UserProfile>,
) -> Result<impl IntoResponse, AppError> {
    let posts = sqlx::query_as::<_, Post>(&format!(
        r#"
        SELECT {}
        FROM posts
        WHERE user_id IN (SELECT following_id FROM follows WHERE follower_id = ?)
        ORDER BY created_at DESC, rowid DESC
        "#,
        POST_COLUMNS
    ))
    .bind(&me.id)
    .fetch_all(&pool)
    .await?;

    let posts = db::populate_posts(&pool, posts).await?;

    Ok(Json(json!({ "success": true, "feedPosts": posts })))
}

/// `GET /posts/user-posts/{userName}`
pub async fn get_user_posts(
    State(pool): State<SqlitePool>,
    AppPath(user_name): AppPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = db::fetch_user_by_name(&pool, &user_name)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let posts = sqlx::query_as::<_, Post>(&format!(
        "SELECT {} FROM posts WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
        POST_COLUMNS
    ))
    .bind(&user.id)
    .fetch_all(&pool)
    .await?;

    let posts = db::populate_posts(&pool, posts).await?;

    Ok(Json(json!({ "success": true, "posts": posts })))
}

/// `GET /posts/all-liked-posts/{userId}`
pub async fn get_liked_posts(
    State(pool): State<SqlitePool>,
    AppPath(user_id): AppPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = db::fetch_user_by_id(&pool, &user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let posts = sqlx::query_as::<_, Post>(
        r#"
        SELECT p.id, p.user_id, p.text, p.img, p.created_at, p.updated_at
        FROM posts p
        JOIN post_likes l ON l.post_id = p.id
        WHERE l.user_id = ?
        ORDER BY p.created_at DESC, p.rowid DESC
        "#,
    )
    .bind(&user.id)
    .fetch_all(&pool)
    .await?;

    let posts = db::populate_posts(&pool, posts).await?;

    Ok(Json(json!({ "success": true, "likedPosts": posts })))
}
