use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::user::UserProfile;

/// Represents the 'comments' table in the database.
/// Comments are append-only; the id exists so a comment can be addressed later.
#[derive(Debug, Clone, FromRow)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// DTO for commenting on a post.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(
        min = 1,
        max = 1000,
        message = "Comment must be between 1 and 1000 characters"
    ))]
    #[serde(default)]
    pub comment: String,
}

/// DTO for displaying a comment with its author populated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(rename = "_id")]
    pub id: String,
    pub user: UserProfile,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
