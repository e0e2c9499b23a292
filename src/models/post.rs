// src/models/post.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::{comment::CommentView, user::UserProfile};

/// Represents the 'posts' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub text: Option<String>,
    /// URL returned by the blob store; never the raw upload.
    pub img: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A post with its author and comment authors populated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(rename = "_id")]
    pub id: String,
    pub user: UserProfile,
    pub text: Option<String>,
    pub img: Option<String>,
    /// Ids of the users who liked the post, in like order.
    pub likes: Vec<String>,
    pub comments: Vec<CommentView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// DTO for creating a new post. At least one of `text` and `img` must be
/// non-empty.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(max = 10000, message = "Text must be at most 10000 chars"))]
    pub text: Option<String>,

    /// Data URI or bare base64 image.
    pub img: Option<String>,
}

impl CreatePostRequest {
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn img(&self) -> Option<&str> {
        self.img.as_deref().map(str::trim).filter(|i| !i.is_empty())
    }
}

/// Result of a like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    Liked,
    Unliked,
}

/// State of a post's like set after a toggle.
#[derive(Debug, Clone)]
pub struct LikeToggle {
    pub outcome: LikeOutcome,
    pub likes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_count_as_missing() {
        let req = CreatePostRequest {
            text: Some("   ".into()),
            img: Some(String::new()),
        };
        assert_eq!(req.text(), None);
        assert_eq!(req.img(), None);

        let req = CreatePostRequest {
            text: Some(" hello ".into()),
            img: None,
        };
        assert_eq!(req.text(), Some("hello"));
    }
}
