// src/models/user.rs

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
});

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,

    /// Unique handle, distinct from the internal id.
    pub user_name: String,

    pub full_name: String,

    /// Unique email address.
    pub email: String,

    /// Argon2 password hash. Never leaves the server.
    pub password: String,

    pub bio: String,
    pub link: String,
    pub profile_img: String,
    pub cover_img: String,

    /// User role: 'user' or 'admin'.
    pub role: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user as exposed over the API: everything but the password hash, with
/// the relationship sets expanded to ordered id lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_name: String,
    pub full_name: String,
    pub email: String,
    pub bio: String,
    pub link: String,
    pub profile_img: String,
    pub cover_img: String,
    pub followers: Vec<String>,
    pub following: Vec<String>,
    pub liked_posts: Vec<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Projects a stored user, dropping the password hash.
    pub fn from_user(user: User) -> Self {
        Self {
            id: user.id,
            user_name: user.user_name,
            full_name: user.full_name,
            email: user.email,
            bio: user.bio,
            link: user.link,
            profile_img: user.profile_img,
            cover_img: user.cover_img,
            followers: Vec::new(),
            following: Vec::new(),
            liked_posts: Vec::new(),
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Email format check shared by signup and profile updates.
pub fn validate_email_format(email: &str) -> Result<(), ValidationError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::new("email").with_message("Invalid email format".into()))
    }
}

/// DTO for creating a new user (Signup).
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 50, message = "User name must be between 1 and 50 characters."))]
    pub user_name: String,
    #[validate(length(min = 1, max = 100, message = "Full name must be between 1 and 100 characters."))]
    pub full_name: String,
    #[validate(custom(function = "validate_email_format"))]
    pub email: String,
    #[validate(length(min = 4, max = 128, message = "Password must be at least 4 characters long."))]
    pub password: String,
}

/// DTO for user login.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_name: String,
    pub password: String,
}

/// DTO for `POST /users/update`. Every field is optional; empty strings
/// leave the stored value untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub user_name: Option<String>,
    pub link: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    /// Data URI or bare base64 image.
    pub profile_img: Option<String>,
    /// Data URI or bare base64 image.
    pub cover_img: Option<String>,
}

/// Query parameters for `GET /users/suggested`.
#[derive(Debug, Default, Deserialize)]
pub struct SuggestedParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl SuggestedParams {
    /// Number of suggestions to return: `limit * page`, or `page * 4`
    /// when no limit is given. The page grows the window rather than
    /// shifting it ("show more").
    pub fn window(&self) -> usize {
        let page = self.page.filter(|p| *p > 0).unwrap_or(1);
        let window = match self.limit.filter(|l| *l > 0) {
            Some(limit) => limit.saturating_mul(page),
            None => page.saturating_mul(4),
        };
        usize::try_from(window).unwrap_or(usize::MAX)
    }
}
