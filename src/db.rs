// src/db.rs

//! Pool construction and the shared population queries that turn stored rows
//! into API views (author, commenter and sender projections).

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use sqlx::{
    FromRow, QueryBuilder, Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
};

use crate::models::{
    comment::{Comment, CommentView},
    notification::{Notification, NotificationView},
    post::{Post, PostView},
    user::{User, UserProfile},
};

/// Column list matching [`User`].
pub const USER_COLUMNS: &str = "id, user_name, full_name, email, password, bio, link, \
     profile_img, cover_img, role, created_at, updated_at";

/// Column list matching [`Post`].
pub const POST_COLUMNS: &str = "id, user_id, text, img, created_at, updated_at";

/// Ids bound into a single `IN (...)` list. Well under SQLite's host
/// parameter limit.
const MAX_IDS_PER_QUERY: usize = 500;

/// Opens the SQLite pool. `timeout` bounds both connection acquisition and
/// lock waits.
pub async fn connect(database_url: &str, timeout: Duration) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(timeout);

    SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(timeout)
        .connect_with(options)
        .await
}

/// A private in-memory database. Single connection, never recycled, so the
/// data lives as long as the pool.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub async fn fetch_user_by_id(pool: &SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn fetch_user_by_name(pool: &SqlitePool, user_name: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE user_name = ?", USER_COLUMNS))
        .bind(user_name)
        .fetch_optional(pool)
        .await
}

/// Loads one user projection with its relationship sets.
pub async fn fetch_profile(pool: &SqlitePool, id: &str) -> Result<Option<UserProfile>, sqlx::Error> {
    let mut profiles = fetch_profiles(pool, &[id.to_string()]).await?;
    Ok(profiles.remove(id))
}

/// Expands stored users into profiles.
pub async fn profiles_for(pool: &SqlitePool, users: Vec<User>) -> Result<Vec<UserProfile>, sqlx::Error> {
    let ids: Vec<String> = users.iter().map(|u| u.id.clone()).collect();
    let mut profiles = fetch_profiles(pool, &ids).await?;
    Ok(ids.iter().filter_map(|id| profiles.remove(id)).collect())
}

/// Loads user projections keyed by id. Unknown ids are absent from the map.
pub async fn fetch_profiles(
    pool: &SqlitePool,
    ids: &[String],
) -> Result<HashMap<String, UserProfile>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let users: Vec<User> = fetch_by_ids(
        pool,
        &format!("SELECT {} FROM users WHERE id IN (", USER_COLUMNS),
        ids,
        "",
    )
    .await?;

    let mut profiles: HashMap<String, UserProfile> = users
        .into_iter()
        .map(|u| (u.id.clone(), UserProfile::from_user(u)))
        .collect();

    // Relation rows come back in insertion order, which is the set order.
    // Each side is keyed by one column so a user's set never spans chunks.
    let following: Vec<(String, String)> = fetch_by_ids(
        pool,
        "SELECT follower_id, following_id FROM follows WHERE follower_id IN (",
        ids,
        " ORDER BY rowid",
    )
    .await?;
    for (follower, followed) in following {
        if let Some(p) = profiles.get_mut(&follower) {
            p.following.push(followed);
        }
    }

    let followers: Vec<(String, String)> = fetch_by_ids(
        pool,
        "SELECT following_id, follower_id FROM follows WHERE following_id IN (",
        ids,
        " ORDER BY rowid",
    )
    .await?;
    for (followed, follower) in followers {
        if let Some(p) = profiles.get_mut(&followed) {
            p.followers.push(follower);
        }
    }

    let likes: Vec<(String, String)> = fetch_by_ids(
        pool,
        "SELECT user_id, post_id FROM post_likes WHERE user_id IN (",
        ids,
        " ORDER BY rowid",
    )
    .await?;

    for (user_id, post_id) in likes {
        if let Some(p) = profiles.get_mut(&user_id) {
            p.liked_posts.push(post_id);
        }
    }

    Ok(profiles)
}

/// Populates posts (author, likes, comments with their authors), keeping
/// the input order.
pub async fn populate_posts(pool: &SqlitePool, posts: Vec<Post>) -> Result<Vec<PostView>, sqlx::Error> {
    if posts.is_empty() {
        return Ok(Vec::new());
    }
    let post_ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();

    let like_rows: Vec<(String, String)> = fetch_by_ids(
        pool,
        "SELECT post_id, user_id FROM post_likes WHERE post_id IN (",
        &post_ids,
        " ORDER BY rowid",
    )
    .await?;

    let mut likes: HashMap<String, Vec<String>> = HashMap::new();
    for (post_id, user_id) in like_rows {
        likes.entry(post_id).or_default().push(user_id);
    }

    let comment_rows: Vec<Comment> = fetch_by_ids(
        pool,
        "SELECT id, post_id, user_id, text, created_at FROM comments WHERE post_id IN (",
        &post_ids,
        " ORDER BY created_at, rowid",
    )
    .await?;

    let mut user_ids: Vec<String> = posts.iter().map(|p| p.user_id.clone()).collect();
    user_ids.extend(comment_rows.iter().map(|c| c.user_id.clone()));
    user_ids.sort();
    user_ids.dedup();
    let users = fetch_profiles(pool, &user_ids).await?;

    let mut comments: HashMap<String, Vec<CommentView>> = HashMap::new();
    for c in comment_rows {
        if let Some(user) = users.get(&c.user_id) {
            comments.entry(c.post_id).or_default().push(CommentView {
                id: c.id,
                user: user.clone(),
                text: c.text,
                created_at: c.created_at,
            });
        }
    }

    let views = posts
        .into_iter()
        .filter_map(|p| {
            let Some(user) = users.get(&p.user_id) else {
                tracing::warn!("Post {} references missing user {}", p.id, p.user_id);
                return None;
            };
            Some(PostView {
                user: user.clone(),
                likes: likes.remove(&p.id).unwrap_or_default(),
                comments: comments.remove(&p.id).unwrap_or_default(),
                id: p.id,
                text: p.text,
                img: p.img,
                created_at: p.created_at,
                updated_at: p.updated_at,
            })
        })
        .collect();

    Ok(views)
}

/// Populates the sender of each notification, keeping the input order.
pub async fn populate_notifications(
    pool: &SqlitePool,
    notifications: Vec<Notification>,
) -> Result<Vec<NotificationView>, sqlx::Error> {
    let mut sender_ids: Vec<String> = notifications.iter().map(|n| n.from_user.clone()).collect();
    sender_ids.sort();
    sender_ids.dedup();
    let senders = fetch_profiles(pool, &sender_ids).await?;

    Ok(notifications
        .into_iter()
        .filter_map(|n| {
            let from = senders.get(&n.from_user)?.clone();
            Some(NotificationView {
                id: n.id,
                from,
                to: n.to_user,
                kind: n.kind,
                read: n.read,
                created_at: n.created_at,
            })
        })
        .collect())
}

/// Runs `head ?, ?, ...) tail` once per chunk of `ids` and concatenates the
/// rows. Callers key `head` on a single id column, so `tail`'s ordering holds
/// for every id.
async fn fetch_by_ids<T>(
    pool: &SqlitePool,
    head: &str,
    ids: &[String],
    tail: &str,
) -> Result<Vec<T>, sqlx::Error>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let mut rows = Vec::new();
    for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
        let mut qb = QueryBuilder::<Sqlite>::new(head);
        push_id_list(&mut qb, chunk);
        qb.push(tail);
        rows.extend(qb.build_query_as::<T>().fetch_all(pool).await?);
    }
    Ok(rows)
}

/// Pushes `?, ?, ...)` binding every id.
fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[String]) {
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id.clone());
    }
    separated.push_unseparated(")");
}
