// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    handlers::{auth, health, notifications, posts, users},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Public: signup, login, logout, health and the uploaded blobs.
/// * Everything else sits behind the session-cookie access guard.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir));

    let user_routes = Router::new()
        .route("/profile/{user_name}", get(users::get_user_profile))
        .route("/suggested", get(users::get_suggested_users))
        .route("/follow/{id}", post(users::follow_unfollow_user))
        .route("/update", post(users::update_user));

    let post_routes = Router::new()
        .route("/create", post(posts::create_post))
        .route("/allposts", get(posts::get_all_posts))
        .route("/following", get(posts::get_following_posts))
        .route("/user-posts/{user_name}", get(posts::get_user_posts))
        .route("/delete/{post_id}", delete(posts::delete_post))
        .route("/comment/{post_id}", post(posts::comment_on_post))
        .route("/like/{post_id}", post(posts::like_unlike_post))
        .route("/all-liked-posts/{user_id}", get(posts::get_liked_posts));

    // `/notifications` and `/notifications/` both list.
    let protected_routes = Router::new()
        .route("/auth/me", get(auth::get_me))
        .nest("/users", user_routes)
        .nest("/posts", post_routes)
        .route("/notifications", get(notifications::get_notifications))
        .route("/notifications/", get(notifications::get_notifications))
        .route(
            "/notifications/delete-one/{id}",
            delete(notifications::delete_notification),
        )
        .route(
            "/notifications/delete-all",
            delete(notifications::delete_all_notifications),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
