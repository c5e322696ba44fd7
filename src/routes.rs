// src/routes.rs

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::MAX_UPLOAD_BYTES,
    handlers::{admin, auth, downloads, quiz, topics},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, topics, quiz, downloads, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_layer = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        // Protected auth routes
        .merge(
            Router::new()
                .route("/me", get(auth::get_me))
                .layer(auth_layer.clone()),
        );

    let topic_routes = Router::new()
        .route("/", get(topics::list_topics))
        .merge(
            Router::new()
                .route("/{id}/quizzes", get(topics::list_topic_quizzes))
                .layer(auth_layer.clone()),
        );

    let quiz_routes = Router::new()
        .route("/questions", get(quiz::get_questions))
        .route("/attempts", post(quiz::save_attempt))
        .route("/attempts/{id}/questions", get(quiz::get_attempt_questions))
        .route("/stats", get(quiz::get_stats))
        .layer(auth_layer.clone());

    let download_routes = Router::new()
        .route(
            "/upload",
            post(downloads::upload_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024)),
        )
        .route("/url", get(downloads::get_download_url))
        .layer(auth_layer.clone());

    let admin_routes = Router::new()
        .route("/topics", post(admin::create_topic))
        .route("/questions", post(admin::create_question))
        .route("/storage", get(admin::storage_status))
        .route("/storage/reset", post(admin::reset_storage))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(auth_layer);

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/topics", topic_routes)
        .nest("/api/quiz", quiz_routes)
        .nest("/api/downloads", download_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
