use std::sync::{Arc, Mutex};

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use skillbridge::config::AppConfig;
use skillbridge::db;
use skillbridge::handlers;
use skillbridge::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/bookings",
            post(handlers::bookings::create_booking).get(handlers::bookings::list_bookings),
        )
        .route(
            "/api/bookings/:id",
            get(handlers::bookings::get_booking).patch(handlers::bookings::update_booking),
        )
        .route("/api/reviews", post(handlers::reviews::create_review))
        .route(
            "/api/reviews/tutor/:tutor_id",
            get(handlers::reviews::tutor_reviews),
        )
        .route("/api/tutors", get(handlers::tutors::list_tutors))
        .route("/api/tutors/:id", get(handlers::tutors::get_tutor))
        .route(
            "/api/tutor/profile",
            get(handlers::tutor::get_profile).put(handlers::tutor::update_profile),
        )
        .route("/api/tutor/stats", get(handlers::tutor::stats))
        .route("/api/admin/users", get(handlers::admin::list_users))
        .route("/api/admin/users/:id", patch(handlers::admin::update_user))
        .route(
            "/api/admin/tutors/:id/verify",
            patch(handlers::admin::verify_tutor),
        )
        .route("/api/admin/bookings", get(handlers::admin::list_bookings))
        .route("/api/admin/stats", get(handlers::admin::stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
