mod auth;
mod cache;
mod config;
mod db;
mod eligibility;
mod error;
mod notify;
mod plays;
mod routes;
mod shortlist;
mod shows;
mod tracks;
mod votes;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Router,
};
use chrono::Local;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use db::DbPool;
use notify::{LogNotifier, Notifier};
use shows::Scheduler;
use votes::Ledger;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub scheduler: Scheduler<Local>,
    pub ledger: Arc<Ledger>,
    pub notifier: Arc<dyn Notifier>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "requestline=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config
    let config = Config::from_env()?;
    tracing::info!("Starting requestline server");
    tracing::info!("Database: {}", config.database_url);
    tracing::info!(
        "Show cadence: {:?} {} for {} minutes",
        config.cadence.weekday,
        config.cadence.start,
        config.cadence.duration.num_minutes()
    );

    // Connect to database and run migrations
    let pool = db::create_pool(&config.database_url).await?;

    let state = AppState {
        pool: pool.clone(),
        scheduler: Scheduler::new(pool.clone(), config.cadence.clone(), Local),
        ledger: Arc::new(Ledger::new(pool.clone())),
        notifier: Arc::new(LogNotifier::new()),
    };

    // Build router
    let app = Router::new()
        // Accounts
        .route("/signup", post(routes::signup))
        .route("/login", post(routes::login))
        // Shows
        .route("/shows/current", get(routes::current_show))
        .route("/shows/at", get(routes::show_at))
        .route("/shows/{id}", patch(routes::update_show))
        .route("/shows/{id}/requests", get(routes::show_requests))
        .route("/shows/{id}/plays", get(routes::show_plays))
        // Library
        .route("/tracks", post(routes::create_track))
        .route(
            "/tracks/{id}",
            get(routes::get_track).patch(routes::update_track),
        )
        .route("/tracks/{id}/reveal", post(routes::reveal_track))
        .route("/tracks/{id}/hide", post(routes::hide_track))
        .route("/tracks/{id}/archive", post(routes::archive_track))
        .route("/tracks/{id}/eligibility", get(routes::track_eligibility))
        .route("/tracks/{id}/block", post(routes::block_track))
        // Requests
        .route("/request", post(routes::create_request))
        .route("/votes/external", post(routes::external_vote))
        .route("/votes/manual", post(routes::manual_vote))
        // Voter stats
        .route("/me/batting-average", get(routes::batting_average))
        .route("/me/streak", get(routes::streak))
        .route("/remote/{handle}/stats", get(routes::remote_stats))
        // Broadcast control
        .route("/plays", post(routes::create_play))
        .route("/plays/{id}", axum::routing::delete(routes::delete_play))
        // Curation
        .route(
            "/shows/{id}/shortlist",
            get(routes::show_shortlist).post(routes::shortlist_track),
        )
        .route("/shows/{id}/discards", get(routes::show_discards))
        .route("/shows/{id}/discard", post(routes::discard_track))
        .route("/shows/{id}/reorder", post(routes::reorder_shortlist))
        .route("/shows/{id}/reset", post(routes::reset_curation))
        // Admin
        .route("/admin/users/{id}/abusive", post(routes::set_user_abusive))
        .route(
            "/admin/remote/{id}/abusive",
            post(routes::set_remote_abusive),
        )
        // Health check
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Run server
    let listener = tokio::net::TcpListener::bind(&config.bind_address()).await?;
    tracing::info!("REST API: http://{}", config.bind_address());

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
