mod ceremony;
mod config;
mod db;
mod error;
mod handlers;
mod mailer;
mod middleware;
mod models;
mod services;

use axum::{
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::ceremony::{CredentialCeremony, WebauthnCeremony};
use crate::config::Config;
use crate::db::Database;
use crate::mailer::{LogMailer, Mailer};
use crate::services::OtpService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub mailer: Arc<dyn Mailer>,
    pub ceremony: Arc<dyn CredentialCeremony>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Bookline auth service...");

    // Load configuration
    let config = Config::load()?;
    let config = Arc::new(config);
    tracing::info!("Configuration loaded");

    // Initialize database
    let db = Database::new(&config.database.path).await?;
    db.run_migrations().await?;
    tracing::info!("Database initialized");

    // Ceremony and delivery capabilities
    let ceremony: Arc<dyn CredentialCeremony> = Arc::new(WebauthnCeremony::from_config(
        &config.passkey,
    )?);
    let mailer: Arc<dyn Mailer> = Arc::new(LogMailer);

    // Expired OTP/challenge garbage collection; validation does not rely on it
    OtpService::spawn_expiry_sweep(
        db.clone(),
        Duration::from_secs(config.otp.sweep_interval_seconds),
    );

    // Create app state
    let state = AppState {
        db,
        config: config.clone(),
        mailer,
        ceremony,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/otp/verify", post(handlers::auth::verify_otp))
        .route("/auth/otp/resend", post(handlers::auth::resend_otp))
        .route(
            "/auth/passkey/login/begin",
            post(handlers::passkey::begin_login),
        )
        .route(
            "/auth/passkey/login/finish",
            post(handlers::passkey::finish_login),
        );

    // Protected routes (auth required)
    let protected_routes = Router::new()
        // Passkey enrollment and registry
        .route(
            "/auth/passkey/enroll/begin",
            post(handlers::passkey::begin_enroll),
        )
        .route(
            "/auth/passkey/enroll/finish",
            post(handlers::passkey::finish_enroll),
        )
        .route("/auth/passkeys", get(handlers::passkey::list_passkeys))
        .route(
            "/auth/passkeys/:id",
            patch(handlers::passkey::rename_passkey).delete(handlers::passkey::delete_passkey),
        )
        // Account
        .route("/account/me", get(handlers::auth::me))
        .route("/account/password", put(handlers::auth::change_password))
        .route("/account/profile", put(handlers::auth::complete_profile))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    // Combine all routes under /api/v1
    Router::new()
        .nest("/api/v1", public_routes.merge(protected_routes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
