pub mod config;
pub mod controllers;
pub mod error;
pub mod extract;
pub mod ids;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod store;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use services::{
    auth::TokenService,
    mailer::{LogMailer, Mailer, SmtpMailer},
    otp::{MemoryOtpStore, OtpStore, RedisOtpStore},
    BookingService, EventService, UserService,
};
use store::{MemoryStore, PgStore, Store};

// Shared state для всего приложения
pub struct AppState {
    pub config: config::Config,
    pub events: EventService,
    pub users: UserService,
    pub bookings: BookingService,
    pub otp: Arc<dyn OtpStore>,
}

impl AppState {
    pub fn from_parts(
        config: config::Config,
        store: Arc<dyn Store>,
        otp: Arc<dyn OtpStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Arc<Self> {
        let users = UserService::new(
            store.clone(),
            otp.clone(),
            mailer,
            TokenService::new(&config.jwt),
            config.security.bcrypt_cost,
            chrono::Duration::seconds(config.otp.ttl_seconds),
        );

        Arc::new(Self {
            events: EventService::new(store.clone()),
            bookings: BookingService::new(store),
            users,
            otp,
            config,
        })
    }

    /// Всё в памяти процесса: для локального запуска и тестов.
    pub fn in_memory(config: config::Config) -> Arc<Self> {
        Self::from_parts(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryOtpStore::new()),
            Arc::new(LogMailer::default()),
        )
    }

    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let store: Arc<dyn Store> = match &config.database.url {
            Some(url) => {
                let pg = PgStore::connect(url, config.database.pool_size).await?;
                info!("Database connected");
                pg.run_migrations().await?;
                Arc::new(pg)
            }
            None => {
                warn!("DATABASE_URL is not set, using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        let otp: Arc<dyn OtpStore> = match &config.redis.url {
            Some(url) => Arc::new(RedisOtpStore::new(redis_client::RedisClient::new(url).await?)),
            None => {
                info!("REDIS_URL is not set, OTP codes are kept in memory");
                Arc::new(MemoryOtpStore::new())
            }
        };

        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
            None => {
                warn!("SMTP_HOST is not set, OTP emails are only logged");
                Arc::new(LogMailer::new(config.app.is_development()))
            }
        };

        let state = Self::from_parts(config, store, otp, mailer);

        if let (Some(email), Some(password)) = (
            state.config.security.admin_email.as_deref(),
            state.config.security.admin_password.as_deref(),
        ) {
            state.users.ensure_admin(email, password).await?;
        }

        Ok(state)
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("CORS: ignoring invalid origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Главный роутер приложения.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.security.cors_allowed_origins);

    Router::new()
        .route("/", get(|| async { "Ticket Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
