pub mod api;
mod config;
mod error;
mod models;
mod providers;
mod resilience;
mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use api::AppState;
use config::Config;
use providers::MetlinkClient;
use resilience::{CircuitBreaker, RetryPolicy};
use services::{Aggregator, BoardCache, FixedWindowLimiter, ResilientFetcher};

#[derive(OpenApi)]
#[openapi(
    info(title = "Wellington Rail Live Departures API", version = "0.1.0"),
    paths(
        api::departures::get_departure_board,
        api::status::get_status,
        api::health::health_check,
    ),
    components(schemas(
        api::departures::BoardResponse,
        api::status::StatusResponse,
        api::health::HealthResponse,
        api::ErrorResponse,
        models::Departure,
        models::DeparturesResult,
        models::Destination,
        models::TimePair,
        models::Direction,
        services::cache::CacheInfo,
        resilience::CircuitBreakerSnapshot,
        resilience::CircuitState,
    )),
    tags(
        (name = "departures", description = "Real-time departure boards"),
        (name = "status", description = "Cache and circuit breaker visibility"),
        (name = "health", description = "Service liveness")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = Config::load("config.yaml").expect("Failed to load config");
    tracing::info!(
        line = %config.line.default_service_id,
        stations = config.line.stations.len(),
        "Loaded configuration"
    );

    // Build CORS layer based on config
    let cors_layer = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode explicitly enabled (all origins allowed) - DO NOT USE IN PRODUCTION");
        CorsLayer::permissive()
    } else if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting to configured origins");
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    // The Metlink API key never lives in the config file
    let api_key =
        std::env::var("METLINK_API_KEY").expect("METLINK_API_KEY environment variable must be set");

    // Assemble the pipeline: one shared breaker guards the single upstream
    let client = MetlinkClient::new(
        &config.upstream.base_url,
        &api_key,
        Duration::from_secs(config.upstream.timeout_secs),
    )
    .expect("Failed to build Metlink client");
    let breaker = Arc::new(CircuitBreaker::from_config(&config.breaker));
    let fetcher = ResilientFetcher::new(
        client,
        breaker.clone(),
        RetryPolicy::from_config(&config.retry),
    );

    let state = AppState {
        aggregator: Arc::new(Aggregator::new(fetcher)),
        cache: Arc::new(BoardCache::new(config.cache.ttl())),
        limiter: Arc::new(FixedWindowLimiter::new(
            config.rate_limit.limit,
            Duration::from_secs(config.rate_limit.window_secs),
        )),
        breaker,
        line: Arc::new(config.line.clone()),
    };

    // Build the app
    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api::router(state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000")
        .await
        .expect("Failed to bind to port 3000");

    tracing::info!("Server running on http://localhost:3000");
    tracing::info!("Swagger UI: http://localhost:3000/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

async fn root() -> &'static str {
    "Wellington Rail Live Departures API"
}
