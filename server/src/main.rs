//! goms server: settings from env, config from a directory, staged boot, then serve.
//!
//! Run from repo root: `cargo run -p goms-server`

use goms::{
    app_routes, boot, ensure_database_exists, load_from_dir, spawn_import, Backends, PerformerSet, Settings,
    TenantRouter,
};
use axum::http::{header, HeaderValue, Method};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
};

/// Any origin when none are configured, otherwise only the listed ones.
fn cors_layer(settings: &Settings) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION]);
    if settings.cors_origins.is_empty() {
        tracing::info!("CORS: allowing any origin");
        return cors.allow_origin(Any);
    }
    tracing::info!(origins = ?settings.cors_origins, "CORS: allowing configured origins");
    let origins: Vec<HeaderValue> = settings
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    cors.allow_origin(origins)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("goms=info,goms_server=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    ensure_database_exists(&settings.database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await?;

    let config = load_from_dir(&settings.config_path).await?;
    let booted = boot(
        &config,
        &settings.data_schema,
        Backends::postgres(pool),
        &PerformerSet::with_builtins(),
    )
    .await?;
    let state = booted.state;

    let app = app_routes(state.clone())
        .layer(RequestBodyLimitLayer::new(settings.body_limit_bytes))
        .layer(TimeoutLayer::new(settings.request_timeout))
        .layer(cors_layer(&settings));
    let app = TenantRouter::new(&config.sites).into_service(app);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("goms listening on http://{}", listener.local_addr()?);

    spawn_import(config.imports, state.registry.clone(), state.rows.clone());
    axum::serve(listener, app).await?;
    Ok(())
}
