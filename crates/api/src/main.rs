mod config;
mod error;
mod handlers;
mod middleware;
mod services;
mod state;
mod stores;
#[cfg(test)]
mod test_utils;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{Router, http, middleware::from_fn_with_state};
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    config::Config,
    middleware::cache::{CacheOptions, ResponseCache, cache_response},
    services::EmailSenderImpl,
    state::AppState,
    stores::{MemoryStore, RedisConnection, Stores},
};

#[derive(Parser)]
#[command(name = "api")]
#[command(about = "Storefront API server")]
struct Args {
    /// Delete every cached response and tag index, then exit (not in production)
    #[arg(long)]
    clear_cache: bool,

    /// Invalidate cached responses under this tag, then exit (repeatable)
    #[arg(long = "invalidate-tag", value_name = "TAG")]
    invalidate_tags: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider before any TLS operations
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let args = Args::parse();
    let config = envy::prefixed("STOREFRONT_").from_env::<Config>()?;

    // Initialize Sentry for error tracking (must be done early, guard must stay alive)
    let _sentry_guard = config.sentry_dsn.as_ref().map(|dsn| {
        sentry::init((
            dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: Some(config.env.clone().into()),
                ..Default::default()
            },
        ))
    });

    // Set up tracing: JSON in production, human-readable otherwise
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.is_production() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }

    let stores = match &config.redis_url {
        Some(url) => {
            let conn = RedisConnection::open(
                url,
                Duration::from_secs(config.redis_connect_timeout_secs),
            )?;
            Stores::redis(Arc::new(conn))
        }
        None if config.is_production() => {
            anyhow::bail!("STOREFRONT_REDIS_URL must be set in production")
        }
        None => {
            tracing::warn!("STOREFRONT_REDIS_URL not set, using in-process store");
            Stores::memory(Arc::new(MemoryStore::new()))
        }
    };

    // Cache maintenance via flags, then exit
    if args.clear_cache || !args.invalidate_tags.is_empty() {
        let result = run_cache_maintenance(&args, &config, &stores).await;
        stores.connection.close().await;
        return result;
    }

    let email = EmailSenderImpl::new(
        config.resend_api_key.clone(),
        config.smtp_url.clone(),
        config.email_from.clone(),
    )?;

    let state = AppState::new(config.clone(), stores.clone(), Arc::new(email));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    stores.connection.close().await;

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn run_cache_maintenance(args: &Args, config: &Config, stores: &Stores) -> Result<()> {
    if !args.invalidate_tags.is_empty() {
        let removed =
            middleware::cache::invalidate_tags_now(stores.cache.as_ref(), &args.invalidate_tags)
                .await?;
        tracing::info!(tags = ?args.invalidate_tags, keys = removed, "tags invalidated");
    }

    if args.clear_cache {
        if config.is_production() {
            anyhow::bail!("--clear-cache scans the whole key space and is disabled in production");
        }
        middleware::cache::clear_all_cache(stores.cache.as_ref()).await?;
    }

    Ok(())
}

/// Full HTTP application: routes, response cache, rate limiting, tracing.
fn app(state: AppState) -> Router {
    let cache = ResponseCache::new(
        state.stores.cache.clone(),
        CacheOptions::default()
            .with_ttl(state.config.cache_ttl_secs)
            .enabled(state.config.cache_enabled),
    );

    // Request ID header name
    let x_request_id = http::HeaderName::from_static("x-request-id");

    let api = Router::new()
        .nest("/otp", handlers::otp::router())
        .fallback(handlers::not_found)
        .layer(from_fn_with_state(cache, cache_response))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ));

    // Health checks stay outside the per-client limiter
    Router::new()
        .nest("/health", handlers::health::router())
        .merge(api)
        .with_state(state)
        // Request ID: generate UUID, include in logs, return in response
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &http::Request<axum::body::Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            },
        ))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .layer(RequestBodyLimitLayer::new(1024 * 1024)) // 1MB limit
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
