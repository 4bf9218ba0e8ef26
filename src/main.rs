//! # Call Relay Backend - Main Application Entry Point
//!
//! Boots the relay server: configuration, logging, the external service
//! client, the session registry and pipelines, and the Actix HTTP server
//! carrying the `/ws` WebSocket endpoint plus the health/metrics surface.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (TOML file + environment)
//! - **state**: shared state and counters for handlers and actors
//! - **protocol**: tagged JSON message types for the WebSocket wire
//! - **session**: call sessions, registry/broadcast bus, audio ingest
//! - **pipeline**: transcription and reply orchestration
//! - **services**: speech/translation/synthesis vendor seam
//! - **spam**: transcript noise filtering
//! - **websocket**: per-connection actor
//! - **health** / **middleware**: ambient HTTP surface

mod config;
mod error;
mod health;
mod language;
mod middleware;
mod pipeline;
mod protocol;
mod services;
mod session;
mod spam;
mod state;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::AppConfig;
use pipeline::{ReplyPipeline, TranscriptionPipeline};
use services::OpenAiClient;
use session::{AudioIngest, SessionRegistry};
use spam::{SpamFilter, SpamRules};
use state::AppState;

/// Global shutdown flag flipped by the signal handlers.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting call-relay-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    // The vendor key is the one startup requirement with no fallback:
    // without it no speech service call can succeed, so exit immediately.
    let api_key = env::var(&config.services.api_key_env).map_err(|_| {
        anyhow::anyhow!(
            "ERROR: set {} in the environment (or .env)",
            config.services.api_key_env
        )
    })?;

    let spam_rules = match &config.relay.spam_rules_file {
        Some(path) => {
            info!(path = %path, "Loading spam rules file");
            SpamRules::from_toml_file(path)?
        }
        None => SpamRules::default(),
    };
    let spam = Arc::new(SpamFilter::compile(&spam_rules)?);

    let client = Arc::new(OpenAiClient::new(&config.services, api_key));
    let registry = Arc::new(SessionRegistry::new());

    let transcription = TranscriptionPipeline::new(
        client.clone(),
        client.clone(),
        spam,
        config.relay.display_language_name.clone(),
    );
    let ingest = Arc::new(AudioIngest::new(
        registry.clone(),
        transcription,
        config.relay.min_chunk_bytes,
    ));
    let reply = Arc::new(ReplyPipeline::new(
        registry.clone(),
        client.clone(),
        client,
        config.relay.display_language.clone(),
        config.relay.display_language_name.clone(),
        config.relay.default_audio_mime.clone(),
    ));

    let app_state = AppState::new(config.clone(), registry, ingest, reply);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::RequestMetrics)
            .route("/ws", web::get().to(websocket::relay_websocket))
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/calls/{call_id}", web::get().to(health::call_status)),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize structured logging; `RUST_LOG` overrides the defaults.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_relay_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Flip the shutdown flag on SIGTERM or SIGINT.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Resolve once the shutdown flag is set.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
