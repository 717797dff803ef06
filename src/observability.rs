//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Structured logging with configurable levels (JSON or pretty)
//! - Metrics collection and Prometheus export
//! - Liveness endpoint next to the metrics endpoint

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;

use crate::config::ObservabilityConfig;

/// Initialize logging and metrics; starts the metrics server when export is enabled
pub async fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    init_tracing(config)?;
    let metrics_handle = init_metrics(config)?;

    if config.enable_metrics_export {
        start_metrics_server(metrics_handle, config.metrics_port).await?;
    }

    tracing::info!(
        environment = %config.environment,
        metrics_export = %config.enable_metrics_export,
        metrics_port = %config.metrics_port,
        "Observability stack initialized successfully"
    );
    Ok(())
}

/// Initialize structured logging with tracing and configuration
fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("stashbot={}", config.log_level.to_lowercase()).parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("teloxide=warn".parse()?);

    // Pretty for development, JSON otherwise
    if config.is_development() || config.log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .init();
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        "Tracing initialized with structured logging"
    );
    Ok(())
}

fn init_metrics(config: &ObservabilityConfig) -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    tracing::info!(
        metrics_enabled = %config.enable_metrics_export,
        "Metrics collection initialized"
    );
    Ok(handle)
}

async fn start_metrics_server(metrics_handle: PrometheusHandle, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on {}", addr);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let metrics_handle = metrics_handle.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = hyper::service::service_fn(
                            move |req: hyper::Request<hyper::body::Incoming>| {
                                let metrics_handle = metrics_handle.clone();
                                async move {
                                    match (req.method(), req.uri().path()) {
                                        (&hyper::Method::GET, "/metrics") => {
                                            Ok::<_, std::convert::Infallible>(hyper::Response::new(
                                                metrics_handle.render(),
                                            ))
                                        }
                                        (&hyper::Method::GET, "/health/live") => {
                                            Ok(hyper::Response::new("OK".to_string()))
                                        }
                                        _ => {
                                            let mut response =
                                                hyper::Response::new("Not Found".to_string());
                                            *response.status_mut() = hyper::StatusCode::NOT_FOUND;
                                            Ok(response)
                                        }
                                    }
                                }
                            },
                        );

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                        {
                            tracing::error!("Error serving connection: {:?}", err);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Error accepting connection: {}", e);
                }
            }
        }
    });

    Ok(())
}

/// Create a span for Telegram bot operations
pub fn telegram_span(operation: &str, user_id: Option<i64>) -> tracing::Span {
    tracing::info_span!(
        "telegram_operation",
        operation = operation,
        user_id = user_id,
        component = "telegram"
    )
}

/// Count one inbound event by kind
pub fn record_event(kind: &'static str) {
    metrics::counter!("bot_events_total", "kind" => kind).increment(1);
}

pub fn record_rate_limited() {
    metrics::counter!("bot_rate_limited_total").increment(1);
}

pub fn record_sessions_expired(count: usize) {
    metrics::counter!("sessions_expired_total").increment(count as u64);
}

/// Record one background-removal call and how long it took
pub fn record_removal_api(outcome: &'static str, duration: Duration) {
    metrics::counter!("removal_api_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("removal_api_duration_seconds").record(duration.as_secs_f64());
}

pub fn set_active_sessions(count: usize) {
    metrics::gauge!("active_sessions").set(count as f64);
}
