//! Logging setup
//!
//! Installs the global tracing subscriber. Library code only emits events
//! through the `tracing` macros; the embedding service decides where they go.

use anyhow::anyhow;
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "cache_layer=info";

/// Initializes the global tracing subscriber.
///
/// `production` emits one JSON object per event with ISO-8601 timestamps,
/// any other environment gets coloured human-readable output.
/// Fails if a global subscriber is already installed.
pub fn init(environment: &str) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let result = if environment == "production" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_ansi(true))
            .try_init()
    };

    result.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}

/// Span tagging every event emitted inside it with the owning service.
pub fn service_span(service: &str) -> Span {
    tracing::info_span!("service", service = %service)
}

/// Span carrying the request id, and the user id once it is known.
///
/// Events inside it inherit both fields, so the JSON output can be filtered
/// per request. An anonymous request leaves `user_id` empty; it can be
/// recorded later with `span.record("user_id", id)`.
pub fn request_span(request_id: &str, user_id: Option<i64>) -> Span {
    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        user_id = tracing::field::Empty
    );
    if let Some(user_id) = user_id {
        span.record("user_id", user_id);
    }
    span
}
