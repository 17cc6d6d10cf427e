//! Logging setup for ragchat services.
//!
//! Library crates only emit `tracing` events; the binary that embeds them
//! calls [`init_telemetry`] once at startup. Tests use [`capture_subscriber`]
//! to assert on emitted events without installing a global subscriber.

pub mod capture;

pub use capture::{CapturedEvent, CapturedEvents, EventCaptureLayer};

use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// `LOG_FORMAT=json` selects JSON output; anything else is pretty.
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Filter from `RUST_LOG`, falling back to `info`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Returns an error if a global subscriber is already set; callers that may
/// run more than once can ignore it.
pub fn init_telemetry(
    service_name: &str,
    format: LogFormat,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = Registry::default().with(env_filter());
    match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init()?,
        LogFormat::Json => {
            registry.with(fmt::layer().json().with_current_span(true)).try_init()?
        }
    }
    tracing::info!(service.name = service_name, ?format, "telemetry initialized");
    Ok(())
}

/// A subscriber that records every event into the returned [`CapturedEvents`].
///
/// Install it with `tracing::subscriber::set_default` for the scope of a test.
pub fn capture_subscriber() -> (impl Subscriber + Send + Sync, CapturedEvents) {
    let events = CapturedEvents::new();
    let subscriber = Registry::default().with(EventCaptureLayer::new(events.clone()));
    (subscriber, events)
}
