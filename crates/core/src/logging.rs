//! Logging setup
//!
//! Repository diagnostics (invalid manifests, symbol collisions, cache
//! failures) are `tracing` events. This module installs the subscriber that
//! renders them, as text or as one JSON object per line, always on stderr so
//! stdout stays free for command output.
//!
//! Environment:
//!
//! * `FEATUREKIT_LOG_FORMAT` - `json` selects JSON output when no format is passed
//! * `FEATUREKIT_LOG` - filter directives, `RUST_LOG` is the fallback, `info` the default

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Json,
}

impl Format {
    /// Explicit format wins over `FEATUREKIT_LOG_FORMAT`; unknown values are text
    fn resolve(explicit: Option<&str>, env: Option<&str>) -> Self {
        match explicit.or(env).map(str::to_ascii_lowercase).as_deref() {
            Some("json") => Format::Json,
            _ => Format::Text,
        }
    }
}

/// Install the global subscriber; later calls are no-ops
///
/// ```rust
/// use featurekit_core::logging;
///
/// logging::init(None).expect("Failed to initialize logging");
/// ```
pub fn init(format: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let env_format = std::env::var("FEATUREKIT_LOG_FORMAT").ok();
        let format = Format::resolve(format, env_format.as_deref());
        let filter = env_filter(
            std::env::var("FEATUREKIT_LOG").ok().as_deref(),
            std::env::var("RUST_LOG").ok().as_deref(),
        );

        match format {
            Format::Json => {
                // Closing spans carry the timings of init, read_cache and store_cache
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_current_span(true)
                            .with_span_events(FmtSpan::CLOSE)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            Format::Text => {
                tracing_subscriber::registry()
                    .with(fmt::layer().with_target(true).with_writer(io::stderr))
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!(?format, "Logging initialized");
    });

    Ok(())
}

pub fn is_initialized() -> bool {
    INIT.is_completed()
}

fn env_filter(featurekit_log: Option<&str>, rust_log: Option<&str>) -> EnvFilter {
    let directives = featurekit_log.or(rust_log).unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directives).unwrap_or_else(|e| {
        eprintln!("Ignoring invalid log filter '{directives}': {e}");
        EnvFilter::new(DEFAULT_FILTER)
    })
}
