// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracing subscriber setup for the courier binary.

use std::io;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// How much the process logs and how it looks. `RUST_LOG` always wins over
/// `level`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub level: Level,
    /// Emit span close events (dispatch timings) and source locations.
    pub detailed: bool,
}

impl TelemetryConfig {
    /// `courier -v`: debug level with span timings.
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            detailed: true,
        }
    }

    /// Plain CLI usage: warnings and errors only.
    pub fn cli() -> Self {
        Self {
            level: Level::WARN,
            detailed: false,
        }
    }

    pub fn for_verbosity(verbose: bool) -> Self {
        if verbose {
            Self::development()
        } else {
            Self::cli()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.to_string()))
    }
}

/// Guard returned by [`init_telemetry`]; logs a delivery report when dropped.
pub struct TelemetryGuard {
    _private: (),
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "telemetry")]
        tracing::debug!(
            report = %crate::telemetry::metrics::GLOBAL_METRICS.snapshot().format_report(),
            "Telemetry shutting down"
        );
    }
}

/// Install the global tracing subscriber. Fails if one is already set.
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<TelemetryGuard> {
    let layer = fmt::layer()
        .with_target(config.detailed)
        .with_file(config.detailed)
        .with_line_number(config.detailed)
        .with_span_events(if config.detailed { FmtSpan::CLOSE } else { FmtSpan::NONE });

    let registry = tracing_subscriber::registry().with(config.env_filter());
    let installed = if config.detailed {
        registry.with(layer).try_init()
    } else {
        registry.with(layer.compact()).try_init()
    };
    installed.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    Ok(TelemetryGuard { _private: () })
}
