// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging and delivery metrics.
//!
//! - **Tracing**: structured logs for registrations, transitions and delivery
//!   failures. Phone numbers are masked before they reach a log line.
//! - **Metrics**: per-channel delivery counters and lifecycle transition counts.
//!
//! # Usage
//!
//! ```rust,ignore
//! use courier::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::cli())?;
//! ```

mod init;
pub mod metrics;

pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{
    ChannelMetrics, Metrics, MetricsSnapshot, OperationMetrics, Transition, GLOBAL_METRICS,
};
