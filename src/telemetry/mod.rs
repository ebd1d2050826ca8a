//! Telemetry side-channel.
//!
//! Metric records travel as one JSON object per line over a dedicated TCP
//! connection, separate from the echo traffic:
//!
//! ```text
//! {"timestamp":1700000000000,"name":"ping","value":7.25}\n
//! ```
//!
//! The emitting process listens and accepts exactly one consumer. Any number
//! of producers (periodic emitters, connection handlers) push records into a
//! `TelemetrySink`; a single writer task owns the socket, so lines never
//! interleave. Once that writer fails the channel is closed for good and
//! every producer sees `TelemetryError::ChannelClosed`. Nothing is buffered
//! for a consumer that has not connected yet.

pub mod channel;
pub mod clock;
pub mod emitter;
pub mod reader;

pub use channel::{serve_one, TelemetrySink};
pub use clock::{Clock, SystemClock};
pub use emitter::Emitter;
pub use reader::{print_records, MetricReader};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::config::TelemetryOptions;

/// A timestamped named sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub name: String,
    pub value: f64,
}

impl MetricRecord {
    pub fn new(timestamp: i64, name: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp,
            name: name.into(),
            value,
        }
    }
}

/// Telemetry errors
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to encode metric record: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode metric record: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("telemetry i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("telemetry channel closed")]
    ChannelClosed,
    #[error("telemetry queue full")]
    Backlogged,
    #[error("metric record line too long")]
    RecordTooLong,
}

/// Bind the telemetry listener and start the channel.
///
/// Binding failure is returned to the caller; everything after that runs in
/// background tasks.
pub async fn start(options: &TelemetryOptions) -> std::io::Result<TelemetrySink> {
    let listener = TcpListener::bind(&options.listen).await?;
    start_with_listener(listener, options)
}

/// Start the channel on an already bound listener.
///
/// Spawns the single writer, which waits for one consumer, and one emitter
/// per configured series. Emitters only start ticking once the consumer is
/// attached, so its first record carries a fresh timestamp. The returned
/// sink is for request-tied producers.
pub fn start_with_listener(
    listener: TcpListener,
    options: &TelemetryOptions,
) -> std::io::Result<TelemetrySink> {
    info!(
        address = %listener.local_addr()?,
        series = options.series.len(),
        interval_ms = options.interval.as_millis() as u64,
        "Telemetry channel listening"
    );

    let (sink, rx) = TelemetrySink::channel(options.queue_capacity);
    let (connected_tx, connected_rx) = oneshot::channel();

    tokio::spawn(async move {
        match serve_one(listener, rx, connected_tx).await {
            Ok(count) => info!(count, "Telemetry channel finished"),
            Err(e) => error!(error = %e, "Telemetry channel failed"),
        }
    });

    let series = options.series.clone();
    let interval = options.interval;
    let emitter_sink = sink.clone();
    tokio::spawn(async move {
        if connected_rx.await.is_err() {
            return;
        }
        for series in &series {
            let emitter = Emitter::new(series, interval, SystemClock, StdRng::from_entropy());
            let sink = emitter_sink.clone();
            let name = series.name.clone();
            tokio::spawn(async move {
                match emitter.run(sink).await {
                    Ok(never) => match never {},
                    Err(e) => warn!(series = %name, error = %e, "Telemetry emitter stopped"),
                }
            });
        }
    });

    Ok(sink)
}
