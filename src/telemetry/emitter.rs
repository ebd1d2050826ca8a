//! Periodic synthetic metric emitter.

use rand::Rng;
use std::convert::Infallible;
use std::ops::Range;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::trace;

use super::{Clock, MetricRecord, TelemetryError, TelemetrySink};
use crate::config::SeriesConfig;

/// Produces one record per tick for a single named series.
///
/// Time and randomness are both injected so a seeded RNG and a fixed clock
/// give fully deterministic output.
pub struct Emitter<C, R> {
    name: String,
    range: Range<f64>,
    interval: Duration,
    clock: C,
    rng: R,
}

impl<C: Clock, R: Rng> Emitter<C, R> {
    pub fn new(series: &SeriesConfig, interval: Duration, clock: C, rng: R) -> Self {
        Self {
            name: series.name.clone(),
            range: series.min..series.max,
            interval,
            clock,
            rng,
        }
    }

    /// Build the next record.
    pub fn sample(&mut self) -> MetricRecord {
        let value = if self.range.is_empty() {
            self.range.start
        } else {
            self.rng.gen_range(self.range.clone())
        };
        MetricRecord::new(self.clock.now_millis(), self.name.as_str(), value)
    }

    /// Emit one record per interval until the channel closes.
    ///
    /// Only returns once the channel is closed, which is terminal.
    pub async fn run(mut self, sink: TelemetrySink) -> Result<Infallible, TelemetryError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let record = self.sample();
            trace!(name = %record.name, value = record.value, "Emitting metric");
            sink.send(record).await?;
        }
    }
}
