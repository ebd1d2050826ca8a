//! Single-writer funnel for the telemetry connection.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, info, trace};

use super::{MetricRecord, TelemetryError};

/// Default number of records queued ahead of the writer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Producer handle for the telemetry channel.
///
/// Cheap to clone. Every clone feeds the same bounded queue, drained by one
/// writer task.
#[derive(Debug, Clone)]
pub struct TelemetrySink {
    tx: mpsc::Sender<MetricRecord>,
}

impl TelemetrySink {
    /// Create a sink and the receiving end to hand to `write_records`.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<MetricRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a record, waiting for room if the queue is full.
    pub async fn send(&self, record: MetricRecord) -> Result<(), TelemetryError> {
        self.tx
            .send(record)
            .await
            .map_err(|_| TelemetryError::ChannelClosed)
    }

    /// Queue a record without waiting.
    pub fn publish(&self, record: MetricRecord) -> Result<(), TelemetryError> {
        self.tx.try_send(record).map_err(|e| match e {
            TrySendError::Full(_) => TelemetryError::Backlogged,
            TrySendError::Closed(_) => TelemetryError::ChannelClosed,
        })
    }

    /// True once the writer has stopped.
    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Append one JSON line for `record` to `output`.
pub fn encode_line(record: &MetricRecord, output: &mut BytesMut) -> Result<(), TelemetryError> {
    let json = serde_json::to_vec(record).map_err(TelemetryError::Encode)?;
    output.reserve(json.len() + 1);
    output.put_slice(&json);
    output.put_u8(b'\n');
    Ok(())
}

/// Drain queued records into `writer`, one JSON line each.
///
/// Returns the number of records written once every sink has been dropped.
/// An encode or write failure ends the writer; dropping the receiver closes
/// the channel for all producers.
pub async fn write_records<W>(
    mut rx: mpsc::Receiver<MetricRecord>,
    mut writer: W,
) -> Result<u64, TelemetryError>
where
    W: AsyncWrite + Unpin,
{
    let mut line = BytesMut::with_capacity(256);
    let mut written = 0;

    while let Some(record) = rx.recv().await {
        line.clear();
        encode_line(&record, &mut line)?;
        writer.write_all(&line).await?;
        writer.flush().await?;
        written += 1;
        trace!(name = %record.name, timestamp = record.timestamp, "Telemetry record written");
    }

    Ok(written)
}

/// Accept exactly one consumer on `listener` and stream records to it.
///
/// Records queued while nobody was listening are stale and are discarded.
/// `connected` fires once the consumer is attached; it is dropped unfired if
/// accepting fails.
pub async fn serve_one(
    listener: TcpListener,
    mut rx: mpsc::Receiver<MetricRecord>,
    connected: oneshot::Sender<()>,
) -> Result<u64, TelemetryError> {
    let (stream, peer) = listener.accept().await?;
    drop(listener);
    info!(peer = %peer, "Telemetry consumer connected");

    let mut stale = 0u64;
    while rx.try_recv().is_ok() {
        stale += 1;
    }
    if stale > 0 {
        debug!(stale, "Discarded records queued before the consumer connected");
    }

    stream.set_nodelay(true)?;
    let _ = connected.send(());
    write_records(rx, stream).await
}
