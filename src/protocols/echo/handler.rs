//! Echo protocol handler for the Tokio runtime.

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tracing::{debug, trace};

use super::parser::{self, FrameError, ParseResult, MAX_FRAME_LEN};
use crate::telemetry::{Clock, MetricRecord, SystemClock, TelemetryError, TelemetrySink};

/// Series name for records published once per echoed frame.
pub const ECHO_SERIES: &str = "echo";

/// Errors that end an echo exchange.
#[derive(Debug, Error)]
pub enum EchoError {
    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("echo mismatch: sent {sent}, received {received}")]
    Mismatch { sent: i64, received: i64 },
    #[error("connection closed before a response arrived")]
    Closed,
}

/// Read one frame.
///
/// Returns `Ok(None)` when the peer closes cleanly at a frame boundary.
/// `line` is scratch space reused across calls.
pub async fn read_frame<R>(reader: &mut R, line: &mut Vec<u8>) -> Result<Option<i64>, EchoError>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();

    let n = (&mut *reader)
        .take(MAX_FRAME_LEN as u64)
        .read_until(b'\n', line)
        .await?;
    if n == 0 {
        return Ok(None);
    }

    match parser::parse(line) {
        ParseResult::Complete(value, _) => Ok(Some(value)),
        ParseResult::Invalid(e) => Err(e.into()),
        ParseResult::Incomplete => Err(FrameError::Truncated(line.len()).into()),
    }
}

/// Write one frame and flush it. `out` is scratch space reused across calls.
pub async fn write_frame<W>(writer: &mut W, value: i64, out: &mut BytesMut) -> Result<(), EchoError>
where
    W: AsyncWrite + Unpin,
{
    out.clear();
    parser::encode(value, out);
    writer.write_all(out).await?;
    writer.flush().await?;
    Ok(())
}

/// Handle an echo protocol connection.
///
/// Reads one integer per line and writes it straight back until the peer
/// closes or an error occurs. Returns the number of frames echoed.
///
/// With a telemetry sink attached, every echoed frame is also published as
/// an `echo` record. Publishing never holds up or fails the echo path.
pub async fn handle_connection<S>(
    stream: S,
    telemetry: Option<TelemetrySink>,
) -> Result<u64, EchoError>
where
    S: AsyncRead + AsyncWrite,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut line = Vec::with_capacity(32);
    let mut out = BytesMut::with_capacity(32);
    let mut echoed = 0;

    loop {
        let Some(value) = read_frame(&mut reader, &mut line).await? else {
            trace!("Connection closed by client");
            return Ok(echoed);
        };
        trace!(value, "Received frame");

        write_frame(&mut writer, value, &mut out).await?;
        echoed += 1;
        trace!(value, "Sent frame");

        if let Some(sink) = &telemetry {
            let record = MetricRecord::new(SystemClock.now_millis(), ECHO_SERIES, value as f64);
            match sink.publish(record) {
                Ok(()) => {}
                Err(TelemetryError::Backlogged) => trace!("Telemetry queue full, record dropped"),
                Err(e) => debug!(error = %e, "Telemetry record not published"),
            }
        }
    }
}
