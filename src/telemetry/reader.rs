//! Line-oriented consumer for a telemetry connection.

use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpStream;

use super::{MetricRecord, TelemetryError};

/// Longest record line accepted, newline included.
pub const MAX_RECORD_LEN: usize = 64 * 1024;

/// Decodes one `MetricRecord` per line.
///
/// TCP gives no message boundaries, so records are split on `\n` rather
/// than on whatever chunk a single read happens to return.
pub struct MetricReader<R> {
    reader: R,
    line: Vec<u8>,
}

impl MetricReader<BufReader<TcpStream>> {
    /// Dial a telemetry source.
    pub async fn connect(addr: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(BufReader::new(stream)))
    }
}

impl<R: AsyncBufRead + Unpin> MetricReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(128),
        }
    }

    /// Next record, or `None` once the source closes.
    ///
    /// Blank lines are skipped. A line that is not a valid record, or runs
    /// past `MAX_RECORD_LEN` without a newline, is an error; the stream is
    /// not trusted after that.
    pub async fn next_record(&mut self) -> Result<Option<MetricRecord>, TelemetryError> {
        loop {
            self.line.clear();
            let n = (&mut self.reader)
                .take(MAX_RECORD_LEN as u64)
                .read_until(b'\n', &mut self.line)
                .await?;
            if n == 0 {
                return Ok(None);
            }
            if n == MAX_RECORD_LEN && self.line.last() != Some(&b'\n') {
                return Err(TelemetryError::RecordTooLong);
            }

            if self.line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return serde_json::from_slice(&self.line)
                .map(Some)
                .map_err(TelemetryError::Decode);
        }
    }
}

/// Print every record from `reader` to `out` until the source closes.
///
/// Returns the number of records printed.
pub async fn print_records<R, W>(
    reader: &mut MetricReader<R>,
    out: &mut W,
) -> Result<u64, TelemetryError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut count = 0;
    while let Some(record) = reader.next_record().await? {
        writeln!(out, "Received metric:")?;
        writeln!(out, "Timestamp: {}", record.timestamp)?;
        writeln!(out, "Name: {}", record.name)?;
        writeln!(out, "Value: {}", record.value)?;
        writeln!(out)?;
        out.flush()?;
        count += 1;
    }
    Ok(count)
}
