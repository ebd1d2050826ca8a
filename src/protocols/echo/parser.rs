//! Integer frame parser.

use bytes::{BufMut, BytesMut};
use thiserror::Error;

/// Longest accepted frame, line terminator included.
pub const MAX_FRAME_LEN: usize = 1024;

/// Reasons a frame cannot be turned into an integer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Line held no digits at all.
    #[error("empty frame")]
    Empty,
    /// Line was not a base-10 integer that fits in an `i64`.
    #[error("invalid integer {0:?}")]
    InvalidInteger(String),
    /// No line terminator within `MAX_FRAME_LEN` bytes.
    #[error("frame longer than {MAX_FRAME_LEN} bytes")]
    TooLong,
    /// Peer closed the stream after sending part of a frame.
    #[error("connection closed mid-frame after {0} bytes")]
    Truncated(usize),
}

/// Parse result.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult {
    /// Parsed integer with bytes consumed (terminator included).
    Complete(i64, usize),
    /// Need more data.
    Incomplete,
    /// The buffered line can never become a valid frame.
    Invalid(FrameError),
}

/// Parse one integer frame from the front of `input`.
///
/// A frame is `<integer>\n`. A `\r` before the `\n` is tolerated, as are
/// spaces and tabs around the digits. An optional sign is accepted.
pub fn parse(input: &[u8]) -> ParseResult {
    let line_end = match find_lf(input) {
        Some(pos) => pos,
        None if input.len() >= MAX_FRAME_LEN => return ParseResult::Invalid(FrameError::TooLong),
        None => return ParseResult::Incomplete,
    };

    let consumed = line_end + 1;
    if consumed > MAX_FRAME_LEN {
        return ParseResult::Invalid(FrameError::TooLong);
    }

    match parse_line(&input[..line_end]) {
        Ok(value) => ParseResult::Complete(value, consumed),
        Err(e) => ParseResult::Invalid(e),
    }
}

fn parse_line(line: &[u8]) -> Result<i64, FrameError> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let text = std::str::from_utf8(line)
        .map_err(|_| FrameError::InvalidInteger(String::from_utf8_lossy(line).into_owned()))?;
    let text = text.trim_matches(|c: char| c == ' ' || c == '\t');

    if text.is_empty() {
        return Err(FrameError::Empty);
    }

    text.parse()
        .map_err(|_| FrameError::InvalidInteger(text.to_string()))
}

/// Append the wire form of `value` to `output`.
pub fn encode(value: i64, output: &mut BytesMut) {
    output.put_slice(value.to_string().as_bytes());
    output.put_u8(b'\n');
}

/// Find \n in buffer.
fn find_lf(buffer: &[u8]) -> Option<usize> {
    buffer.iter().position(|&b| b == b'\n')
}
