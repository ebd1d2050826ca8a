//! Integer echo protocol.
//!
//! The client writes one decimal integer per line and the server writes the
//! same integer back, in lockstep, for as long as the connection lives:
//!
//! ```text
//! Request:  42\n
//! Response: 42\n
//!
//! Request:  7\n      Response: 7\n
//! Request:  13\n     Response: 13\n
//! ```
//!
//! ## Framing
//!
//! - Exactly one integer per line, no batching.
//! - `\r\n` terminators and spaces around the digits are tolerated.
//! - Values are signed 64-bit; frames longer than `MAX_FRAME_LEN` bytes
//!   are rejected.
//!
//! ## Failure
//!
//! A malformed frame, a frame cut short by the peer closing, or any I/O
//! error ends the exchange on that connection. There is no error reply and
//! no attempt to resynchronise; other connections are unaffected.

pub mod handler;
pub mod parser;

pub use handler::{handle_connection, read_frame, write_frame, EchoError};
