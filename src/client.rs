//! Echo client.
//!
//! Sends one random integer at a time, waits for the echo and checks it
//! before sending the next. The pause between exchanges is configurable and
//! independent of the telemetry interval.

use bytes::BytesMut;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::config::ClientOptions;
use crate::protocols::echo::{read_frame, write_frame, EchoError};

/// One persistent echo connection.
pub struct EchoClient<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    line: Vec<u8>,
    out: BytesMut,
}

impl EchoClient<TcpStream> {
    /// Connect to an echo server.
    pub async fn connect(addr: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(server = %addr, "Connected to echo server");
        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite> EchoClient<S> {
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
            line: Vec::with_capacity(32),
            out: BytesMut::with_capacity(32),
        }
    }

    /// Send `value` and wait for its echo.
    pub async fn exchange(&mut self, value: i64) -> Result<i64, EchoError> {
        write_frame(&mut self.writer, value, &mut self.out).await?;

        match read_frame(&mut self.reader, &mut self.line).await? {
            Some(received) if received == value => Ok(received),
            Some(received) => Err(EchoError::Mismatch {
                sent: value,
                received,
            }),
            None => Err(EchoError::Closed),
        }
    }
}

/// Drive `client` until `options.count` exchanges succeed or one fails.
///
/// Values are drawn from `[0, options.max_value)`. Returns the number of
/// completed exchanges.
pub async fn run_client<S, R>(
    options: &ClientOptions,
    client: &mut EchoClient<S>,
    rng: &mut R,
) -> Result<u64, EchoError>
where
    S: AsyncRead + AsyncWrite,
    R: Rng,
{
    let mut exchanged = 0;

    if options.count == Some(0) {
        return Ok(exchanged);
    }

    loop {
        let value = rng.gen_range(0..options.max_value);
        let received = client.exchange(value).await?;
        exchanged += 1;
        info!(sent = value, received, "Echo exchange");

        if options.count.is_some_and(|count| exchanged >= count) {
            return Ok(exchanged);
        }
        if !options.interval.is_zero() {
            tokio::time::sleep(options.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::echo::parser::FrameError;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;
    use tokio_test::io::Builder;

    fn options(count: Option<u64>, max_value: i64) -> ClientOptions {
        ClientOptions {
            server: "127.0.0.1:0".to_string(),
            interval: Duration::ZERO,
            max_value,
            count,
            telemetry: None,
        }
    }

    #[tokio::test]
    async fn test_exchange() {
        let mock = Builder::new().write(b"42\n").read(b"42\n").build();
        let mut client = EchoClient::new(mock);
        assert_eq!(client.exchange(42).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_exchange_in_order() {
        let mock = Builder::new()
            .write(b"7\n")
            .read(b"7\n")
            .write(b"13\n")
            .read(b"13\n")
            .build();
        let mut client = EchoClient::new(mock);
        assert_eq!(client.exchange(7).await.unwrap(), 7);
        assert_eq!(client.exchange(13).await.unwrap(), 13);
    }

    #[tokio::test]
    async fn test_exchange_mismatch() {
        let mock = Builder::new().write(b"1\n").read(b"2\n").build();
        let mut client = EchoClient::new(mock);
        assert!(matches!(
            client.exchange(1).await,
            Err(EchoError::Mismatch {
                sent: 1,
                received: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_exchange_server_closed() {
        let mock = Builder::new().write(b"1\n").build();
        let mut client = EchoClient::new(mock);
        assert!(matches!(client.exchange(1).await, Err(EchoError::Closed)));
    }

    #[tokio::test]
    async fn test_exchange_truncated_reply() {
        let mock = Builder::new().write(b"10\n").read(b"1").build();
        let mut client = EchoClient::new(mock);
        assert!(matches!(
            client.exchange(10).await,
            Err(EchoError::Frame(FrameError::Truncated(1)))
        ));
    }

    #[tokio::test]
    async fn test_run_client_stops_after_count() {
        // max_value of 1 pins every draw to 0
        let mock = Builder::new()
            .write(b"0\n")
            .read(b"0\n")
            .write(b"0\n")
            .read(b"0\n")
            .write(b"0\n")
            .read(b"0\n")
            .build();
        let mut client = EchoClient::new(mock);
        let mut rng = StdRng::seed_from_u64(1);

        let done = run_client(&options(Some(3), 1), &mut client, &mut rng)
            .await
            .unwrap();
        assert_eq!(done, 3);
    }

    #[tokio::test]
    async fn test_run_client_zero_count() {
        let mock = Builder::new().build();
        let mut client = EchoClient::new(mock);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            run_client(&options(Some(0), 100), &mut client, &mut rng)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_run_client_surfaces_errors() {
        let mock = Builder::new().write(b"0\n").build();
        let mut client = EchoClient::new(mock);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            run_client(&options(None, 1), &mut client, &mut rng).await,
            Err(EchoError::Closed)
        ));
    }
}
