//! TCP server for echo connections.
//!
//! Accepts connections and hands each one to its own task running the echo
//! protocol handler. Connections share nothing but the optional telemetry
//! sink.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::ServerOptions;
use crate::protocols::echo::{self, EchoError};
use crate::telemetry::TelemetrySink;

/// Server instance
pub struct Server {
    listener: TcpListener,
    connection_limit: Arc<Semaphore>,
    telemetry: Option<TelemetrySink>,
}

impl Server {
    /// Bind the echo listener.
    pub async fn bind(
        options: &ServerOptions,
        telemetry: Option<TelemetrySink>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&options.listen).await?;

        Ok(Server {
            listener,
            connection_limit: Arc::new(Semaphore::new(options.max_connections)),
            telemetry,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(address = %self.local_addr()?, "Server listening");

        loop {
            // Wait for a connection slot
            let permit = self.connection_limit.clone().acquire_owned().await?;

            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New connection");

                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %addr, error = %e, "Failed to set TCP_NODELAY");
                    }
                    let telemetry = self.telemetry.clone();

                    tokio::spawn(async move {
                        match echo::handle_connection(stream, telemetry).await {
                            Ok(echoed) => debug!(peer = %addr, echoed, "Connection closed"),
                            Err(EchoError::Io(e)) => {
                                debug!(peer = %addr, error = %e, "Connection error")
                            }
                            Err(e) => warn!(peer = %addr, error = %e, "Connection dropped"),
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}
