//! IPC server: the service's inbound surface for handlers and the platform.
//!
//! Listens on a TCP socket (loopback by default).  Every accepted connection
//! gets its own task and its own [`RemoteKeyHandler`] proxy, so a connection
//! *is* a handler endpoint: registrations made on it are removed when a
//! delivery through it finds the connection gone.
//!
//! The platform input path uses the same socket to ask "was this event
//! handled" (`DispatchKeyEvent`) and to report user switches.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::application::dispatch_keys::KeyEventDispatcher;

pub mod connection;
pub mod remote_handler;

pub use remote_handler::RemoteKeyHandler;

/// Back-off after a failed `accept` (e.g. file descriptor exhaustion).
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Error type for IPC server operations.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Accept loop feeding connections into a [`KeyEventDispatcher`].
pub struct IpcServer {
    listener: TcpListener,
    dispatcher: KeyEventDispatcher,
}

impl IpcServer {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::BindFailed`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, dispatcher: KeyEventDispatcher) -> Result<Self, IpcError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| IpcError::BindFailed { addr, source })?;
        Ok(Self {
            listener,
            dispatcher,
        })
    }

    /// The address actually bound (useful when binding port 0).
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Io`] if the socket address cannot be queried.
    pub fn local_addr(&self) -> Result<SocketAddr, IpcError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until this future is dropped.
    ///
    /// Connection tasks are owned by the server: dropping the future aborts
    /// every open connection.
    pub async fn run(self) {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("accepted IPC connection from {peer}");
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("could not set TCP_NODELAY for {peer}: {e}");
                        }
                        connections.spawn(connection::serve(stream, peer, self.dispatcher.clone()));
                    }
                    Err(e) => {
                        warn!("accept failed: {e}");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            warn!("IPC connection task panicked: {e}");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatch_keys::DispatcherConfig;

    #[tokio::test]
    async fn test_bind_on_port_zero_reports_real_port() {
        // Arrange
        let dispatcher = KeyEventDispatcher::spawn(DispatcherConfig::default());

        // Act
        let server = IpcServer::bind("127.0.0.1:0".parse().unwrap(), dispatcher)
            .await
            .expect("bind must succeed");

        // Assert
        let addr = server.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_bind_on_taken_port_fails() {
        // Arrange
        let dispatcher = KeyEventDispatcher::spawn(DispatcherConfig::default());
        let first = IpcServer::bind("127.0.0.1:0".parse().unwrap(), dispatcher.clone())
            .await
            .unwrap();
        let taken = first.local_addr().unwrap();

        // Act
        let second = IpcServer::bind(taken, dispatcher).await;

        // Assert
        assert!(matches!(second, Err(IpcError::BindFailed { addr, .. }) if addr == taken));
    }
}
