//! Per-connection task: frames in, dispatcher calls out.
//!
//! Each connection runs a read loop and a write loop side by side on one task;
//! the write loop drains a bounded queue.  Both the connection's
//! [`RemoteKeyHandler`] (outbound `KeyEvent` frames) and the read loop
//! (`DispatchResult` replies) write through that queue.  Whichever loop ends
//! first ends the connection, and aborting the task drops the socket.
//!
//! When the peer goes away the proxy is closed, which fails any parked
//! delivery as `Dead`.  Registrations are left in place; the dispatcher prunes
//! them on the next failed delivery.

use std::net::SocketAddr;
use std::sync::Arc;

use devkey_core::{decode_message, encode_message, IpcMessage, ProtocolError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use super::remote_handler::{RemoteKeyHandler, OUTBOUND_QUEUE_DEPTH};
use crate::application::dispatch_keys::{KeyEventDispatcher, KeyHandler};

const READ_CHUNK: usize = 4096;

/// Serves one accepted connection until the peer disconnects or misbehaves.
pub async fn serve(stream: TcpStream, peer: SocketAddr, dispatcher: KeyEventDispatcher) {
    let (reader, writer) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);

    let handler = Arc::new(RemoteKeyHandler::new(outbound_tx.clone()));
    let mut session = Session {
        peer,
        name: None,
        handler: Arc::clone(&handler),
        dispatcher,
        outbound: outbound_tx,
    };

    tokio::select! {
        _ = session.read_loop(reader) => {}
        _ = write_loop(writer, outbound_rx, peer) => {}
    }

    handler.close();
    info!(handler = %handler.id(), "IPC connection from {} closed", session.label());
}

struct Session {
    peer: SocketAddr,
    name: Option<String>,
    handler: Arc<RemoteKeyHandler>,
    dispatcher: KeyEventDispatcher,
    outbound: mpsc::Sender<IpcMessage>,
}

impl Session {
    fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{name} ({})", self.peer),
            None => self.peer.to_string(),
        }
    }

    async fn read_loop(&mut self, mut reader: OwnedReadHalf) {
        let mut buf = Vec::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let n = match reader.read(&mut chunk).await {
                Ok(0) => return,
                Ok(n) => n,
                Err(e) => {
                    debug!("read error from {}: {e}", self.label());
                    return;
                }
            };
            buf.extend_from_slice(&chunk[..n]);

            loop {
                match decode_message(&buf) {
                    Ok((msg, consumed)) => {
                        buf.drain(..consumed);
                        self.on_message(msg).await;
                    }
                    Err(ProtocolError::Incomplete { .. }) => break,
                    Err(e) => {
                        warn!("dropping connection from {}: {e}", self.label());
                        return;
                    }
                }
            }
        }
    }

    async fn on_message(&mut self, msg: IpcMessage) {
        trace!("received {} from {}", msg.kind(), self.label());
        match msg {
            IpcMessage::Hello { name } => {
                info!(handler = %self.handler.id(), "{} identified as {name}", self.peer);
                self.name = Some(name);
            }
            IpcMessage::RegisterKeyHandler {
                scan_codes,
                actions,
            } => {
                let handler: Arc<dyn KeyHandler> = self.handler.clone();
                self.dispatcher.register(handler, scan_codes, actions);
            }
            IpcMessage::UnregisterKeyHandler => self.dispatcher.unregister(self.handler.id()),
            IpcMessage::KeyEventAck { seq } => {
                self.handler.complete(seq, Ok(()));
            }
            IpcMessage::KeyEventFailed { seq, reason } => {
                self.handler.complete(seq, Err(reason));
            }
            IpcMessage::DispatchKeyEvent { seq, event } => {
                let handled = self.dispatcher.handle_key_event(event);
                if self
                    .outbound
                    .send(IpcMessage::DispatchResult { seq, handled })
                    .await
                    .is_err()
                {
                    debug!("writer for {} stopped; dropping dispatch result", self.label());
                }
            }
            IpcMessage::UserSwitching { from, to } => self.dispatcher.on_user_switching(from, to),
            other @ (IpcMessage::KeyEvent { .. } | IpcMessage::DispatchResult { .. }) => {
                warn!("ignoring unexpected {} from {}", other.kind(), self.label());
            }
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<IpcMessage>,
    peer: SocketAddr,
) {
    while let Some(msg) = outbound.recv().await {
        let bytes = match encode_message(&msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("failed to encode {} for {peer}: {e}", msg.kind());
                continue;
            }
        };
        if let Err(e) = writer.write_all(&bytes).await {
            debug!("write to {peer} failed: {e}");
            return;
        }
    }
}
