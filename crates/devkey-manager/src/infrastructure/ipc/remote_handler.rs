//! RemoteKeyHandler: the [`KeyHandler`] proxy for one IPC connection.
//!
//! Delivering an event writes a `KeyEvent` frame through the connection's
//! writer queue and parks a oneshot until the peer answers with the same
//! `seq`.  Failures are classified for the dispatcher:
//!
//! | Situation                                   | Result                 |
//! |---------------------------------------------|------------------------|
//! | `KeyEventAck`                               | `Ok(())`               |
//! | `KeyEventFailed`                            | `DeliveryError::Remote`|
//! | writer queue full (peer not reading)        | `DeliveryError::Remote`|
//! | connection closed / writer gone / no reply  | `DeliveryError::Dead`  |
//!
//! The writer queue is bounded.  A delivery that finds it full is failed
//! without queuing a frame, so a stalled peer never accumulates a backlog.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use devkey_core::{protocol::SequenceCounter, HandlerId, IpcMessage, KeyEvent};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::application::dispatch_keys::{DeliveryError, KeyHandler};

type Reply = Result<(), String>;

/// Frames a connection may have queued for its writer.
pub const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Proxy for a handler process connected over IPC.
pub struct RemoteKeyHandler {
    id: HandlerId,
    outbound: mpsc::Sender<IpcMessage>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    sequence: SequenceCounter,
    alive: AtomicBool,
}

impl RemoteKeyHandler {
    /// Creates a proxy with a fresh id that writes frames into `outbound`.
    pub fn new(outbound: mpsc::Sender<IpcMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            outbound,
            pending: Mutex::new(HashMap::new()),
            sequence: SequenceCounter::new(),
            alive: AtomicBool::new(true),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Resolves the delivery waiting on `seq`.  Unknown or late replies are ignored.
    pub fn complete(&self, seq: u64, reply: Reply) -> bool {
        match self.lock_pending().remove(&seq) {
            Some(waiter) => waiter.send(reply).is_ok(),
            None => false,
        }
    }

    /// Marks the endpoint dead and fails every parked delivery.
    pub fn close(&self) {
        self.alive.store(false, Ordering::Release);
        self.lock_pending().clear();
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Reply>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Parks a reply slot for `seq`, unless the endpoint is already closed.
    ///
    /// The liveness check happens under the pending lock so a concurrent
    /// [`close`](Self::close) either sees the slot or the slot is never parked.
    fn park(&self, seq: u64) -> Option<oneshot::Receiver<Reply>> {
        let mut pending = self.lock_pending();
        if !self.is_alive() {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(seq, tx);
        Some(rx)
    }
}

/// Removes the parked slot when a delivery is abandoned (e.g. timed out).
struct ParkedReply<'a> {
    handler: &'a RemoteKeyHandler,
    seq: u64,
}

impl Drop for ParkedReply<'_> {
    fn drop(&mut self) {
        self.handler.lock_pending().remove(&self.seq);
    }
}

#[async_trait]
impl KeyHandler for RemoteKeyHandler {
    fn id(&self) -> HandlerId {
        self.id
    }

    async fn handle_key_event(&self, event: KeyEvent) -> Result<(), DeliveryError> {
        let seq = self.sequence.next();
        let rx = self
            .park(seq)
            .ok_or_else(|| DeliveryError::Dead("connection closed".to_string()))?;
        let _parked = ParkedReply { handler: self, seq };

        match self.outbound.try_send(IpcMessage::KeyEvent { seq, event }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                return Err(DeliveryError::Remote(format!(
                    "outbound queue full ({OUTBOUND_QUEUE_DEPTH} frames)"
                )));
            }
            Err(TrySendError::Closed(_)) => {
                self.close();
                return Err(DeliveryError::Dead("connection writer stopped".to_string()));
            }
        }

        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(DeliveryError::Remote(reason)),
            Err(_) => Err(DeliveryError::Dead(
                "connection closed before reply".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devkey_core::KeyAction;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    fn proxy() -> (RemoteKeyHandler, mpsc::Receiver<IpcMessage>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        (RemoteKeyHandler::new(tx), rx)
    }

    fn sent_seq(rx: &mut mpsc::Receiver<IpcMessage>) -> u64 {
        match rx.try_recv().expect("a frame must have been queued") {
            IpcMessage::KeyEvent { seq, .. } => seq,
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_ack_completes_delivery() {
        // Arrange
        let (handler, mut rx) = proxy();
        let mut delivery = task::spawn(handler.handle_key_event(KeyEvent::new(1, KeyAction::Down)));

        // Act
        assert_pending!(delivery.poll());
        let seq = sent_seq(&mut rx);
        assert!(handler.complete(seq, Ok(())));

        // Assert
        assert_ready_eq!(delivery.poll(), Ok(()));
    }

    #[test]
    fn test_failure_reply_is_remote_error() {
        let (handler, mut rx) = proxy();
        let mut delivery = task::spawn(handler.handle_key_event(KeyEvent::new(1, KeyAction::Up)));

        assert_pending!(delivery.poll());
        let seq = sent_seq(&mut rx);
        handler.complete(seq, Err("busy".to_string()));

        assert_ready_eq!(
            delivery.poll(),
            Err(DeliveryError::Remote("busy".to_string()))
        );
    }

    #[test]
    fn test_close_fails_parked_delivery_as_dead() {
        // Arrange
        let (handler, _rx) = proxy();
        let mut delivery = task::spawn(handler.handle_key_event(KeyEvent::new(1, KeyAction::Down)));
        assert_pending!(delivery.poll());

        // Act
        handler.close();

        // Assert
        assert!(matches!(delivery.poll(), std::task::Poll::Ready(Err(DeliveryError::Dead(_)))));
        assert!(!handler.is_alive());
    }

    #[test]
    fn test_delivery_after_close_is_dead_without_writing() {
        // Arrange
        let (handler, mut rx) = proxy();
        handler.close();

        // Act
        let mut delivery = task::spawn(handler.handle_key_event(KeyEvent::new(2, KeyAction::Down)));

        // Assert
        assert!(matches!(delivery.poll(), std::task::Poll::Ready(Err(DeliveryError::Dead(_)))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_writer_is_dead() {
        let (handler, rx) = proxy();
        drop(rx);

        let mut delivery = task::spawn(handler.handle_key_event(KeyEvent::new(3, KeyAction::Down)));

        assert!(matches!(delivery.poll(), std::task::Poll::Ready(Err(DeliveryError::Dead(_)))));
        assert!(!handler.is_alive());
    }

    #[test]
    fn test_abandoned_delivery_releases_its_slot() {
        // Arrange
        let (handler, mut rx) = proxy();
        let mut delivery = task::spawn(handler.handle_key_event(KeyEvent::new(4, KeyAction::Down)));
        assert_pending!(delivery.poll());
        let seq = sent_seq(&mut rx);
        assert_eq!(handler.pending_count(), 1);

        // Act
        drop(delivery);

        // Assert
        assert_eq!(handler.pending_count(), 0);
        assert!(!handler.complete(seq, Ok(())), "late reply must be ignored");
    }

    #[test]
    fn test_full_queue_fails_delivery_without_queuing() {
        // Arrange – a peer that never reads; its queue holds two frames
        let (tx, mut rx) = mpsc::channel(2);
        let handler = RemoteKeyHandler::new(tx);
        let mut first = task::spawn(handler.handle_key_event(KeyEvent::new(1, KeyAction::Down)));
        let mut second = task::spawn(handler.handle_key_event(KeyEvent::new(1, KeyAction::Down)));
        assert_pending!(first.poll());
        assert_pending!(second.poll());

        // Act
        let mut third = task::spawn(handler.handle_key_event(KeyEvent::new(1, KeyAction::Down)));

        // Assert
        assert!(matches!(third.poll(), std::task::Poll::Ready(Err(DeliveryError::Remote(_)))));
        assert!(handler.is_alive(), "a slow peer is not a dead peer");
        assert_eq!(handler.pending_count(), 2);
        drop(third);
        sent_seq(&mut rx);
        sent_seq(&mut rx);
        assert!(rx.try_recv().is_err(), "the rejected frame must not be queued");
    }
}
