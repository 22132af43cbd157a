//! KeyEventDispatcher: decides whether a key event is handled and delivers it.
//!
//! This use case is the heart of the service.  The platform input path calls
//! [`KeyEventDispatcher::handle_key_event`] synchronously for every key event;
//! the answer only says whether at least one registered handler wanted the
//! event.  Delivery to those handlers happens afterwards on the dispatcher's
//! worker task.
//!
//! # Architecture
//!
//! ```text
//! platform ──handle_key_event──► lock ─ snapshot matches ─ unlock ──► bool
//!                                              │
//!                                              ▼ Command::Deliver
//! register / unregister / user switch ──► [ worker queue ] ──► worker task
//!                                                               ├─ mutates registry (under lock)
//!                                                               └─ JoinSet of delivery tasks
//!                                                                    └─ Dead ⇒ prune endpoint
//! ```
//!
//! The registry mutex is only ever held for a list copy or a list mutation,
//! never across a remote call.  All mutations are serialised through the one
//! worker queue.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use devkey_core::{HandlerId, KeyAction, KeyEvent, KeyFilter, ScanCode, UserId};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, trace, warn};

use super::manage_handlers::{HandlerRegistry, ListenerRegistration};

/// Default time a handler gets to acknowledge a delivered event.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a delivery to a handler failed, as classified by the transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The handler's process is gone.  Its registrations are pruned.
    #[error("handler endpoint is dead: {0}")]
    Dead(String),
    /// Any other failure.  The registration is kept.
    #[error("remote call failed: {0}")]
    Remote(String),
}

/// A key handler living behind some transport, usually in another process.
///
/// Infrastructure implementations proxy over IPC; tests record calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyHandler: Send + Sync {
    /// Identity of the endpoint.  Registrations are compared by this id.
    fn id(&self) -> HandlerId;

    /// Delivers one event and waits for the handler's acknowledgement.
    async fn handle_key_event(&self, event: KeyEvent) -> Result<(), DeliveryError>;
}

/// Tunables for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// A delivery that takes longer is treated as a generic remote failure.
    pub delivery_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }
}

/// Work items for the worker task.
enum Command {
    Register(ListenerRegistration),
    Unregister(HandlerId),
    Deliver {
        event: KeyEvent,
        handlers: Vec<Arc<dyn KeyHandler>>,
    },
    Reset {
        from: UserId,
        to: UserId,
    },
    Settle(oneshot::Sender<()>),
}

/// Handle to the key event registry and its worker.
///
/// Cloning is cheap; every clone talks to the same registry and worker.  The
/// worker stops once every handle has been dropped.
#[derive(Clone)]
pub struct KeyEventDispatcher {
    registry: Arc<Mutex<HandlerRegistry>>,
    commands: mpsc::UnboundedSender<Command>,
}

impl KeyEventDispatcher {
    /// Creates an empty registry and starts its worker on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn(config: DispatcherConfig) -> Self {
        let registry = Arc::new(Mutex::new(HandlerRegistry::new()));
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = Worker {
            registry: Arc::clone(&registry),
            commands: rx,
            deliveries: JoinSet::new(),
            settle_waiters: Vec::new(),
            delivery_timeout: config.delivery_timeout,
        };
        tokio::spawn(worker.run());

        Self {
            registry,
            commands: tx,
        }
    }

    /// Queues a new registration for `handler`.  Fire-and-forget.
    ///
    /// No validation: empty sets are accepted and simply never match.
    pub fn register(
        &self,
        handler: Arc<dyn KeyHandler>,
        scan_codes: Vec<ScanCode>,
        actions: Vec<KeyAction>,
    ) {
        let registration = ListenerRegistration::new(handler, KeyFilter::new(scan_codes, actions));
        self.submit(Command::Register(registration));
    }

    /// Queues removal of every registration of `handler_id`.  Fire-and-forget.
    pub fn unregister(&self, handler_id: HandlerId) {
        self.submit(Command::Unregister(handler_id));
    }

    /// Returns whether at least one registered handler accepts `event`.
    ///
    /// The matching handlers are snapshotted under the lock and handed to the
    /// worker for delivery; this call does not wait for delivery.
    pub fn handle_key_event(&self, event: KeyEvent) -> bool {
        let handlers = lock_registry(&self.registry).matching(&event);
        if handlers.is_empty() {
            trace!(scan_code = event.scan_code, action = ?event.action, "no handler for key event");
            return false;
        }

        trace!(
            scan_code = event.scan_code,
            action = ?event.action,
            handlers = handlers.len(),
            "key event matched"
        );
        self.submit(Command::Deliver { event, handlers });
        true
    }

    /// Queues a registry reset for a user switch.  Cleared handlers are not notified.
    pub fn on_user_switching(&self, from: UserId, to: UserId) {
        self.submit(Command::Reset { from, to });
    }

    /// Waits until every command queued before this call has been applied and
    /// no delivery is in flight.
    ///
    /// Returns immediately if the worker has stopped.
    pub async fn settle(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Settle(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Number of registrations currently held.
    pub fn registered_count(&self) -> usize {
        lock_registry(&self.registry).len()
    }

    fn submit(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("dispatcher worker has stopped; dropping command");
        }
    }
}

/// Locks the registry, recovering the data if a previous holder panicked.
fn lock_registry(registry: &Mutex<HandlerRegistry>) -> MutexGuard<'_, HandlerRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

type DeliveryOutcome = (HandlerId, Result<(), DeliveryError>);

/// The single consumer of the command queue.
struct Worker {
    registry: Arc<Mutex<HandlerRegistry>>,
    commands: mpsc::UnboundedReceiver<Command>,
    deliveries: JoinSet<DeliveryOutcome>,
    settle_waiters: Vec<oneshot::Sender<()>>,
    delivery_timeout: Duration,
}

impl Worker {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                Some(joined) = self.deliveries.join_next(), if !self.deliveries.is_empty() => {
                    self.on_delivery_finished(joined);
                    self.release_settled();
                }
            }
        }

        while let Some(joined) = self.deliveries.join_next().await {
            self.on_delivery_finished(joined);
        }
        self.release_settled();
        debug!("dispatcher worker stopped");
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Register(registration) => {
                debug!(
                    handler = %registration.handler_id(),
                    scan_codes = ?registration.filter().scan_codes,
                    actions = ?registration.filter().actions,
                    "registering key handler"
                );
                lock_registry(&self.registry).register(registration);
            }
            Command::Unregister(id) => {
                let removed = lock_registry(&self.registry).unregister(id);
                debug!(handler = %id, removed, "unregistered key handler");
            }
            Command::Deliver { event, handlers } => {
                for handler in handlers {
                    let timeout = self.delivery_timeout;
                    self.deliveries.spawn(async move {
                        let id = handler.id();
                        let outcome =
                            match tokio::time::timeout(timeout, handler.handle_key_event(event))
                                .await
                            {
                                Ok(result) => result,
                                Err(_) => Err(DeliveryError::Remote(format!(
                                    "no acknowledgement within {timeout:?}"
                                ))),
                            };
                        (id, outcome)
                    });
                }
            }
            Command::Reset { from, to } => {
                let cleared = lock_registry(&self.registry).clear();
                info!(from, to, cleared, "user switching; cleared key handlers");
            }
            Command::Settle(waiter) => {
                self.settle_waiters.push(waiter);
                self.release_settled();
            }
        }
    }

    fn on_delivery_finished(&mut self, joined: Result<DeliveryOutcome, JoinError>) {
        match joined {
            Ok((id, Ok(()))) => trace!(handler = %id, "key event delivered"),
            Ok((id, Err(DeliveryError::Dead(reason)))) => {
                let removed = lock_registry(&self.registry).unregister(id);
                error!(handler = %id, %reason, removed, "key handler died; pruned its registrations");
            }
            Ok((id, Err(DeliveryError::Remote(reason)))) => {
                warn!(handler = %id, %reason, "failed to deliver key event");
            }
            Err(e) => error!("key event delivery task failed: {e}"),
        }
    }

    fn release_settled(&mut self) {
        if self.deliveries.is_empty() {
            for waiter in self.settle_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
