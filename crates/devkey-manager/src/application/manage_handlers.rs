//! HandlerRegistry: the set of listener registrations known to the service.
//!
//! Each [`ListenerRegistration`] pairs a remote handler endpoint with the
//! [`KeyFilter`] it registered.  The registry is a plain growable list:
//!
//! - Registering twice yields two independent entries; each gets its own
//!   delivery attempt.
//! - Removal is by endpoint identity ([`HandlerId`]) and drops every entry of
//!   that endpoint at once.
//! - Insertion order carries no meaning.
//!
//! The registry itself is not synchronised.  The dispatcher owns it behind a
//! single mutex and keeps every critical section short.

use std::sync::Arc;

use devkey_core::{HandlerId, KeyEvent, KeyFilter};

use super::dispatch_keys::KeyHandler;

/// One registered remote key handler and the filter it asked for.
///
/// The filter is fixed at construction.
#[derive(Clone)]
pub struct ListenerRegistration {
    handler: Arc<dyn KeyHandler>,
    filter: KeyFilter,
}

impl ListenerRegistration {
    pub fn new(handler: Arc<dyn KeyHandler>, filter: KeyFilter) -> Self {
        Self { handler, filter }
    }

    pub fn handler_id(&self) -> HandlerId {
        self.handler.id()
    }

    pub fn filter(&self) -> &KeyFilter {
        &self.filter
    }

    pub fn handler(&self) -> &Arc<dyn KeyHandler> {
        &self.handler
    }
}

/// In-memory registry of all listener registrations.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<ListenerRegistration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a registration.  Never deduplicates.
    pub fn register(&mut self, registration: ListenerRegistration) {
        self.entries.push(registration);
    }

    /// Removes every registration of `id`.  Returns how many were removed.
    pub fn unregister(&mut self, id: HandlerId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|r| r.handler_id() != id);
        before - self.entries.len()
    }

    /// Drops all registrations.  Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    /// Snapshot of the handlers whose filter accepts `event`.
    ///
    /// One element per matching registration, so duplicates are preserved.
    pub fn matching(&self, event: &KeyEvent) -> Vec<Arc<dyn KeyHandler>> {
        self.entries
            .iter()
            .filter(|r| r.filter.matches(event))
            .map(|r| Arc::clone(&r.handler))
            .collect()
    }

    pub fn contains(&self, id: HandlerId) -> bool {
        self.entries.iter().any(|r| r.handler_id() == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
