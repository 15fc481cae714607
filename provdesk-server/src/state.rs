//! Application state

use crate::registry::EventHub;

/// Shared state: the persistence backend and the dashboard event hub.
pub struct AppState<S> {
    pub store: S,
    pub events: EventHub,
}

impl<S> AppState<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            events: EventHub::new(),
        }
    }
}
