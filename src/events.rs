//! Events.

use core::fmt;
use parking_lot::Mutex;
use std::sync::Arc;

/// An event delivered by the host renderer to a listener.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Event {
    /// Event name, e.g. `click`.
    pub name: String,

    /// Optional payload, e.g. the value of an input after an `input` event.
    pub value: Option<String>,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Event {
        Event {
            name: name.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Event {
        self.value = Some(value.into());
        self
    }
}

/// An event handler.
///
/// Handlers are opaque to the reconciler: two handlers are never compared, only their event names
/// are. Cloning a handler shares the underlying closure.
pub struct EventHandler(Arc<Mutex<dyn FnMut(&Event) + Send>>);

impl Clone for EventHandler {
    fn clone(&self) -> Self {
        EventHandler(Arc::clone(&self.0))
    }
}

impl EventHandler {
    pub fn new<F: 'static + FnMut(&Event) + Send>(handler: F) -> Self {
        EventHandler(Arc::new(Mutex::new(handler)))
    }

    /// Invokes the handler.
    ///
    /// # Panics
    /// Deadlocks if the handler invokes itself.
    pub fn call(&self, event: &Event) {
        let mut handler = self.0.lock();
        (&mut *handler)(event);
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EventHandler(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn clones_share_the_closure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler = EventHandler::new(move |event| {
            assert_eq!(event.name, "click");
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let clone = handler.clone();

        handler.call(&Event::new("click"));
        clone.call(&Event::new("click"));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
