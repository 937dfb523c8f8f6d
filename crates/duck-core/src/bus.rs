//! Keyed single-shot pub/sub used to deduplicate in-flight work.
//!
//! Every subscriber runs exactly once and is then removed. Publishing a
//! key nobody subscribed to is a silent no-op. Delivery is asynchronous:
//! `publish` hands each handler to the runtime and returns without
//! waiting, so a publisher is never blocked on handler execution.
//! Handlers may themselves subscribe or publish.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::manifest::PartialManifest;

/// Payload delivered to subscribers of a key.
#[derive(Debug)]
pub struct BusEvent {
    pub key: String,
    pub ok: bool,
    /// Present for manifest completions; metadata completions carry none.
    pub manifest: Option<Arc<PartialManifest>>,
}

type Handler = Box<dyn FnOnce(Arc<BusEvent>) + Send + 'static>;

/// Keyed one-shot event bus. Internally synchronized; subscription and
/// publication are both safe concurrently.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<String, Vec<Handler>>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any subscriber is currently registered for `key`.
    #[must_use]
    pub fn has_callback(&self, key: &str) -> bool {
        self.subscribers
            .lock()
            .map(|map| map.get(key).is_some_and(|handlers| !handlers.is_empty()))
            .unwrap_or(false)
    }

    /// Queue `handler` to run on the next publish of `key`.
    ///
    /// Returns `true` when this registration is the first for the key,
    /// which is the claim callers use to decide who performs the fetch.
    pub fn subscribe_once<F>(&self, key: &str, handler: F) -> bool
    where
        F: FnOnce(Arc<BusEvent>) + Send + 'static,
    {
        let Ok(mut map) = self.subscribers.lock() else {
            return false;
        };
        let handlers = map.entry(key.to_string()).or_default();
        handlers.push(Box::new(handler));
        handlers.len() == 1
    }

    /// Deliver `event` to every current subscriber of its key.
    pub fn publish(&self, event: BusEvent) {
        let handlers = {
            let Ok(mut map) = self.subscribers.lock() else {
                return;
            };
            map.remove(&event.key).unwrap_or_default()
        };
        if handlers.is_empty() {
            return;
        }
        let event = Arc::new(event);
        for handler in handlers {
            let event = Arc::clone(&event);
            tokio::spawn(async move {
                handler(event);
            });
        }
    }
}
