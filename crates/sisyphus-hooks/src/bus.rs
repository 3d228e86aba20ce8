//! Event fan-out.
//!
//! The host's event feed is a single ordered stream per process. The bus
//! dispatches each event to every registered handler sequentially, in
//! registration order, so handlers observe the same ordering the host
//! emitted and never race each other on shared state within one event.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use sisyphus_core::HostEvent;

/// A consumer of host lifecycle events.
///
/// Handlers must tolerate any event ordering the host can produce and
/// must not panic; a handler that needs long-running work spawns it.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable handler name, used in logs and metrics labels.
    fn name(&self) -> &str;

    /// React to one event.
    async fn on_event(&self, event: &HostEvent);
}

/// Fans host events out to registered handlers.
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Dispatch order is registration order.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        debug!(handler = handler.name(), "handler registered");
        self.handlers.push(handler);
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatch one typed event to every handler, sequentially.
    #[instrument(skip_all, fields(event_type = event.event_type()))]
    pub async fn dispatch(&self, event: &HostEvent) {
        counter!("hooks_events_total", "type" => event.event_type()).increment(1);
        for handler in &self.handlers {
            handler.on_event(event).await;
        }
    }

    /// Decode a raw host payload and dispatch it.
    ///
    /// Unrecognized event types still dispatch as [`HostEvent::Other`], but
    /// a payload without a string `type` tag is not an event at all: it is
    /// logged and dropped, so one bad frame never stalls the stream.
    pub async fn dispatch_raw(&self, raw: Value) {
        if !raw.get("type").is_some_and(Value::is_string) {
            counter!("hooks_events_undecodable_total").increment(1);
            warn!("dropping untagged host payload");
            return;
        }
        match serde_json::from_value::<HostEvent>(raw) {
            Ok(event) => self.dispatch(&event).await,
            Err(e) => {
                counter!("hooks_events_undecodable_total").increment(1);
                warn!(error = %e, "dropping undecodable host event");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn on_event(&self, event: &HostEvent) {
            self.log
                .lock()
                .push(format!("{}:{}", self.name, event.event_type()));
        }
    }

    #[tokio::test]
    async fn dispatch_preserves_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.register(Arc::new(Recorder {
            name: "first",
            log: log.clone(),
        }));
        bus.register(Arc::new(Recorder {
            name: "second",
            log: log.clone(),
        }));
        assert_eq!(bus.len(), 2);

        bus.dispatch(&HostEvent::SessionIdle {
            session_id: "s1".into(),
        })
        .await;

        assert_eq!(
            *log.lock(),
            vec![
                "first:session.idle".to_string(),
                "second:session.idle".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn raw_dispatch_decodes_and_fans_out() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.register(Arc::new(Recorder {
            name: "h",
            log: log.clone(),
        }));

        bus.dispatch_raw(json!({
            "type": "session.deleted",
            "properties": {"sessionID": "s1"}
        }))
        .await;

        assert_eq!(*log.lock(), vec!["h:session.deleted".to_string()]);
    }

    #[tokio::test]
    async fn undecodable_payload_dropped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.register(Arc::new(Recorder {
            name: "h",
            log: log.clone(),
        }));

        // None of these carry a string `type` tag.
        bus.dispatch_raw(json!([1, 2, 3])).await;
        bus.dispatch_raw(json!({"properties": {"sessionID": "s1"}})).await;
        bus.dispatch_raw(json!({"type": 7, "properties": {}})).await;
        bus.dispatch_raw(json!("session.idle")).await;
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn unknown_event_type_still_dispatched() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.register(Arc::new(Recorder {
            name: "h",
            log: log.clone(),
        }));

        bus.dispatch_raw(json!({"type": "ide.installed", "properties": {}}))
            .await;
        assert_eq!(*log.lock(), vec!["h:other".to_string()]);
    }
}
