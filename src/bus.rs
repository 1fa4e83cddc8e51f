//! Synchronous publish/subscribe bus with deterministic delivery order.
//!
//! Delivery is an in-line call chain within `emit`: descending handler
//! priority, ties broken by registration order. The bus never interprets the
//! consumed flag as stop-propagation; that would make delivery semantics
//! depend on registration order instead of explicit handler protocol.
//! A faulting handler is isolated and reported in the dispatch report,
//! never swallowed and never allowed to starve later handlers.

use std::collections::HashMap;

use crate::events::{Event, EventKind};

pub type Handler = Box<dyn FnMut(&Event) -> anyhow::Result<()> + Send>;

/// Common dispatch surface. The dedup guard implements the same interface
/// and wraps an owned bus, so enforcement is composition, not mutation.
pub trait Dispatch {
    /// Deliver the event; returns how many handlers were invoked and which
    /// of them failed.
    fn emit(&mut self, event: &Event) -> DispatchReport;
}

#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub handler: String,
    /// rule_id of the signal being dispatched, when there was one. Lets the
    /// orchestrator re-offer a decision whose side effect never materialized.
    pub rule_id: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failures: Vec<HandlerFailure>,
}

impl DispatchReport {
    pub fn blocked() -> Self {
        Self::default()
    }

    pub fn ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_result(self) -> Result<usize, DispatchError> {
        if self.failures.is_empty() {
            Ok(self.delivered)
        } else {
            Err(DispatchError {
                delivered: self.delivered,
                failures: self.failures,
            })
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{} of {delivered} invoked handler(s) failed", .failures.len())]
pub struct DispatchError {
    pub delivered: usize,
    pub failures: Vec<HandlerFailure>,
}

struct Subscription {
    name: String,
    priority: i32,
    handler: Handler,
}

pub struct EventBus {
    subscriptions: HashMap<EventKind, Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: HashMap::new(),
        }
    }

    /// Register a handler for one event kind. Multiple handlers per kind are
    /// allowed; duplicate registration is the caller's concern.
    pub fn subscribe(
        &mut self,
        kind: EventKind,
        name: impl Into<String>,
        priority: i32,
        handler: Handler,
    ) {
        let sub = Subscription {
            name: name.into(),
            priority,
            handler,
        };
        let subs = self.subscriptions.entry(kind).or_default();
        // Descending priority; equal priorities keep registration order.
        let pos = subs
            .iter()
            .position(|s| s.priority < sub.priority)
            .unwrap_or(subs.len());
        subs.insert(pos, sub);
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.subscriptions.get(&kind).map_or(0, |s| s.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatch for EventBus {
    fn emit(&mut self, event: &Event) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(subs) = self.subscriptions.get_mut(&event.kind()) else {
            return report;
        };
        let rule_id = event.as_signal().and_then(|s| s.rule_id.clone());
        for sub in subs.iter_mut() {
            report.delivered += 1;
            if let Err(err) = (sub.handler)(event) {
                report.failures.push(HandlerFailure {
                    handler: sub.name.clone(),
                    rule_id: rule_id.clone(),
                    error: format!("{err:#}"),
                });
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_handler(log: Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Handler {
        Box::new(move |_ev| {
            log.lock().unwrap().push(tag);
            Ok(())
        })
    }

    #[test]
    fn test_priority_descending_then_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.subscribe(EventKind::Info, "low", 5, recording_handler(log.clone(), "low"));
        bus.subscribe(EventKind::Info, "hi", 10, recording_handler(log.clone(), "hi"));
        bus.subscribe(EventKind::Info, "low2", 5, recording_handler(log.clone(), "low2"));
        bus.subscribe(EventKind::Info, "hi2", 10, recording_handler(log.clone(), "hi2"));

        for _ in 0..3 {
            log.lock().unwrap().clear();
            let report = bus.emit(&Event::info("tick"));
            assert_eq!(report.delivered, 4);
            assert_eq!(*log.lock().unwrap(), vec!["hi", "hi2", "low", "low2"]);
        }
    }

    #[test]
    fn test_emit_returns_invoked_count() {
        let mut bus = EventBus::new();
        bus.subscribe(EventKind::Info, "a", 0, Box::new(|_| Ok(())));
        bus.subscribe(EventKind::Info, "b", 0, Box::new(|_| Ok(())));
        assert_eq!(bus.emit(&Event::info("x")).delivered, 2);
        // No subscribers for Signal events.
        let signal = Event::signal(crate::events::SignalEvent {
            symbol: "MINI".to_string(),
            direction: crate::events::Direction::Long,
            price: 100.0,
            rule_id: None,
            group: None,
        });
        assert_eq!(bus.emit(&signal).delivered, 0);
    }

    #[test]
    fn test_handler_failure_is_isolated_and_reported() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.subscribe(EventKind::Info, "boom", 10, Box::new(|_| anyhow::bail!("bad state")));
        bus.subscribe(EventKind::Info, "after", 5, recording_handler(log.clone(), "after"));

        let report = bus.emit(&Event::info("x"));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].handler, "boom");
        assert!(report.failures[0].error.contains("bad state"));
        // Info events carry no decision identity.
        assert_eq!(report.failures[0].rule_id, None);
        // The handler after the fault still ran.
        assert_eq!(*log.lock().unwrap(), vec!["after"]);

        let err = report.into_result().unwrap_err();
        assert_eq!(err.delivered, 2);
    }

    #[test]
    fn test_failure_carries_signal_rule_id() {
        let mut bus = EventBus::new();
        bus.subscribe(
            EventKind::Signal,
            "boom",
            0,
            Box::new(|_| anyhow::bail!("down")),
        );
        let signal = Event::signal(crate::events::SignalEvent {
            symbol: "MINI".to_string(),
            direction: crate::events::Direction::Long,
            price: 100.0,
            rule_id: Some("ma_MINI_BUY_group_1".to_string()),
            group: Some(1),
        });
        let report = bus.emit(&signal);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0].rule_id.as_deref(),
            Some("ma_MINI_BUY_group_1")
        );
    }

    #[test]
    fn test_consumed_flag_does_not_stop_delivery() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.subscribe(
            EventKind::Info,
            "first",
            10,
            Box::new(|ev| {
                ev.mark_consumed();
                Ok(())
            }),
        );
        let seen_consumed = Arc::new(Mutex::new(false));
        let sc = seen_consumed.clone();
        bus.subscribe(
            EventKind::Info,
            "second",
            5,
            Box::new(move |ev| {
                *sc.lock().unwrap() = ev.is_consumed();
                log.lock().unwrap().push("second");
                Ok(())
            }),
        );

        let report = bus.emit(&Event::info("x"));
        // Both handlers run; the second observes the flag and can decline to act.
        assert_eq!(report.delivered, 2);
        assert!(*seen_consumed.lock().unwrap());
    }
}
