//! Emission-time dedup enforcement.
//!
//! The guard implements [`Dispatch`] and wraps an owned bus, so installing
//! or removing it is explicit composition. Because the registry accept is
//! atomic, two racing emissions of the same new rule_id resolve to exactly
//! one dispatch; the loser is a completed outcome (blocked), not a pending
//! one.

use std::sync::Arc;

use crate::bus::{Dispatch, DispatchReport, EventBus};
use crate::events::Event;
use crate::records::{Record, RecordSink};
use crate::registry::RuleIdRegistry;

pub struct DedupGuard {
    bus: EventBus,
    registry: Arc<RuleIdRegistry>,
    sink: Arc<dyn RecordSink>,
}

impl DedupGuard {
    pub fn new(bus: EventBus, registry: Arc<RuleIdRegistry>, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            bus,
            registry,
            sink,
        }
    }

    /// Remove the guard, restoring direct emission. The registry stays with
    /// its owner; nothing leaks into the returned bus.
    pub fn into_inner(self) -> EventBus {
        self.bus
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }
}

impl Dispatch for DedupGuard {
    fn emit(&mut self, event: &Event) -> DispatchReport {
        // Only signal events carrying a rule_id are subject to enforcement.
        if let Some(rule_id) = event.as_signal().and_then(|s| s.rule_id.as_deref()) {
            if !self.registry.try_accept(rule_id) {
                self.sink.record(Record::DuplicateBlocked {
                    rule_id: rule_id.to_string(),
                });
                return DispatchReport::blocked();
            }
        }
        self.bus.emit(event)
    }
}
