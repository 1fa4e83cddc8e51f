//! Consumption-time enforcement: the handler that turns accepted signals
//! into orders.
//!
//! This handler is safe in isolation: it runs its own `try_accept` against a
//! registry it owns, whether or not an emission-time guard sits upstream.
//! As a side-effecting handler it honors the event protocol — check the
//! consumed flag before acting, mark it after acting.

use std::sync::{Arc, Mutex};

use crate::bus::Handler;
use crate::events::Event;
use crate::order::{Order, OrderFactory};
use crate::records::{Record, RecordSink};
use crate::registry::RuleIdRegistry;

pub struct OrderConsumer {
    registry: Arc<RuleIdRegistry>,
    sink: Arc<dyn RecordSink>,
    /// Consumption-side dedup toggle (off when deployed in emission-only mode).
    dedup_enabled: bool,
    qty: f64,
    outbox: Arc<Mutex<Vec<Order>>>,
}

impl OrderConsumer {
    pub fn new(
        registry: Arc<RuleIdRegistry>,
        sink: Arc<dyn RecordSink>,
        dedup_enabled: bool,
        qty: f64,
    ) -> Self {
        Self {
            registry,
            sink,
            dedup_enabled,
            qty,
            outbox: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the created orders, for the downstream consumer.
    pub fn outbox(&self) -> Arc<Mutex<Vec<Order>>> {
        Arc::clone(&self.outbox)
    }

    pub fn handle(&mut self, event: &Event) -> anyhow::Result<()> {
        let Some(signal) = event.as_signal() else {
            return Ok(());
        };
        if event.is_consumed() {
            return Ok(());
        }
        // Signals without a rule_id are informational; no decision identity,
        // no order.
        let Some(rule_id) = signal.rule_id.as_deref() else {
            return Ok(());
        };
        // Flat decisions carry no standalone order semantics at this layer.
        if signal.direction.side().is_none() {
            return Ok(());
        }

        if self.dedup_enabled && !self.registry.try_accept(rule_id) {
            event.mark_consumed();
            self.sink.record(Record::DuplicateRejected {
                rule_id: rule_id.to_string(),
            });
            return Ok(());
        }

        event.mark_consumed();
        match OrderFactory::create_order(signal, self.qty) {
            Ok(order) => {
                self.sink.record(Record::OrderCreated {
                    order_id: order.order_id.clone(),
                    rule_id: order.rule_id.clone(),
                });
                self.outbox
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(order);
                Ok(())
            }
            Err(err) => {
                // Accept and construction are distinct steps: a freshly
                // accepted rule_id whose order failed to build is re-offered
                // so a retry can act on the same decision.
                if self.dedup_enabled {
                    self.registry.release(rule_id);
                }
                self.sink.record(Record::OrderFailed {
                    rule_id: rule_id.to_string(),
                    reason: err.to_string(),
                });
                Err(err.into())
            }
        }
    }

    pub fn into_handler(mut self) -> Handler {
        Box::new(move |event| self.handle(event))
    }
}
