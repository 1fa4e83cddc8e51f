//! Run orchestration: wiring, configuration, and lifecycle.
//!
//! The pipeline owns both enforcement points and controls their lifecycle.
//! Registries are injected into whichever components need them; nothing
//! resets shared dedup state for its own purposes — only `start_run` does,
//! and only between runs.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::bus::{Dispatch, DispatchReport, EventBus, Handler};
use crate::consumer::OrderConsumer;
use crate::events::{Direction, Event, EventKind};
use crate::guard::DedupGuard;
use crate::interpreter::SignalInterpreter;
use crate::order::Order;
use crate::records::RecordSink;
use crate::registry::RuleIdRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupMode {
    Emission,
    Consumption,
    Both,
}

impl DedupMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "emission" => Some(DedupMode::Emission),
            "consumption" => Some(DedupMode::Consumption),
            "both" => Some(DedupMode::Both),
            _ => None,
        }
    }

    pub fn emission_enabled(&self) -> bool {
        matches!(self, DedupMode::Emission | DedupMode::Both)
    }

    pub fn consumption_enabled(&self) -> bool {
        matches!(self, DedupMode::Consumption | DedupMode::Both)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub strategy: String,
    pub dedup_mode: DedupMode,
    pub reset_on_run_start: bool,
    pub order_qty: f64,
    pub records_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            strategy: std::env::var("STRATEGY_NAME").unwrap_or_else(|_| "ma".to_string()),
            dedup_mode: std::env::var("DEDUP_MODE")
                .ok()
                .and_then(|v| DedupMode::parse(&v))
                .unwrap_or(DedupMode::Both),
            reset_on_run_start: std::env::var("RESET_ON_RUN_START")
                .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(true),
            order_qty: std::env::var("ORDER_QTY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1.0),
            records_path: std::env::var("RECORDS_PATH").ok(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: "ma".to_string(),
            dedup_mode: DedupMode::Both,
            reset_on_run_start: true,
            order_qty: 1.0,
            records_path: None,
        }
    }
}

const ORDER_CONSUMER: &str = "order_consumer";

enum Dispatcher {
    Guarded(DedupGuard),
    Direct(EventBus),
}

impl Dispatcher {
    fn bus_mut(&mut self) -> &mut EventBus {
        match self {
            Dispatcher::Guarded(g) => g.bus_mut(),
            Dispatcher::Direct(b) => b,
        }
    }
}

impl Dispatch for Dispatcher {
    fn emit(&mut self, event: &Event) -> DispatchReport {
        match self {
            Dispatcher::Guarded(g) => g.emit(event),
            Dispatcher::Direct(b) => b.emit(event),
        }
    }
}

pub struct Pipeline {
    config: Config,
    interpreter: SignalInterpreter,
    dispatcher: Dispatcher,
    emission_registry: Arc<RuleIdRegistry>,
    consumer_registry: Arc<RuleIdRegistry>,
    orders: Arc<std::sync::Mutex<Vec<Order>>>,
    /// (emission, consumer) generation snapshot taken at run start.
    run_generations: Option<(u64, u64)>,
}

impl Pipeline {
    pub fn new(config: Config, sink: Arc<dyn RecordSink>) -> Self {
        // One registry instance per enforcement point; the two layers stay
        // independent so either can be deployed alone.
        let emission_registry = Arc::new(RuleIdRegistry::new());
        let consumer_registry = Arc::new(RuleIdRegistry::new());

        let consumer = OrderConsumer::new(
            Arc::clone(&consumer_registry),
            Arc::clone(&sink),
            config.dedup_mode.consumption_enabled(),
            config.order_qty,
        );
        let orders = consumer.outbox();

        let mut bus = EventBus::new();
        bus.subscribe(EventKind::Signal, ORDER_CONSUMER, 10, consumer.into_handler());

        let dispatcher = if config.dedup_mode.emission_enabled() {
            Dispatcher::Guarded(DedupGuard::new(
                bus,
                Arc::clone(&emission_registry),
                Arc::clone(&sink),
            ))
        } else {
            Dispatcher::Direct(bus)
        };

        let interpreter = SignalInterpreter::new(config.strategy.clone(), sink);

        Self {
            config,
            interpreter,
            dispatcher,
            emission_registry,
            consumer_registry,
            orders,
            run_generations: None,
        }
    }

    /// Begin an independent processing run. Resets dedup and interpreter
    /// state (unless configured off) and snapshots registry generations so
    /// a mid-run reset can be detected later.
    pub fn start_run(&mut self) {
        if self.config.reset_on_run_start {
            self.emission_registry.reset();
            self.consumer_registry.reset();
            self.interpreter.reset();
        }
        self.run_generations = Some((
            self.emission_registry.generation(),
            self.consumer_registry.generation(),
        ));
    }

    /// Feed one raw directional reading. Repeated directions produce no
    /// decision and nothing is dispatched.
    pub fn process(&mut self, symbol: &str, direction: Direction, price: f64) -> DispatchReport {
        match self.interpreter.interpret(symbol, direction, price) {
            Some(signal) => self.dispatch(&Event::signal(signal)),
            None => DispatchReport::default(),
        }
    }

    /// Programmatic injection path: dispatch an already-built event through
    /// the same enforcement chain as interpreted signals.
    pub fn emit(&mut self, event: &Event) -> DispatchReport {
        self.dispatch(event)
    }

    fn dispatch(&mut self, event: &Event) -> DispatchReport {
        let report = self.dispatcher.emit(event);
        // A consumer failure means the order never materialized. The consumer
        // re-offers its own registry; the emission registry must follow, or
        // the retry would be blocked before it could reach the consumer.
        for failure in &report.failures {
            if failure.handler == ORDER_CONSUMER {
                if let Some(rule_id) = &failure.rule_id {
                    self.emission_registry.release(rule_id);
                }
            }
        }
        report
    }

    /// Register an additional handler on the underlying bus.
    pub fn subscribe(
        &mut self,
        kind: EventKind,
        name: impl Into<String>,
        priority: i32,
        handler: Handler,
    ) {
        self.dispatcher.bus_mut().subscribe(kind, name, priority, handler);
    }

    /// Hand created orders to the downstream consumer.
    pub fn drain_orders(&mut self) -> Vec<Order> {
        std::mem::take(&mut *self.orders.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Fatal if a registry reset happened since `start_run`: the
    /// at-most-once guarantee no longer holds for this run.
    pub fn check_run_integrity(&self) -> Result<()> {
        let Some((emission_gen, consumer_gen)) = self.run_generations else {
            bail!("run integrity checked before start_run");
        };
        if self.emission_registry.generation() != emission_gen
            || self.consumer_registry.generation() != consumer_gen
        {
            bail!("registry reset during run; at-most-once guarantee invalidated");
        }
        Ok(())
    }

    pub fn emission_registry(&self) -> Arc<RuleIdRegistry> {
        Arc::clone(&self.emission_registry)
    }

    pub fn consumer_registry(&self) -> Arc<RuleIdRegistry> {
        Arc::clone(&self.consumer_registry)
    }
}
