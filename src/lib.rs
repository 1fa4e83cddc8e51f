//! Event dispatch and idempotency core for a trading-signal pipeline.
//!
//! Raw directional readings become discrete, uniquely-identified trading
//! decisions ([`interpreter::SignalInterpreter`]), travel a synchronous
//! priority-ordered bus ([`bus::EventBus`]), and pass up to two independent
//! rule_id enforcement points ([`guard::DedupGuard`] at emission,
//! [`consumer::OrderConsumer`] at consumption) before an order is built
//! ([`order::OrderFactory`]). The guarantee: at most one order per logical
//! trading decision per run, no matter how many times or through how many
//! paths the underlying signal is emitted.

pub mod bus;
pub mod consumer;
pub mod events;
pub mod guard;
pub mod interpreter;
pub mod order;
pub mod pipeline;
pub mod records;
pub mod registry;
