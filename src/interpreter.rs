//! Stateful signal interpreter: raw directional ticks in, discrete
//! uniquely-identified trading decisions out.
//!
//! Per symbol it tracks the last observed direction and a monotonically
//! increasing group counter. The counter advances exactly once per direction
//! change, never on a repeated direction, and only `reset()` winds it back.
//! Skipping `reset()` between runs leaks groups across runs and breaks
//! rule_id reproducibility, so the orchestrator calls it at every run start.
//!
//! Per-symbol state is not internally synchronized: whoever feeds raw
//! signals must serialize ingestion per symbol.

use std::collections::HashMap;
use std::sync::Arc;

use crate::events::{Direction, SignalEvent};
use crate::records::{Record, RecordSink};

#[derive(Debug, Default)]
struct SymbolState {
    last_direction: Option<Direction>,
    group: u64,
}

pub struct SignalInterpreter {
    strategy: String,
    state: HashMap<String, SymbolState>,
    sink: Arc<dyn RecordSink>,
}

impl SignalInterpreter {
    pub fn new(strategy: impl Into<String>, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            strategy: strategy.into(),
            state: HashMap::new(),
            sink,
        }
    }

    /// Deterministic identifier for one logical trading decision. Two runs
    /// over identical input sequences produce identical rule_id sequences.
    fn rule_id(&self, symbol: &str, direction: Direction, group: u64) -> String {
        format!(
            "{}_{}_{}_group_{}",
            self.strategy,
            symbol,
            direction.rule_name(),
            group
        )
    }

    /// Interpret one raw directional reading. Returns a decision only on a
    /// direction change; a repeated direction is a no-op. Malformed input
    /// (empty symbol) is rejected locally, recorded, and never fatal.
    pub fn interpret(
        &mut self,
        symbol: &str,
        direction: Direction,
        price: f64,
    ) -> Option<SignalEvent> {
        if symbol.is_empty() {
            self.sink.record(Record::SignalRejected {
                reason: "missing_symbol".to_string(),
            });
            return None;
        }

        let state = self.state.entry(symbol.to_string()).or_default();
        if state.last_direction == Some(direction) {
            return None;
        }

        state.group += 1;
        state.last_direction = Some(direction);
        let group = state.group;
        let rule_id = self.rule_id(symbol, direction, group);

        self.sink.record(Record::SignalDecision {
            rule_id: rule_id.clone(),
            symbol: symbol.to_string(),
            direction: direction.rule_name().to_string(),
            group,
        });

        Some(SignalEvent {
            symbol: symbol.to_string(),
            direction,
            price,
            rule_id: Some(rule_id),
            group: Some(group),
        })
    }

    /// Clear all per-symbol state. Must run at the start of every
    /// independent run; groups never decrease otherwise.
    pub fn reset(&mut self) {
        self.state.clear();
    }

    pub fn group(&self, symbol: &str) -> u64 {
        self.state.get(symbol).map_or(0, |s| s.group)
    }
}
