//! Canonical event records flowing through the dispatch pipeline.
//!
//! Events are immutable by convention: handlers receive `&Event` and may
//! mutate only the consumption flag. The flag is cross-handler signaling,
//! not propagation control; the bus never stops delivery on its own.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_event_id() -> u64 {
    EVENT_SEQ.fetch_add(1, Ordering::SeqCst)
}

/// Epoch milliseconds (creation timestamps, replay correlation)
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Raw directional reading for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    Flat,
}

impl Direction {
    /// Name embedded in rule identifiers, e.g. `ma_MINI_BUY_group_1`.
    pub fn rule_name(&self) -> &'static str {
        match self {
            Direction::Long => "BUY",
            Direction::Short => "SELL",
            Direction::Flat => "FLAT",
        }
    }

    /// Order side implied by this direction. Flat carries no standalone
    /// side at this layer (closing requires position knowledge we don't own).
    pub fn side(&self) -> Option<Side> {
        match self {
            Direction::Long => Some(Side::Buy),
            Direction::Short => Some(Side::Sell),
            Direction::Flat => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// One discrete trading decision, produced by the interpreter.
///
/// `rule_id` is assigned only by the interpreter, never by a raw market-data
/// source. A signal without a rule_id is informational and never actionable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub symbol: String,
    pub direction: Direction,
    pub price: f64,
    pub rule_id: Option<String>,
    pub group: Option<u64>,
}

#[derive(Debug, Clone)]
pub enum EventPayload {
    Signal(SignalEvent),
    Info { message: String },
}

/// Subscription key for the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Signal,
    Info,
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Signal(_) => EventKind::Signal,
            EventPayload::Info { .. } => EventKind::Info,
        }
    }
}

pub struct Event {
    pub id: u64,
    pub ts: u64,
    pub payload: EventPayload,
    consumed: AtomicBool,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: next_event_id(),
            ts: ts_epoch_ms(),
            payload,
            consumed: AtomicBool::new(false),
        }
    }

    pub fn signal(signal: SignalEvent) -> Self {
        Self::new(EventPayload::Signal(signal))
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(EventPayload::Info {
            message: message.into(),
        })
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn as_signal(&self) -> Option<&SignalEvent> {
        match &self.payload {
            EventPayload::Signal(s) => Some(s),
            _ => None,
        }
    }

    /// Side-effecting handlers must check this before acting and call
    /// [`Event::mark_consumed`] after acting. The bus does not enforce it.
    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::SeqCst)
    }

    pub fn mark_consumed(&self) {
        self.consumed.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("ts", &self.ts)
            .field("payload", &self.payload)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

impl Clone for Event {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            ts: self.ts,
            payload: self.payload.clone(),
            consumed: AtomicBool::new(self.is_consumed()),
        }
    }
}
