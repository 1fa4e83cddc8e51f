//! Order construction from accepted decisions.
//!
//! order_ids are independently unique (UUID v4) and never derived from the
//! rule_id: one rule_id maps to at most one order, but order identity must
//! hold even across different rule_ids. Duplication is filtered before this
//! point; the factory fails only on structurally invalid decisions.

use serde::Serialize;
use uuid::Uuid;

use crate::events::{Side, SignalEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Created,
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub price: f64,
    /// Decision that caused this order, for traceability.
    pub rule_id: String,
    pub status: OrderStatus,
}

impl Order {
    pub fn submit(&mut self) {
        self.status = OrderStatus::Submitted;
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum OrderError {
    #[error("decision has no symbol")]
    MissingSymbol,
    #[error("decision has no rule_id")]
    MissingRuleId,
    #[error("direction {0} carries no actionable side")]
    NoActionableSide(&'static str),
    #[error("invalid quantity {0}")]
    InvalidQuantity(f64),
}

pub struct OrderFactory;

impl OrderFactory {
    pub fn create_order(decision: &SignalEvent, qty: f64) -> Result<Order, OrderError> {
        if decision.symbol.is_empty() {
            return Err(OrderError::MissingSymbol);
        }
        let rule_id = decision
            .rule_id
            .clone()
            .ok_or(OrderError::MissingRuleId)?;
        let side = decision
            .direction
            .side()
            .ok_or(OrderError::NoActionableSide(decision.direction.rule_name()))?;
        if !(qty.is_finite() && qty > 0.0) {
            return Err(OrderError::InvalidQuantity(qty));
        }
        Ok(Order {
            order_id: Uuid::new_v4().to_string(),
            symbol: decision.symbol.clone(),
            side,
            qty,
            price: decision.price,
            rule_id,
            status: OrderStatus::Created,
        })
    }
}
