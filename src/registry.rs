//! Rule-identifier registry: the single source of truth for "already acted".
//!
//! `try_accept` is an atomic check-and-insert under one lock. A separate
//! contains-then-insert pair would reopen the race between two emissions of
//! the same new rule_id, so no `contains` is exposed at all. `reset` shares
//! the same mutual-exclusion domain, so a reset can never interleave with an
//! in-flight accept.

use std::collections::HashSet;
use std::sync::Mutex;

struct RegistryInner {
    seen: HashSet<String>,
    generation: u64,
}

pub struct RuleIdRegistry {
    inner: Mutex<RegistryInner>,
}

impl RuleIdRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                seen: HashSet::new(),
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        // A poisoned lock still holds a consistent set (single-insert ops),
        // and dropping the guarantee would be worse than continuing.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Atomic check-and-insert. True exactly once per rule_id per run.
    pub fn try_accept(&self, rule_id: &str) -> bool {
        let mut inner = self.lock();
        inner.seen.insert(rule_id.to_string())
    }

    /// Re-offer a rule_id whose downstream effect failed to materialize
    /// (order construction error). Returns true if the id was present.
    pub fn release(&self, rule_id: &str) -> bool {
        let mut inner = self.lock();
        inner.seen.remove(rule_id)
    }

    /// Clear all recorded ids. Intended to be called only between runs, by
    /// the run orchestrator; never triggered implicitly by dispatch.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.seen.clear();
        inner.generation += 1;
    }

    /// Bumped on every reset. An orchestrator snapshots this at run start
    /// and treats a mid-run change as fatal (the at-most-once guarantee no
    /// longer holds for the run).
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn len(&self) -> usize {
        self.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().seen.is_empty()
    }
}

impl Default for RuleIdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_accept_once() {
        let reg = RuleIdRegistry::new();
        assert!(reg.try_accept("ma_MINI_BUY_group_1"));
        assert!(!reg.try_accept("ma_MINI_BUY_group_1"));
        assert!(reg.try_accept("ma_MINI_SELL_group_2"));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_reset_reopens_ids() {
        let reg = RuleIdRegistry::new();
        assert!(reg.try_accept("a"));
        assert!(!reg.try_accept("a"));
        reg.reset();
        assert!(reg.try_accept("a"));
    }

    #[test]
    fn test_release_reopens_single_id() {
        let reg = RuleIdRegistry::new();
        assert!(reg.try_accept("a"));
        assert!(reg.try_accept("b"));
        assert!(reg.release("a"));
        assert!(!reg.release("a"));
        assert!(reg.try_accept("a"));
        assert!(!reg.try_accept("b"));
    }

    #[test]
    fn test_generation_bumps_on_reset() {
        let reg = RuleIdRegistry::new();
        let g0 = reg.generation();
        reg.reset();
        reg.reset();
        assert_eq!(reg.generation(), g0 + 2);
    }

    #[test]
    fn test_concurrent_accept_single_winner() {
        let reg = Arc::new(RuleIdRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let reg = Arc::clone(&reg);
            handles.push(std::thread::spawn(move || reg.try_accept("contested")));
        }
        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
        assert_eq!(reg.len(), 1);
    }
}
