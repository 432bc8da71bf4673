//! Token accounting: per-call counters and the per-session ledger.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Counters returned by every facade call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cached_tokens += other.cached_tokens;
    }
}

/// Per-session accumulator. Writes are fire-and-forget from the engine's
/// perspective: a lock and an add, nothing that can fail.
#[derive(Default)]
pub struct UsageLedger {
    totals: RwLock<HashMap<String, TokenUsage>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, session_id: &str, usage: TokenUsage) {
        let mut totals = self.totals.write();
        totals.entry(session_id.to_string()).or_default().add(usage);
    }

    pub fn totals(&self, session_id: &str) -> TokenUsage {
        self.totals
            .read()
            .get(session_id)
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_accumulates_per_session() {
        let ledger = UsageLedger::new();
        ledger.record(
            "s1",
            TokenUsage {
                input_tokens: 100,
                output_tokens: 20,
                cached_tokens: 5,
            },
        );
        ledger.record(
            "s1",
            TokenUsage {
                input_tokens: 50,
                output_tokens: 10,
                cached_tokens: 0,
            },
        );
        ledger.record(
            "s2",
            TokenUsage {
                input_tokens: 1,
                output_tokens: 1,
                cached_tokens: 1,
            },
        );

        let s1 = ledger.totals("s1");
        assert_eq!(s1.input_tokens, 150);
        assert_eq!(s1.output_tokens, 30);
        assert_eq!(s1.cached_tokens, 5);
        assert_eq!(ledger.totals("s2").input_tokens, 1);
        assert_eq!(ledger.totals("missing"), TokenUsage::default());
    }
}
