//! Token estimation utilities.
//!
//! Uses a character-based heuristic with a configurable divisor (4 by
//! default). The only contract callers rely on is monotonicity: longer text
//! never costs fewer tokens.

use steward_core::session::Turn;

/// Per-turn overhead for role names and delimiters in the wire format.
pub const TURN_OVERHEAD: usize = 4;

/// Character-count token estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimator {
    chars_per_token: usize,
}

impl TokenEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    /// Estimated tokens for `text`, rounded up.
    pub fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }

    /// Estimated tokens for a turn including per-turn overhead.
    pub fn estimate_turn(&self, turn: &Turn) -> usize {
        TURN_OVERHEAD + self.estimate(&turn.content)
    }

    pub fn estimate_turns(&self, turns: &[Turn]) -> usize {
        turns.iter().map(|t| self.estimate_turn(t)).sum()
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Estimate with the default divisor.
pub fn estimate_tokens(text: &str) -> usize {
    TokenEstimator::default().estimate(text)
}
