//! Token usage tracking types.

use serde::{Deserialize, Serialize};

/// Token usage statistics reported by the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub cache_read_input_tokens: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub cache_creation_input_tokens: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl Usage {
    /// Total tokens (input, cache and output).
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens
            + self.cache_read_input_tokens
            + self.cache_creation_input_tokens
            + self.output_tokens
    }

    /// True when no tokens were consumed at all.
    ///
    /// The CLI reports all-zero usage on messages it synthesizes locally
    /// instead of receiving them from the API.
    pub fn is_zero(&self) -> bool {
        self.total_tokens() == 0
    }

    /// Accumulate usage from another Usage instance.
    pub fn accumulate(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_input_tokens += other.cache_read_input_tokens;
        self.cache_creation_input_tokens += other.cache_creation_input_tokens;
    }
}
