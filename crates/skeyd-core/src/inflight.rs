// ── In-flight sequence tokens ──
//
// A token enters the set when a script is launched for its notification and
// leaves when that script is reaped. There is no timeout: a script that never
// exits keeps its token blocked for the life of the process.

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct InFlight {
    tokens: HashSet<String>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, sequence: &str) -> bool {
        self.tokens.contains(sequence)
    }

    /// Returns `false` if the token was already in flight.
    pub fn insert(&mut self, sequence: impl Into<String>) -> bool {
        self.tokens.insert(sequence.into())
    }

    /// Returns `false` if the token was not in flight.
    pub fn remove(&mut self, sequence: &str) -> bool {
        self.tokens.remove(sequence)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
