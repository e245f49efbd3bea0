//! Unique identifiers for addressable entities.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out identifiers that are unique per generator instance.
///
/// Values are decimal strings counting up from `"1"`. The generator is
/// lock-free and may be shared between any number of threads.
#[derive(Debug)]
pub struct Identifier {
    counter: AtomicU64,
}

impl Identifier {
    /// Creates a generator whose first identifier is `"1"`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Returns an identifier never before returned by this generator.
    #[must_use]
    pub fn next(&self) -> String {
        let value = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        value.to_string()
    }
}

impl Default for Identifier {
    fn default() -> Self {
        Self::new()
    }
}
