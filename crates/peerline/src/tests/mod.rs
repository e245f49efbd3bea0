//! Crate-internal behavioural tests.

mod support;
