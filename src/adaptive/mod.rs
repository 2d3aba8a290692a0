//! Spaced-repetition scheduling and adaptive difficulty.
//!
//! Everything below `memory`, `signals`, `context` and `quiz` is a pure value
//! transform. [`engine::AdaptiveEngine`] is the only part that touches storage.

pub mod config;
pub mod context;
pub mod engine;
pub mod memory;
pub mod quiz;
pub mod signals;
pub mod types;
