//! Shared numerics and toy-event generation
//!
//! - [`constants`] - Physical and numerical constants
//! - [`linalg`] - Small fixed-size Kalman algebra
//! - [`simulation`] - Deterministic toy events for tests and benchmarks

pub mod constants;
pub mod linalg;
pub mod simulation;
