//! Shared setup for integration tests
//!
//! - [`assertions`] - Numerical comparisons with tolerance
//! - [`events`] - Trackers and toy events on the six-layer barrel

#![allow(dead_code)]

pub mod assertions;
pub mod events;
