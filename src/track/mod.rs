//! Track state and transport
//!
//! - [`state`] - Kalman state in the rotating module frame, transport and update
//! - [`propagator`] - Material corrections, passive shells and the vertex constraint

pub mod propagator;
pub mod state;

pub use propagator::{bethe_bloch, Material, Propagator, Vertex};
pub use state::{TrackCovariance, TrackParams, TrackState, UpdateOutcome};
