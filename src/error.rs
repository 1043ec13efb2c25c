//! Error types for track reconstruction
//!
//! Local errors ([`TrackingError::GeometryMiss`], [`TrackingError::DegenerateCovariance`])
//! abort a single propagation or update step and are recovered by the search.
//! Everything else is raised while building the tracker or loading inputs and
//! is surfaced to the caller.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, TrackingError>;

/// Errors that can occur during reconstruction
#[derive(Debug, Error)]
pub enum TrackingError {
    /// The track cannot reach the requested radius or plane
    #[error("Track cannot reach radius {radius:.4} cm")]
    GeometryMiss {
        /// Target radius (or local x) that could not be reached
        radius: f64,
    },

    /// Innovation covariance is singular or not positive definite
    #[error("Degenerate covariance: {context}")]
    DegenerateCovariance {
        /// Which matrix failed
        context: String,
    },

    /// A finished hypothesis has too few clusters for the current pass
    #[error("Insufficient clusters: found {found}, required {required}")]
    InsufficientClusters {
        /// Clusters attached to the best hypothesis
        found: usize,
        /// Minimum required by the pass
        required: usize,
    },

    /// No hypothesis reached the innermost layer
    #[error("No hypothesis completed ({nodes} nodes expanded)")]
    NoHypothesis {
        /// Search nodes spent on the seed
        nodes: usize,
    },

    /// Invalid tracker configuration
    #[error("Configuration error: {description}")]
    Configuration {
        /// Description of the configuration issue
        description: String,
    },

    /// Invalid or missing detector geometry
    #[error("Invalid geometry: {description}")]
    InvalidGeometry {
        /// Description of the geometry issue
        description: String,
    },

    /// External input inconsistent with the geometry
    #[error("Invalid input: {description}")]
    InvalidInput {
        /// Description of the input issue
        description: String,
    },

    /// File access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrackingError {
    /// Whether this error aborts reconstruction rather than a single step
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            TrackingError::GeometryMiss { .. }
                | TrackingError::DegenerateCovariance { .. }
                | TrackingError::InsufficientClusters { .. }
                | TrackingError::NoHypothesis { .. }
        )
    }

    pub(crate) fn configuration(description: impl Into<String>) -> Self {
        TrackingError::Configuration {
            description: description.into(),
        }
    }

    pub(crate) fn geometry(description: impl Into<String>) -> Self {
        TrackingError::InvalidGeometry {
            description: description.into(),
        }
    }

    pub(crate) fn input(description: impl Into<String>) -> Self {
        TrackingError::InvalidInput {
            description: description.into(),
        }
    }

    pub(crate) fn degenerate(context: impl Into<String>) -> Self {
        TrackingError::DegenerateCovariance {
            context: context.into(),
        }
    }
}
