//! Track finding and fitting
//!
//! - [`config`] - Thresholds, budgets and passes
//! - [`association`] - Search windows and chi2-gated candidates
//! - [`hypothesis`] - Ranking and best-hypothesis bookkeeping
//! - [`finder`] - Depth-first inward search for one seed
//! - [`refit`] - Outward and inward refits over the recorded clusters
//! - [`seeding`] - Seeds from cluster triplets
//! - [`quality`] - Truth labels and dE/dx
//! - [`controller`] - [`Tracker`], the per-event driver
//! - [`event`] - Event input and output records
//! - [`stats`] - Per-event counters
//! - [`reporter`] - Observability callbacks

pub mod association;
pub mod config;
pub mod controller;
pub mod event;
pub mod finder;
pub mod hypothesis;
pub mod quality;
pub mod refit;
pub mod reporter;
pub mod seeding;
pub mod stats;

// ============================================================================
// Defaults
// ============================================================================

/// chi2 gate of a cluster (two degrees of freedom)
pub const DEFAULT_CHI2_MAX: f64 = 30.0;

/// Search window half-width in predicted sigmas
pub const DEFAULT_N_SIGMA: f64 = 3.5;

/// Layers a track may cross without a cluster
pub const DEFAULT_MAX_SKIPS: usize = 2;

/// Consecutive layers a track may cross without a cluster
pub const DEFAULT_MAX_CONSECUTIVE_SKIPS: usize = 1;

/// Branches kept per layer
pub const DEFAULT_MAX_CANDIDATES: usize = 4;

/// Search nodes per seed and pass
pub const DEFAULT_MAX_HYPOTHESES: usize = 200;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{
    LayerSearchConfig, PassConfig, RefitConfig, SeedingConfig, StandaloneMode, TrackerConfig,
    TrackerConfigBuilder,
};
pub use controller::Tracker;
pub use event::{EventInput, EventOutput, ReconstructedTrack, Seed, TrackEstimate, TrackFlags};
pub use finder::{SearchResult, TrackFinder};
pub use hypothesis::{HypothesisManager, Ranking};
pub use refit::{RefitResult, Refitter};
pub use reporter::{
    CompositeReporter, DebugReporter, LoggingReporter, NoOpReporter, TrackingReporter,
};
pub use seeding::StandaloneSeeder;
pub use stats::EventStats;
