/*!
# siltrack - Track reconstruction for cylindrical silicon trackers

Kalman-filter track finding and fitting for a barrel of silicon layers in a
solenoid field. Seeds handed over by an outer detector (or built from
cluster triplets) are followed inward layer by layer; every layer may offer
several compatible clusters and the search keeps the best hypothesis per
seed. Accepted tracks claim their clusters, get refitted and are returned
with their truth label and specific energy loss.

## Features

- Helix transport in rotating module frames with multiple scattering and
  energy loss
- Depth-first multi-candidate search with skip, dead-zone and node budgets
- Vertex-constrained and unconstrained passes with greedy cluster ownership
- Outward and inward refits, label cooking and truncated-mean dE/dx
- Standalone seeding from cluster triplets

## Modules

- [`detector`] - Layer geometry, material and the per-layer cluster index
- [`track`] - Track state, propagator and vertex constraint
- [`tracker`] - Search, refit, seeding and the per-event [`Tracker`]
- [`common`] - Constants, small linear algebra and toy events
- [`error`] - [`TrackingError`]

## Example

```rust
use siltrack::common::simulation::{EventGenerator, TrackSpec};
use siltrack::{EventInput, GeometryDescription, Tracker, TrackerConfig};

let mut tracker =
    Tracker::from_description(&GeometryDescription::six_layer_barrel(), TrackerConfig::default())
        .unwrap();

// One 1 GeV track with a seed at 50 cm
let generator = EventGenerator::new(tracker.detector());
let spec = TrackSpec::new(1.0, 0.3, 0.1);
let event = EventInput::new(
    generator.clusters(&spec).unwrap(),
    vec![generator.seed(&spec, 50.0, 1.0).unwrap()],
    None,
);

let output = tracker.reconstruct(event).unwrap();
assert_eq!(output.num_tracks(), 1);
assert_eq!(output.tracks[0].n_clusters, 6);
```
*/

// ============================================================================
// Core modules
// ============================================================================

/// Error type shared by the whole crate
pub mod error;

/// Low-level utilities (constants, linear algebra, simulation)
pub mod common;

/// Detector geometry and event cluster storage
pub mod detector;

/// Track state and propagation
pub mod track;

/// Track finding, fitting and event reconstruction
pub mod tracker;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// Errors
pub use error::{Result, TrackingError};

// Detector
pub use detector::{ClusterInput, Detector, GeometryDescription};

// Track
pub use track::{Propagator, TrackState, Vertex};

// Reconstruction
pub use tracker::{
    EventInput, EventOutput, EventStats, ReconstructedTrack, Seed, Tracker, TrackerConfig,
    TrackingReporter,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
