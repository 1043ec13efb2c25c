//! Trackers and toy events on the six-layer barrel

use siltrack::common::simulation::{EventGenerator, TrackSpec};
use siltrack::detector::ClusterInput;
use siltrack::{EventInput, GeometryDescription, Seed, Tracker, TrackerConfig};

/// Radius at which outer-detector seeds are placed [cm]
pub const SEED_RADIUS: f64 = 50.0;

/// Default configuration without energy loss (toy tracks lose none)
pub fn quiet_config() -> TrackerConfig {
    TrackerConfig::builder().energy_loss(false).build()
}

/// Tracker on the six-layer barrel
pub fn barrel_tracker(config: TrackerConfig) -> Tracker {
    Tracker::from_description(&GeometryDescription::six_layer_barrel(), config)
        .expect("barrel tracker")
}

pub fn generator(tracker: &Tracker) -> EventGenerator {
    EventGenerator::new(tracker.detector())
}

/// Exact clusters of a track
pub fn clusters(tracker: &Tracker, spec: &TrackSpec) -> Vec<ClusterInput> {
    generator(tracker).clusters(spec).expect("track reaches the detector")
}

/// Exact seed at [`SEED_RADIUS`]
pub fn seed(tracker: &Tracker, spec: &TrackSpec, quality: f64) -> Seed {
    generator(tracker)
        .seed(spec, SEED_RADIUS, quality)
        .expect("seed radius reachable")
}

/// Event with one seeded track and its exact clusters
pub fn single_track_event(tracker: &Tracker, spec: &TrackSpec) -> EventInput {
    EventInput::new(clusters(tracker, spec), vec![seed(tracker, spec, 1.0)], None)
}
