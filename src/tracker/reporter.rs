//! Observability for reconstruction
//!
//! [`TrackingReporter`] receives callbacks at the key points of an event:
//! seeds starting, layers being searched, hypotheses completing and tracks
//! being accepted. All methods have empty defaults.
//!
//! - [`NoOpReporter`] - does nothing; used by [`crate::tracker::Tracker::reconstruct`]
//! - [`LoggingReporter`] - forwards events to the `log` facade
//! - [`DebugReporter`] - records every event for inspection in tests
//! - [`CompositeReporter`] - forwards to two reporters
//!
//! # Example
//!
//! ```
//! use siltrack::tracker::{DebugReporter, TrackingReporter};
//!
//! let mut reporter = DebugReporter::new();
//! reporter.on_seed_start(0, 0);
//! assert_eq!(reporter.seed_starts(), &[(0, 0)]);
//! ```

use super::event::EventOutput;
use crate::error::TrackingError;
use crate::track::TrackState;

/// Callbacks during reconstruction
///
/// Callbacks receive references; clone inside the callback to keep data.
pub trait TrackingReporter {
    /// Clusters are loaded and seeds are known
    fn on_event_start(&mut self, _n_clusters: usize, _n_seeds: usize) {}

    /// A seed starts its search in a pass
    fn on_seed_start(&mut self, _seed_index: usize, _pass: usize) {}

    /// The search reached a layer; `state` is the prediction on the layer
    fn on_layer(&mut self, _layer: usize, _state: &TrackState, _n_candidates: usize) {}

    /// A hypothesis reached the innermost layer
    fn on_hypothesis(&mut self, _state: &TrackState, _became_best: bool) {}

    /// A seed produced an accepted track
    fn on_track_accepted(&mut self, _seed_index: usize, _pass: usize, _state: &TrackState) {}

    /// A seed produced no track in a pass
    fn on_seed_rejected(&mut self, _seed_index: usize, _pass: usize, _reason: &TrackingError) {}

    /// The event is complete
    fn on_event_complete(&mut self, _output: &EventOutput) {}
}

/// Reporter that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReporter;

impl NoOpReporter {
    pub fn new() -> Self {
        Self
    }
}

impl TrackingReporter for NoOpReporter {}

/// Reporter that records every event
///
/// Stores clones of the states passed to it; intended for tests and
/// single-event debugging.
#[derive(Debug, Clone, Default)]
pub struct DebugReporter {
    events_started: usize,
    seed_starts: Vec<(usize, usize)>,
    layers: Vec<(usize, usize)>,
    hypotheses: Vec<(TrackState, bool)>,
    accepted: Vec<(usize, usize, TrackState)>,
    rejected: Vec<(usize, usize, String)>,
    completed: Vec<usize>,
}

impl DebugReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// `(seed_index, pass)` of every search started
    pub fn seed_starts(&self) -> &[(usize, usize)] {
        &self.seed_starts
    }

    /// `(layer, candidates)` of every layer visited
    pub fn layer_visits(&self) -> &[(usize, usize)] {
        &self.layers
    }

    /// Terminal hypotheses and whether each became the best
    pub fn hypotheses(&self) -> &[(TrackState, bool)] {
        &self.hypotheses
    }

    /// `(seed_index, pass, state)` of every accepted track
    pub fn accepted(&self) -> &[(usize, usize, TrackState)] {
        &self.accepted
    }

    /// `(seed_index, pass, reason)` of every seed without a track
    pub fn rejected(&self) -> &[(usize, usize, String)] {
        &self.rejected
    }

    /// Track counts of completed events
    pub fn completed_events(&self) -> &[usize] {
        &self.completed
    }

    pub fn events_started(&self) -> usize {
        self.events_started
    }
}

impl TrackingReporter for DebugReporter {
    fn on_event_start(&mut self, _n_clusters: usize, _n_seeds: usize) {
        self.events_started += 1;
    }

    fn on_seed_start(&mut self, seed_index: usize, pass: usize) {
        self.seed_starts.push((seed_index, pass));
    }

    fn on_layer(&mut self, layer: usize, _state: &TrackState, n_candidates: usize) {
        self.layers.push((layer, n_candidates));
    }

    fn on_hypothesis(&mut self, state: &TrackState, became_best: bool) {
        self.hypotheses.push((state.clone(), became_best));
    }

    fn on_track_accepted(&mut self, seed_index: usize, pass: usize, state: &TrackState) {
        self.accepted.push((seed_index, pass, state.clone()));
    }

    fn on_seed_rejected(&mut self, seed_index: usize, pass: usize, reason: &TrackingError) {
        self.rejected.push((seed_index, pass, reason.to_string()));
    }

    fn on_event_complete(&mut self, output: &EventOutput) {
        self.completed.push(output.num_tracks());
    }
}

/// Reporter that logs through the `log` facade
///
/// Event summaries at INFO, seed outcomes at DEBUG, layer detail at TRACE.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }
}

impl TrackingReporter for LoggingReporter {
    fn on_event_start(&mut self, n_clusters: usize, n_seeds: usize) {
        log::info!("Event start: {} clusters, {} seeds", n_clusters, n_seeds);
    }

    fn on_seed_start(&mut self, seed_index: usize, pass: usize) {
        log::trace!("Seed {} pass {}", seed_index, pass);
    }

    fn on_layer(&mut self, layer: usize, state: &TrackState, n_candidates: usize) {
        log::trace!(
            "  layer {}: phi={:.4} z={:.3} candidates={}",
            layer,
            state.phi(),
            state.z(),
            n_candidates
        );
    }

    fn on_hypothesis(&mut self, state: &TrackState, became_best: bool) {
        log::trace!(
            "  hypothesis: clusters={} chi2={:.3} best={}",
            state.n_clusters(),
            state.chi2(),
            became_best
        );
    }

    fn on_track_accepted(&mut self, seed_index: usize, pass: usize, state: &TrackState) {
        log::debug!(
            "Seed {} accepted in pass {}: {} clusters, chi2={:.3}",
            seed_index,
            pass,
            state.n_clusters(),
            state.chi2()
        );
    }

    fn on_seed_rejected(&mut self, seed_index: usize, pass: usize, reason: &TrackingError) {
        log::debug!("Seed {} rejected in pass {}: {}", seed_index, pass, reason);
    }

    fn on_event_complete(&mut self, output: &EventOutput) {
        log::info!(
            "Event complete: {} tracks from {} seeds",
            output.num_tracks(),
            output.stats.num_seeds()
        );
    }
}

/// Reporter that forwards every event to two reporters
#[derive(Debug, Clone)]
pub struct CompositeReporter<A: TrackingReporter, B: TrackingReporter> {
    first: A,
    second: B,
}

impl<A: TrackingReporter, B: TrackingReporter> CompositeReporter<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }

    pub fn first(&self) -> &A {
        &self.first
    }

    pub fn second(&self) -> &B {
        &self.second
    }

    pub fn into_parts(self) -> (A, B) {
        (self.first, self.second)
    }
}

impl<A: TrackingReporter, B: TrackingReporter> TrackingReporter for CompositeReporter<A, B> {
    fn on_event_start(&mut self, n_clusters: usize, n_seeds: usize) {
        self.first.on_event_start(n_clusters, n_seeds);
        self.second.on_event_start(n_clusters, n_seeds);
    }

    fn on_seed_start(&mut self, seed_index: usize, pass: usize) {
        self.first.on_seed_start(seed_index, pass);
        self.second.on_seed_start(seed_index, pass);
    }

    fn on_layer(&mut self, layer: usize, state: &TrackState, n_candidates: usize) {
        self.first.on_layer(layer, state, n_candidates);
        self.second.on_layer(layer, state, n_candidates);
    }

    fn on_hypothesis(&mut self, state: &TrackState, became_best: bool) {
        self.first.on_hypothesis(state, became_best);
        self.second.on_hypothesis(state, became_best);
    }

    fn on_track_accepted(&mut self, seed_index: usize, pass: usize, state: &TrackState) {
        self.first.on_track_accepted(seed_index, pass, state);
        self.second.on_track_accepted(seed_index, pass, state);
    }

    fn on_seed_rejected(&mut self, seed_index: usize, pass: usize, reason: &TrackingError) {
        self.first.on_seed_rejected(seed_index, pass, reason);
        self.second.on_seed_rejected(seed_index, pass, reason);
    }

    fn on_event_complete(&mut self, output: &EventOutput) {
        self.first.on_event_complete(output);
        self.second.on_event_complete(output);
    }
}
