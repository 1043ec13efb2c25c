//! Per-event counters
//!
//! Local failures never abort reconstruction; they are tallied here and
//! reported with the event output.

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Counters gathered while reconstructing one event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStats {
    /// Clusters loaded
    pub clusters: usize,
    /// External seeds supplied
    pub external_seeds: usize,
    /// Seeds synthesized from cluster triplets
    pub standalone_seeds: usize,
    /// Accepted tracks per pass
    pub tracks_per_pass: Vec<usize>,
    /// Seeds whose best hypothesis fell short of the pass minimum
    pub insufficient_clusters: usize,
    /// Seeds that produced no terminal hypothesis at all
    pub seeds_without_hypothesis: usize,
    /// Propagations aborted by a geometric miss
    pub geometry_misses: usize,
    /// Candidates skipped on a degenerate innovation covariance
    pub degenerate_candidates: usize,
    /// Terminal hypotheses rejected by the vertex gate
    pub vertex_rejections: usize,
    /// Search nodes expanded over all seeds and passes
    pub nodes_expanded: usize,
    /// Searches stopped by the node budget
    pub budget_exhausted: usize,
    /// Refits that failed; the search estimate was kept
    pub refit_failures: usize,
}

impl EventStats {
    /// Counters for a run of `num_passes` passes
    pub fn new(num_passes: usize) -> Self {
        Self {
            tracks_per_pass: vec![0; num_passes],
            ..Default::default()
        }
    }

    /// Total accepted tracks
    pub fn num_tracks(&self) -> usize {
        self.tracks_per_pass.iter().sum()
    }

    /// Total seeds processed
    pub fn num_seeds(&self) -> usize {
        self.external_seeds + self.standalone_seeds
    }
}

impl AddAssign<&EventStats> for EventStats {
    fn add_assign(&mut self, other: &EventStats) {
        if self.tracks_per_pass.len() < other.tracks_per_pass.len() {
            self.tracks_per_pass.resize(other.tracks_per_pass.len(), 0);
        }
        for (sum, n) in self.tracks_per_pass.iter_mut().zip(&other.tracks_per_pass) {
            *sum += n;
        }
        self.clusters += other.clusters;
        self.external_seeds += other.external_seeds;
        self.standalone_seeds += other.standalone_seeds;
        self.insufficient_clusters += other.insufficient_clusters;
        self.seeds_without_hypothesis += other.seeds_without_hypothesis;
        self.geometry_misses += other.geometry_misses;
        self.degenerate_candidates += other.degenerate_candidates;
        self.vertex_rejections += other.vertex_rejections;
        self.nodes_expanded += other.nodes_expanded;
        self.budget_exhausted += other.budget_exhausted;
        self.refit_failures += other.refit_failures;
    }
}
