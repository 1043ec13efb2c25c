//! Event inputs and reconstructed output
//!
//! - [`Seed`] - Starting parameters handed over by the outer detector
//! - [`EventInput`] - Clusters, seeds and vertex of one event
//! - [`ReconstructedTrack`] - One accepted track
//! - [`EventOutput`] - All tracks of an event plus its counters

use nalgebra::{Matrix5, Vector5};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::stats::EventStats;
use crate::common::constants::ALMOST_ONE;
use crate::detector::ClusterInput;
use crate::error::{Result, TrackingError};
use crate::track::{TrackState, Vertex};

/// Initial track parameters and covariance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    /// Local x of the starting point [cm]
    pub x: f64,
    /// Frame azimuth [rad]
    pub alpha: f64,
    /// `[y, z, snp, tgl, c]`
    pub params: Vector5<f64>,
    pub covariance: Matrix5<f64>,
    /// Ordering key; lower is processed first
    #[serde(default)]
    pub quality: f64,
    /// Truth label of the seeding particle
    #[serde(default)]
    pub label: Option<i64>,
}

impl Seed {
    /// Seed from an existing state
    pub fn from_state(state: &TrackState, quality: f64) -> Self {
        Self {
            x: state.x(),
            alpha: state.alpha(),
            params: *state.params(),
            covariance: *state.covariance(),
            quality,
            label: state.label(),
        }
    }

    /// Track state with one cluster slot per layer
    ///
    /// Fails on non-finite values or a direction parallel to the frame plane.
    pub fn to_state(&self, num_layers: usize) -> Result<TrackState> {
        let finite = self.x.is_finite()
            && self.alpha.is_finite()
            && self.params.iter().all(|v| v.is_finite())
            && self.covariance.iter().all(|v| v.is_finite());
        if !finite {
            return Err(TrackingError::input("seed has non-finite parameters"));
        }
        if self.params[2].abs() >= ALMOST_ONE {
            return Err(TrackingError::input(format!(
                "seed snp {} is not representable",
                self.params[2]
            )));
        }
        if self.covariance.diagonal().iter().any(|v| *v < 0.0) {
            return Err(TrackingError::input("seed covariance has a negative variance"));
        }
        Ok(
            TrackState::new(self.x, self.alpha, self.params, self.covariance, num_layers)
                .with_label(self.label),
        )
    }
}

/// Everything reconstruction needs for one event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventInput {
    pub clusters: Vec<ClusterInput>,
    #[serde(default)]
    pub seeds: Vec<Seed>,
    /// Primary vertex; the configured beam spot is used when absent
    #[serde(default)]
    pub vertex: Option<Vertex>,
}

impl EventInput {
    pub fn new(clusters: Vec<ClusterInput>, seeds: Vec<Seed>, vertex: Option<Vertex>) -> Self {
        Self {
            clusters,
            seeds,
            vertex,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// State estimate in a module frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackEstimate {
    pub x: f64,
    pub alpha: f64,
    pub params: Vector5<f64>,
    pub covariance: Matrix5<f64>,
}

impl From<&TrackState> for TrackEstimate {
    fn from(state: &TrackState) -> Self {
        Self {
            x: state.x(),
            alpha: state.alpha(),
            params: *state.params(),
            covariance: *state.covariance(),
        }
    }
}

/// Status bits of a reconstructed track
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackFlags {
    /// Found in a vertex-constrained pass
    pub constrained: bool,
    /// Final estimate comes from the inward refit
    pub refitted: bool,
    /// The refit failed and the search estimate was kept
    pub refit_failed: bool,
    /// Cluster labels disagree beyond the fake fraction
    pub fake: bool,
    /// Seed synthesized from a cluster triplet
    pub standalone: bool,
}

/// One accepted track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedTrack {
    /// Position of the seed in the event's seed list (standalone seeds follow
    /// the external ones)
    pub seed_index: usize,
    /// Pass that accepted the track
    pub pass: usize,
    /// Innermost estimate (at the vertex for constrained tracks)
    pub estimate: TrackEstimate,
    /// Estimate at the outermost cluster, handed back to the outer detector
    pub outer: Option<TrackEstimate>,
    /// Sorted cluster index per layer, innermost first
    pub clusters: Vec<Option<usize>>,
    /// Caller identifiers of the clusters, per layer
    pub cluster_ids: Vec<Option<u64>>,
    pub n_clusters: usize,
    pub n_skips: usize,
    pub n_dead_zones: usize,
    pub chi2: f64,
    /// Truth label, negative for fakes
    pub label: Option<i64>,
    /// Truncated-mean specific energy loss (charge per unit path)
    pub dedx: f64,
    /// Transverse momentum [GeV]
    pub pt: f64,
    pub flags: TrackFlags,
}

impl ReconstructedTrack {
    /// Layers with a cluster, innermost first
    pub fn layers(&self) -> impl Iterator<Item = usize> + '_ {
        self.clusters
            .iter()
            .enumerate()
            .filter_map(|(layer, slot)| slot.map(|_| layer))
    }
}

/// Tracks and counters of one event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventOutput {
    pub tracks: Vec<ReconstructedTrack>,
    pub stats: EventStats,
}

impl EventOutput {
    #[inline]
    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
