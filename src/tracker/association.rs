//! Window queries and chi2-gated candidate collection

use smallvec::SmallVec;

use super::config::LayerSearchConfig;
use super::stats::EventStats;
use crate::detector::{ClusterRef, Detector};
use crate::error::TrackingError;
use crate::track::TrackState;

/// Query window on a layer, in z and the arc coordinate `r·φ`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchWindow {
    pub z_min: f64,
    pub z_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl SearchWindow {
    /// n-sigma window around a state predicted on a layer of radius `radius`
    pub fn around(state: &TrackState, radius: f64, config: &LayerSearchConfig) -> Self {
        let cov = state.covariance();
        let sy = (cov[(0, 0)] + config.resolution_y * config.resolution_y).sqrt();
        let sz = (cov[(1, 1)] + config.resolution_z * config.resolution_z).sqrt();
        let dy = (config.n_sigma_y * sy).min(config.max_window_y);
        let dz = (config.n_sigma_z * sz).min(config.max_window_z);

        let arc = radius * state.phi();
        let z = state.z();
        Self {
            z_min: z - dz,
            z_max: z + dz,
            y_min: arc - dy,
            y_max: arc + dy,
        }
    }
}

/// A cluster compatible with the predicted state
#[derive(Debug, Clone)]
pub struct Candidate {
    pub cluster: ClusterRef,
    /// Predicted chi2
    pub chi2: f64,
    /// Prediction in the frame of the cluster's module
    pub state: TrackState,
}

/// Candidates of one layer, best first
pub type Candidates = SmallVec<[Candidate; 4]>;

/// Collect the unused clusters of `layer` that pass the chi2 gate
///
/// Clusters on a module other than the predicted one are tested after
/// rotating a copy of the state into that module's frame. Geometric misses
/// and degenerate covariances drop the single candidate and are counted.
/// At most `max_candidates` are kept, sorted by ascending chi2.
pub fn collect_candidates(
    detector: &mut Detector,
    layer: usize,
    predicted: &TrackState,
    config: &LayerSearchConfig,
    max_candidates: usize,
    stats: &mut EventStats,
) -> Candidates {
    let window = SearchWindow::around(predicted, detector.layer(layer).radius(), config);
    detector
        .clusters_mut(layer)
        .select_clusters(window.z_min, window.z_max, window.y_min, window.y_max);

    let mut candidates = Candidates::new();
    while let Some(index) = detector.clusters_mut(layer).next_cluster() {
        let cluster_ref = ClusterRef::new(layer, index);
        let (Some(cluster), Some(module)) =
            (detector.cluster(cluster_ref), detector.module_of(cluster_ref))
        else {
            continue;
        };
        if cluster.used {
            continue;
        }

        let mut state = predicted.clone();
        let moved = state
            .rotate(module.alpha)
            .and_then(|_| state.transport_to(module.x));
        let chi2 = moved.and_then(|_| state.predicted_chi2(cluster));
        match chi2 {
            Ok(chi2) if chi2 < config.chi2_max => candidates.push(Candidate {
                cluster: cluster_ref,
                chi2,
                state,
            }),
            Ok(_) => {}
            Err(TrackingError::DegenerateCovariance { .. }) => stats.degenerate_candidates += 1,
            Err(_) => stats.geometry_misses += 1,
        }
    }

    candidates.sort_by(|a, b| a.chi2.total_cmp(&b.chi2));
    candidates.truncate(max_candidates);
    log::trace!(
        "layer {}: {} candidates in z [{:.3}, {:.3}] arc [{:.3}, {:.3}]",
        layer,
        candidates.len(),
        window.z_min,
        window.z_max,
        window.y_min,
        window.y_max
    );
    candidates
}
