//! Outward and inward refits over the recorded clusters
//!
//! No search happens here: the clusters a hypothesis collected are replayed
//! in order. The outward pass starts at the innermost estimate and ends at
//! the outermost cluster, which is the estimate handed back to the outer
//! detector. The inward pass starts from there with a fresh covariance and
//! gives the final estimate, at the vertex for constrained tracks.

use super::config::{PassConfig, RefitConfig};
use super::quality::path_length_factor;
use crate::detector::{ClusterRef, Detector, DetectorLayer};
use crate::error::{Result, TrackingError};
use crate::track::{Material, Propagator, TrackState, Vertex};

/// Estimates produced by a successful refit
#[derive(Debug, Clone)]
pub struct RefitResult {
    /// Final inward estimate
    pub state: TrackState,
    /// Estimate at the outermost cluster after the outward pass
    pub outer: TrackState,
    /// Cluster charge divided by the path-length factor, outermost first
    pub dedx_samples: Vec<f64>,
}

/// Replays recorded clusters through the detector
pub struct Refitter<'a> {
    detector: &'a Detector,
    propagator: Propagator,
    config: &'a RefitConfig,
}

impl<'a> Refitter<'a> {
    pub fn new(detector: &'a Detector, propagator: Propagator, config: &'a RefitConfig) -> Self {
        Self {
            detector,
            propagator,
            config,
        }
    }

    /// Refit a hypothesis produced by the search
    ///
    /// `vertex` is applied at the end of the inward pass for constrained
    /// passes. A cluster failing the refit gate fails the whole refit.
    pub fn refit(
        &self,
        search: &TrackState,
        vertex: Option<(&Vertex, &PassConfig)>,
    ) -> Result<RefitResult> {
        let clusters: Vec<ClusterRef> = search.cluster_refs().collect();
        if clusters.is_empty() {
            return Err(TrackingError::InsufficientClusters {
                found: 0,
                required: 1,
            });
        }

        let mut outward = self.restart(search);
        for &cluster in &clusters {
            self.visit(&mut outward, cluster, 1.0, clusters.len())?;
        }
        let outer = outward.clone();

        let mut inward = self.restart(&outward);
        let mut dedx_samples = Vec::with_capacity(clusters.len());
        for &cluster in clusters.iter().rev() {
            let factor = self.visit(&mut inward, cluster, -1.0, clusters.len())?;
            if let Some(record) = self.detector.cluster(cluster) {
                dedx_samples.push(record.charge / factor);
            }
        }

        if let Some((vertex, pass)) = vertex {
            let shells = self.detector.passive_between(inward.radius(), 0.0);
            let outcome = self.propagator.constrain_to_vertex(
                &mut inward,
                vertex,
                pass.vertex_weight,
                pass.vertex_chi2_max,
                &shells,
            )?;
            if !outcome.is_accepted() {
                log::debug!("refit: vertex rejected with chi2 {:.2}", outcome.chi2());
            }
        }

        Ok(RefitResult {
            state: inward,
            outer,
            dedx_samples,
        })
    }

    /// Copy of `state` without fit history and with an inflated covariance
    fn restart(&self, state: &TrackState) -> TrackState {
        let mut fresh = state.clone();
        fresh.reset_history();
        fresh.reset_covariance(self.config.covariance_scale);
        fresh
    }

    /// Move to a cluster's module, update with it and cross the layer
    ///
    /// Returns the path-length factor at the cluster.
    fn visit(
        &self,
        state: &mut TrackState,
        cluster_ref: ClusterRef,
        direction: f64,
        expected: usize,
    ) -> Result<f64> {
        let cluster = self.detector.cluster(cluster_ref).ok_or_else(|| {
            TrackingError::input(format!("unknown cluster {:?}", cluster_ref))
        })?;
        let layer = self.detector.layer(cluster_ref.layer);
        let module = layer.module(cluster.module).ok_or_else(|| {
            TrackingError::input(format!("cluster {:?} on unknown module", cluster_ref))
        })?;

        let shells = self.detector.passive_between(state.radius(), layer.radius());
        self.propagator.cross_shells(state, &shells)?;
        state.rotate(module.alpha)?;
        state.transport_to(module.x)?;

        let outcome = state.update(cluster_ref, cluster, self.config.chi2_max)?;
        if !outcome.is_accepted() {
            log::debug!(
                "refit: cluster {:?} rejected with chi2 {:.2}",
                cluster_ref,
                outcome.chi2()
            );
            return Err(TrackingError::InsufficientClusters {
                found: state.n_clusters(),
                required: expected,
            });
        }
        let factor = path_length_factor(state.snp(), state.tgl());

        let x0 = layer.thickness(state.y(), state.z());
        self.propagator.correct_for_material(
            state,
            Material::new(x0, DetectorLayer::x_rho(x0)),
            direction,
        )?;
        Ok(factor)
    }
}
