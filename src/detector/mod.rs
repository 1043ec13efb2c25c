//! Detector model and event-scoped cluster storage
//!
//! - [`layer`] - Layer segmentation, module placement and material lookup
//! - [`geometry`] - Serializable geometry description and validation
//! - [`cluster`] - Cluster records
//! - [`index`] - Per-layer spatial index with windowed queries
//!
//! [`Detector`] owns all of it. It is built once per run; every event is
//! loaded with [`Detector::load_event`] and cleared with
//! [`Detector::reset_event`], which also releases every cluster claim.

pub mod cluster;
pub mod geometry;
pub mod index;
pub mod layer;

pub use cluster::{ClusterInput, ClusterLabels, ClusterRecord, ClusterRef};
pub use geometry::{GeometryDescription, LayerDescription, PassiveShell};
pub use index::LayerClusters;
pub use layer::{BandAxis, DetectorLayer, LayerTechnology, Module, ModuleId, ThicknessBand};

use std::f64::consts::TAU;

use crate::error::{Result, TrackingError};

/// Detector geometry plus the clusters of the current event
#[derive(Debug, Clone)]
pub struct Detector {
    layers: Vec<DetectorLayer>,
    clusters: Vec<LayerClusters>,
    passive: Vec<PassiveShell>,
}

impl Detector {
    /// Build the detector from a description
    ///
    /// Fails when the description is invalid; this is fatal for the run.
    pub fn new(description: &GeometryDescription) -> Result<Self> {
        description.validate()?;
        let layers = description.build_layers();
        let clusters = layers
            .iter()
            .map(|l| LayerClusters::new(l.radius()))
            .collect();
        let mut passive = description.passive.clone();
        passive.sort_by(|a, b| a.radius.total_cmp(&b.radius));
        Ok(Self {
            layers,
            clusters,
            passive,
        })
    }

    /// Number of sensitive layers
    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layer(&self, index: usize) -> &DetectorLayer {
        &self.layers[index]
    }

    pub fn layers(&self) -> &[DetectorLayer] {
        &self.layers
    }

    /// Passive shells sorted by radius
    pub fn passive(&self) -> &[PassiveShell] {
        &self.passive
    }

    /// Passive shells strictly between two radii, in the order a track
    /// moving from `from` to `to` meets them
    pub fn passive_between(&self, from: f64, to: f64) -> Vec<&PassiveShell> {
        let (lo, hi) = if from < to { (from, to) } else { (to, from) };
        let mut shells: Vec<&PassiveShell> = self
            .passive
            .iter()
            .filter(|s| s.radius > lo && s.radius < hi)
            .collect();
        if from > to {
            shells.reverse();
        }
        shells
    }

    #[inline]
    pub fn clusters(&self, layer: usize) -> &LayerClusters {
        &self.clusters[layer]
    }

    #[inline]
    pub fn clusters_mut(&mut self, layer: usize) -> &mut LayerClusters {
        &mut self.clusters[layer]
    }

    /// Total clusters loaded
    pub fn num_clusters(&self) -> usize {
        self.clusters.iter().map(|c| c.len()).sum()
    }

    /// Look up a cluster
    pub fn cluster(&self, r: ClusterRef) -> Option<&ClusterRecord> {
        self.clusters.get(r.layer).and_then(|c| c.get(r.index))
    }

    /// Module owning a cluster
    pub fn module_of(&self, r: ClusterRef) -> Option<&Module> {
        let cluster = self.cluster(r)?;
        self.layers[r.layer].module(cluster.module)
    }

    /// Whether a cluster has been claimed
    pub fn is_used(&self, r: ClusterRef) -> bool {
        self.clusters
            .get(r.layer)
            .is_some_and(|c| c.is_used(r.index))
    }

    /// Claim clusters for an accepted track
    pub fn mark_used(&mut self, refs: impl IntoIterator<Item = ClusterRef>) {
        for r in refs {
            if let Some(layer) = self.clusters.get_mut(r.layer) {
                layer.mark_used(r.index);
            }
        }
    }

    /// Release every claim, keeping the clusters
    pub fn reset_usage(&mut self) {
        self.clusters.iter_mut().for_each(|c| c.reset_usage());
    }

    /// Clear clusters and usage flags at the end of an event
    pub fn reset_event(&mut self) {
        self.clusters.iter_mut().for_each(|c| c.clear());
    }

    /// Load the clusters of a new event
    ///
    /// Replaces any previous content. Clusters referring to an unknown layer
    /// or module, or with a non-positive variance, are rejected as invalid
    /// input. Returns the number of clusters loaded.
    pub fn load_event(&mut self, inputs: Vec<ClusterInput>) -> Result<usize> {
        self.reset_event();
        let mut per_layer: Vec<Vec<ClusterRecord>> = vec![Vec::new(); self.layers.len()];

        for (position, input) in inputs.into_iter().enumerate() {
            let layer = self.layers.get(input.layer).ok_or_else(|| {
                TrackingError::input(format!(
                    "cluster {} refers to layer {} of {}",
                    position,
                    input.layer,
                    self.layers.len()
                ))
            })?;
            let module = layer.module(input.module).ok_or_else(|| {
                TrackingError::input(format!(
                    "cluster {} refers to module {:?} outside layer {}",
                    position, input.module, input.layer
                ))
            })?;
            if !(input.sigma_y2 > 0.0 && input.sigma_z2 > 0.0)
                || !(input.y.is_finite() && input.z.is_finite())
            {
                return Err(TrackingError::input(format!(
                    "cluster {} has invalid position or covariance",
                    position
                )));
            }
            let phi = (module.alpha + input.y.atan2(module.x)).rem_euclid(TAU);
            let layer_index = input.layer;
            per_layer[layer_index].push(ClusterRecord::from_input(input, position, phi));
        }

        let total = per_layer.iter().map(Vec::len).sum();
        for (index, records) in self.clusters.iter_mut().zip(per_layer) {
            index.load(records);
        }
        log::debug!("Loaded {} clusters on {} layers", total, self.layers.len());
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::SmallVec;

    fn input(layer: usize, module: ModuleId, y: f64, z: f64) -> ClusterInput {
        ClusterInput {
            layer,
            module,
            y,
            z,
            sigma_y2: 1e-6,
            sigma_z2: 1e-4,
            sigma_yz: 0.0,
            charge: 1.0,
            labels: SmallVec::new(),
            id: None,
        }
    }

    #[test]
    fn test_load_and_reset_event() {
        let mut detector = Detector::new(&GeometryDescription::six_layer_barrel()).unwrap();
        let loaded = detector
            .load_event(vec![
                input(0, ModuleId::new(0, 1), 0.1, -3.0),
                input(0, ModuleId::new(0, 1), 0.2, -4.0),
                input(3, ModuleId::new(2, 5), 0.0, 5.0),
            ])
            .unwrap();
        assert_eq!(loaded, 3);
        assert_eq!(detector.clusters(0).len(), 2);
        assert_eq!(detector.clusters(3).len(), 1);

        // Sorted by z: the cluster given second comes first
        let first = detector.cluster(ClusterRef::new(0, 0)).unwrap();
        assert_eq!(first.external_id, 1);

        detector.mark_used([ClusterRef::new(0, 1)]);
        assert!(detector.is_used(ClusterRef::new(0, 1)));

        detector.reset_event();
        assert_eq!(detector.num_clusters(), 0);
    }

    #[test]
    fn test_cluster_azimuth_from_module() {
        let mut detector = Detector::new(&GeometryDescription::six_layer_barrel()).unwrap();
        detector
            .load_event(vec![input(0, ModuleId::new(5, 0), 0.0, -10.0)])
            .unwrap();
        let module = detector.module_of(ClusterRef::new(0, 0)).unwrap();
        let cluster = detector.cluster(ClusterRef::new(0, 0)).unwrap();
        assert!((cluster.phi - module.alpha).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_inputs() {
        let mut detector = Detector::new(&GeometryDescription::six_layer_barrel()).unwrap();
        let err = detector
            .load_event(vec![input(9, ModuleId::new(0, 0), 0.0, 0.0)])
            .unwrap_err();
        assert!(matches!(err, TrackingError::InvalidInput { .. }));

        let err = detector
            .load_event(vec![input(0, ModuleId::new(99, 0), 0.0, 0.0)])
            .unwrap_err();
        assert!(matches!(err, TrackingError::InvalidInput { .. }));

        let mut bad = input(0, ModuleId::new(0, 0), 0.0, 0.0);
        bad.sigma_y2 = 0.0;
        assert!(detector.load_event(vec![bad]).is_err());
    }

    #[test]
    fn test_passive_between() {
        let detector = Detector::new(&GeometryDescription::six_layer_barrel()).unwrap();
        let inward: Vec<&str> = detector
            .passive_between(40.0, 2.0)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(inward, vec!["outer shield", "inner shield", "beam pipe"]);
        assert_eq!(detector.passive_between(4.0, 7.0).len(), 0);
    }
}
