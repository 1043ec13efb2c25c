//! Per-layer cluster spatial index
//!
//! Clusters are sorted by z once per event. A window query binary-searches the
//! lower z edge and then scans forward, testing the azimuthal arc coordinate
//! `r·φ` against the window. The window may straddle φ = 0; the test then
//! accepts points shifted by one circumference.
//!
//! A selection is consumed by calling [`LayerClusters::next_cluster`] until it
//! returns `None`. The cursor never moves backwards; start a new selection to
//! scan again.

use std::f64::consts::TAU;

use super::cluster::ClusterRecord;

#[derive(Debug, Clone, Copy)]
struct Selection {
    z_max: f64,
    y_min: f64,
    y_max: f64,
    full_turn: bool,
    cursor: usize,
}

impl Selection {
    const EMPTY: Selection = Selection {
        z_max: f64::NEG_INFINITY,
        y_min: 0.0,
        y_max: 0.0,
        full_turn: false,
        cursor: usize::MAX,
    };
}

/// Clusters of one layer for the current event
#[derive(Debug, Clone)]
pub struct LayerClusters {
    radius: f64,
    clusters: Vec<ClusterRecord>,
    arc: Vec<f64>,
    selection: Selection,
}

impl LayerClusters {
    /// Empty index for a layer of radius `radius`
    pub fn new(radius: f64) -> Self {
        Self {
            radius,
            clusters: Vec::new(),
            arc: Vec::new(),
            selection: Selection::EMPTY,
        }
    }

    /// Circumference of the layer (period of the arc coordinate)
    #[inline]
    pub fn circumference(&self) -> f64 {
        TAU * self.radius
    }

    /// Replace the content with a new event's clusters
    ///
    /// Records are sorted by z (stable); their positions in the sorted order
    /// become the cluster indices for the rest of the event.
    pub fn load(&mut self, mut clusters: Vec<ClusterRecord>) {
        clusters.sort_by(|a, b| a.z.total_cmp(&b.z));
        self.arc = clusters
            .iter()
            .map(|c| self.radius * c.phi.rem_euclid(TAU))
            .collect();
        self.clusters = clusters;
        self.selection = Selection::EMPTY;
    }

    /// Remove all clusters
    pub fn clear(&mut self) {
        self.clusters.clear();
        self.arc.clear();
        self.selection = Selection::EMPTY;
    }

    /// Number of clusters
    #[inline]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Cluster at a sorted position
    #[inline]
    pub fn get(&self, index: usize) -> Option<&ClusterRecord> {
        self.clusters.get(index)
    }

    /// All clusters in z order
    pub fn clusters(&self) -> &[ClusterRecord] {
        &self.clusters
    }

    /// Arc coordinate `r·φ` of a cluster, in [0, circumference)
    #[inline]
    pub fn arc_coordinate(&self, index: usize) -> Option<f64> {
        self.arc.get(index).copied()
    }

    #[inline]
    pub fn is_used(&self, index: usize) -> bool {
        self.clusters.get(index).is_some_and(|c| c.used)
    }

    /// Claim a cluster for an accepted track
    pub fn mark_used(&mut self, index: usize) {
        if let Some(c) = self.clusters.get_mut(index) {
            c.used = true;
        }
    }

    /// Release every claim
    pub fn reset_usage(&mut self) {
        self.clusters.iter_mut().for_each(|c| c.used = false);
    }

    /// Start a window query
    ///
    /// `y_min`/`y_max` are arc coordinates; they may lie outside
    /// [0, circumference) when the window crosses φ = 0.
    pub fn select_clusters(&mut self, z_min: f64, z_max: f64, y_min: f64, y_max: f64) {
        let circumference = self.circumference();
        let full_turn = y_max - y_min >= circumference;
        let shift = (y_min / circumference).floor() * circumference;

        self.selection = Selection {
            z_max,
            y_min: y_min - shift,
            y_max: y_max - shift,
            full_turn,
            cursor: self.clusters.partition_point(|c| c.z < z_min),
        };
    }

    /// Next cluster of the current selection, as a sorted position
    pub fn next_cluster(&mut self) -> Option<usize> {
        let circumference = self.circumference();
        let sel = &mut self.selection;
        while sel.cursor < self.clusters.len() {
            let index = sel.cursor;
            sel.cursor += 1;
            if self.clusters[index].z > sel.z_max {
                sel.cursor = self.clusters.len();
                return None;
            }
            let y = self.arc[index];
            let inside = sel.full_turn
                || (y >= sel.y_min && y <= sel.y_max)
                || (y + circumference >= sel.y_min && y + circumference <= sel.y_max);
            if inside {
                return Some(index);
            }
        }
        None
    }
}
