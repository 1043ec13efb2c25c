//! Cluster records
//!
//! Clusters arrive already decoded, one record per reconstructed hit, in the
//! local frame of the module that produced them.

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::layer::ModuleId;

/// Truth labels carried by a cluster (up to three contributing particles)
pub type ClusterLabels = SmallVec<[i64; 3]>;

/// A decoded cluster as supplied by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInput {
    /// Layer index (0 = innermost)
    pub layer: usize,
    /// Owning module
    pub module: ModuleId,
    /// Local y [cm]
    pub y: f64,
    /// z [cm]
    pub z: f64,
    /// Variance of y [cm²]
    pub sigma_y2: f64,
    /// Variance of z [cm²]
    pub sigma_z2: f64,
    /// y-z covariance [cm²]
    #[serde(default)]
    pub sigma_yz: f64,
    /// Deposited charge (arbitrary units)
    #[serde(default)]
    pub charge: f64,
    /// Truth labels, empty for data
    #[serde(default)]
    pub labels: ClusterLabels,
    /// Caller's identifier, echoed in the output tracks
    #[serde(default)]
    pub id: Option<u64>,
}

/// Reference to a cluster: layer and position in that layer's sorted array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterRef {
    pub layer: usize,
    pub index: usize,
}

impl ClusterRef {
    pub fn new(layer: usize, index: usize) -> Self {
        Self { layer, index }
    }
}

/// Event-scoped cluster record held by the spatial index
#[derive(Debug, Clone)]
pub struct ClusterRecord {
    /// Owning module
    pub module: ModuleId,
    /// Local y
    pub y: f64,
    /// z
    pub z: f64,
    pub sigma_y2: f64,
    pub sigma_z2: f64,
    pub sigma_yz: f64,
    /// Deposited charge
    pub charge: f64,
    /// Truth labels
    pub labels: ClusterLabels,
    /// Caller's identifier (input position when none was given)
    pub external_id: u64,
    /// Global azimuth of the cluster, in [0, 2π)
    pub phi: f64,
    /// Claimed by an accepted track
    pub used: bool,
}

impl ClusterRecord {
    /// Build a record from caller input
    ///
    /// `phi` is the global azimuth computed from the module placement.
    pub fn from_input(input: ClusterInput, position: usize, phi: f64) -> Self {
        Self {
            module: input.module,
            y: input.y,
            z: input.z,
            sigma_y2: input.sigma_y2,
            sigma_z2: input.sigma_z2,
            sigma_yz: input.sigma_yz,
            charge: input.charge,
            labels: input.labels,
            external_id: input.id.unwrap_or(position as u64),
            phi,
            used: false,
        }
    }

    /// Measured (y, z)
    #[inline]
    pub fn measurement(&self) -> Vector2<f64> {
        Vector2::new(self.y, self.z)
    }

    /// Measurement covariance
    #[inline]
    pub fn covariance(&self) -> Matrix2<f64> {
        Matrix2::new(self.sigma_y2, self.sigma_yz, self.sigma_yz, self.sigma_z2)
    }

    /// Leading truth label, if any
    #[inline]
    pub fn primary_label(&self) -> Option<i64> {
        self.labels.first().copied()
    }

    /// Whether any contributing particle carries `label`
    #[inline]
    pub fn has_label(&self, label: i64) -> bool {
        self.labels.contains(&label)
    }
}
