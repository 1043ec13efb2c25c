//! Geometry description supplied once per run
//!
//! The description is plain data (JSON-deserializable). [`GeometryDescription::validate`]
//! rejects descriptions the tracker cannot work with; this is the only place
//! a geometry problem surfaces, and it is fatal.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::layer::{DetectorLayer, LayerParams, LayerTechnology, ThicknessBand};
use crate::error::{Result, TrackingError};

/// Description of one sensitive layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerDescription {
    /// Nominal radius [cm]
    pub radius: f64,
    /// Ladders in azimuth
    pub n_ladders: usize,
    /// Modules per ladder along z
    pub n_detectors: usize,
    /// Azimuth of ladder 0 [rad]
    #[serde(default)]
    pub phi_offset: f64,
    /// Lower edge of the acceptance [cm]
    pub z_min: f64,
    /// Upper edge of the acceptance [cm]
    pub z_max: f64,
    /// Sensitive half-width in local y; full azimuthal coverage when absent
    #[serde(default)]
    pub half_width: Option<f64>,
    /// Insensitive band at each module edge along z [cm]
    #[serde(default)]
    pub detector_gap: f64,
    /// Radial offset of odd ladders [cm]
    #[serde(default)]
    pub ladder_stagger: f64,
    pub technology: LayerTechnology,
    /// Overrides the technology's baseline x/X0
    #[serde(default)]
    pub baseline_x0: Option<f64>,
    /// Overrides the technology's material bands
    #[serde(default)]
    pub bands: Option<Vec<ThicknessBand>>,
}

/// Passive material shell (beam pipe, thermal shield)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassiveShell {
    pub name: String,
    /// Radius [cm]
    pub radius: f64,
    /// Radiation-length fraction at normal incidence
    pub x_over_x0: f64,
    /// Density times thickness [g/cm²]
    pub x_rho: f64,
}

/// Complete geometry description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryDescription {
    /// Sensitive layers, innermost first
    pub layers: Vec<LayerDescription>,
    /// Passive shells
    #[serde(default)]
    pub passive: Vec<PassiveShell>,
}

impl GeometryDescription {
    /// Parse a description from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a description from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Six-layer barrel: two pixel, two drift and two strip layers, with a
    /// beam pipe and two thermal shields
    pub fn six_layer_barrel() -> Self {
        #[rustfmt::skip]
        let table = [
            // radius, ladders, detectors, half length, technology
            (3.9,  20,  4, 14.1, LayerTechnology::Pixel),
            (7.6,  40,  4, 14.1, LayerTechnology::Pixel),
            (15.0, 14,  6, 22.2, LayerTechnology::Drift),
            (23.9, 22,  8, 29.7, LayerTechnology::Drift),
            (38.0, 34, 22, 43.1, LayerTechnology::Strip),
            (43.0, 38, 25, 48.9, LayerTechnology::Strip),
        ];
        let layers = table
            .iter()
            .map(|&(radius, n_ladders, n_detectors, half_length, technology)| LayerDescription {
                radius,
                n_ladders,
                n_detectors,
                phi_offset: 0.0,
                z_min: -half_length,
                z_max: half_length,
                half_width: None,
                detector_gap: 0.0,
                ladder_stagger: 0.0,
                technology,
                baseline_x0: None,
                bands: None,
            })
            .collect();

        let passive = vec![
            PassiveShell {
                name: "beam pipe".to_string(),
                radius: 2.94,
                x_over_x0: 0.0023,
                x_rho: 0.148,
            },
            PassiveShell {
                name: "inner shield".to_string(),
                radius: 11.5,
                x_over_x0: 0.0053,
                x_rho: 0.125,
            },
            PassiveShell {
                name: "outer shield".to_string(),
                radius: 31.0,
                x_over_x0: 0.0053,
                x_rho: 0.125,
            },
        ];

        Self { layers, passive }
    }

    /// Check the description is usable
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(TrackingError::geometry("no sensitive layers"));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if !(layer.radius.is_finite() && layer.radius > 0.0) {
                return Err(TrackingError::geometry(format!(
                    "layer {} has invalid radius {}",
                    i, layer.radius
                )));
            }
            if layer.n_ladders == 0 || layer.n_detectors == 0 {
                return Err(TrackingError::geometry(format!(
                    "layer {} needs at least one ladder and one detector",
                    i
                )));
            }
            if !(layer.z_max > layer.z_min) {
                return Err(TrackingError::geometry(format!(
                    "layer {} has empty z acceptance [{}, {}]",
                    i, layer.z_min, layer.z_max
                )));
            }
            if layer.half_width.is_some_and(|w| !(w > 0.0)) {
                return Err(TrackingError::geometry(format!(
                    "layer {} has non-positive half width",
                    i
                )));
            }
            let det_len = (layer.z_max - layer.z_min) / layer.n_detectors as f64;
            if layer.detector_gap < 0.0 || 2.0 * layer.detector_gap >= det_len {
                return Err(TrackingError::geometry(format!(
                    "layer {} detector gap {} leaves no sensitive area",
                    i, layer.detector_gap
                )));
            }
            if i > 0 && layer.radius <= self.layers[i - 1].radius {
                return Err(TrackingError::geometry(format!(
                    "layer radii must increase (layer {} at {} after {})",
                    i,
                    layer.radius,
                    self.layers[i - 1].radius
                )));
            }
        }
        for shell in &self.passive {
            if !(shell.radius > 0.0 && shell.x_over_x0 >= 0.0 && shell.x_rho >= 0.0) {
                return Err(TrackingError::geometry(format!(
                    "passive shell '{}' has invalid parameters",
                    shell.name
                )));
            }
        }
        Ok(())
    }

    /// Build the layer models (after validation)
    pub(crate) fn build_layers(&self) -> Vec<DetectorLayer> {
        self.layers
            .iter()
            .enumerate()
            .map(|(i, d)| {
                DetectorLayer::new(
                    i,
                    LayerParams {
                        radius: d.radius,
                        n_ladders: d.n_ladders,
                        n_detectors: d.n_detectors,
                        phi_offset: d.phi_offset,
                        z_min: d.z_min,
                        z_max: d.z_max,
                        half_width: d.half_width,
                        detector_gap: d.detector_gap,
                        ladder_stagger: d.ladder_stagger,
                        technology: d.technology,
                        baseline_x0: d.baseline_x0,
                        bands: d.bands.clone(),
                    },
                )
            })
            .collect()
    }
}
