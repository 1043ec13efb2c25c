//! Sensitive layer geometry
//!
//! A layer is a cylinder of flat modules. Ladders are arranged in azimuth,
//! each ladder carrying `n_detectors` modules along z. Every module defines a
//! local frame whose x axis passes through the module centre at azimuth
//! `alpha`; clusters and track states on that module are expressed in it.

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::common::constants::{SILICON_DENSITY, SILICON_X0};

/// Module address inside a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId {
    /// Ladder index in azimuth
    pub ladder: usize,
    /// Detector index along z
    pub detector: usize,
}

impl ModuleId {
    /// Create a new module id
    pub fn new(ladder: usize, detector: usize) -> Self {
        Self { ladder, detector }
    }
}

/// Silicon technology of a layer; selects the default material profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerTechnology {
    /// Hybrid pixels
    Pixel,
    /// Silicon drift detectors
    Drift,
    /// Double-sided strips
    Strip,
}

/// Coordinate a thickness band is keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandAxis {
    /// Module-local y
    Y,
    /// z relative to the centre of the detector containing the point
    Z,
}

/// Extra material over an interval of |coordinate|
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThicknessBand {
    /// Coordinate the band is keyed on
    pub axis: BandAxis,
    /// Lower edge of |coordinate| (inclusive)
    pub min: f64,
    /// Upper edge of |coordinate| (exclusive)
    pub max: f64,
    /// Radiation-length fraction added inside the band
    pub extra_x0: f64,
}

impl ThicknessBand {
    /// Create a new band
    pub fn new(axis: BandAxis, min: f64, max: f64, extra_x0: f64) -> Self {
        Self {
            axis,
            min,
            max,
            extra_x0,
        }
    }

    #[inline]
    fn contains(&self, coordinate: f64) -> bool {
        let a = coordinate.abs();
        a >= self.min && a < self.max
    }
}

impl LayerTechnology {
    /// Radiation-length fraction of a module away from any band
    pub fn default_baseline_x0(self) -> f64 {
        match self {
            LayerTechnology::Pixel => 0.0115,
            LayerTechnology::Drift => 0.0110,
            LayerTechnology::Strip => 0.0085,
        }
    }

    /// Default material bands: cooling, frames and readout of each technology
    pub fn default_bands(self) -> Vec<ThicknessBand> {
        match self {
            LayerTechnology::Pixel => vec![
                // cooling tube under the ladder
                ThicknessBand::new(BandAxis::Y, 0.21, 0.30, 0.0045),
                // chip boundary
                ThicknessBand::new(BandAxis::Z, 0.0, 0.15, 0.0036),
            ],
            LayerTechnology::Drift => vec![
                ThicknessBand::new(BandAxis::Y, 3.30, f64::INFINITY, 0.0050),
                // central cathode
                ThicknessBand::new(BandAxis::Z, 0.0, 0.25, 0.0060),
            ],
            LayerTechnology::Strip => vec![
                ThicknessBand::new(BandAxis::Y, 3.50, f64::INFINITY, 0.0040),
                ThicknessBand::new(BandAxis::Z, 1.80, f64::INFINITY, 0.0030),
            ],
        }
    }
}

/// Placement of one module
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Module {
    /// Module address
    pub id: ModuleId,
    /// Azimuth of the module frame
    pub alpha: f64,
    /// Distance of the module plane from the beam line (local x)
    pub x: f64,
    /// Lower z edge
    pub z_min: f64,
    /// Upper z edge
    pub z_max: f64,
}

impl Module {
    /// z of the module centre
    #[inline]
    pub fn z_center(&self) -> f64 {
        0.5 * (self.z_min + self.z_max)
    }
}

/// One sensitive layer
#[derive(Debug, Clone)]
pub struct DetectorLayer {
    index: usize,
    radius: f64,
    n_ladders: usize,
    n_detectors: usize,
    phi_offset: f64,
    z_min: f64,
    z_max: f64,
    half_width: f64,
    detector_gap: f64,
    technology: LayerTechnology,
    baseline_x0: f64,
    bands: Vec<ThicknessBand>,
    modules: Vec<Module>,
}

/// Parameters for [`DetectorLayer::new`]; validated by the geometry builder
#[derive(Debug, Clone)]
pub struct LayerParams {
    pub radius: f64,
    pub n_ladders: usize,
    pub n_detectors: usize,
    pub phi_offset: f64,
    pub z_min: f64,
    pub z_max: f64,
    pub half_width: Option<f64>,
    pub detector_gap: f64,
    pub ladder_stagger: f64,
    pub technology: LayerTechnology,
    pub baseline_x0: Option<f64>,
    pub bands: Option<Vec<ThicknessBand>>,
}

impl DetectorLayer {
    /// Build a layer and place its modules
    ///
    /// Odd ladders sit `ladder_stagger` further out than even ones so that
    /// neighbouring ladders overlap in azimuth.
    pub fn new(index: usize, params: LayerParams) -> Self {
        let step = TAU / params.n_ladders as f64;
        let det_len = (params.z_max - params.z_min) / params.n_detectors as f64;
        let half_width = params
            .half_width
            .unwrap_or_else(|| params.radius * (0.5 * step).tan());

        let modules = (0..params.n_ladders)
            .flat_map(|ladder| {
                let alpha = (params.phi_offset + ladder as f64 * step).rem_euclid(TAU);
                let x = if ladder % 2 == 1 {
                    params.radius + params.ladder_stagger
                } else {
                    params.radius
                };
                (0..params.n_detectors).map(move |detector| Module {
                    id: ModuleId::new(ladder, detector),
                    alpha,
                    x,
                    z_min: params.z_min + detector as f64 * det_len,
                    z_max: params.z_min + (detector + 1) as f64 * det_len,
                })
            })
            .collect();

        Self {
            index,
            radius: params.radius,
            n_ladders: params.n_ladders,
            n_detectors: params.n_detectors,
            phi_offset: params.phi_offset,
            z_min: params.z_min,
            z_max: params.z_max,
            half_width,
            detector_gap: params.detector_gap,
            technology: params.technology,
            baseline_x0: params
                .baseline_x0
                .unwrap_or_else(|| params.technology.default_baseline_x0()),
            bands: params
                .bands
                .unwrap_or_else(|| params.technology.default_bands()),
            modules,
        }
    }

    /// Position of the layer in the detector (0 = innermost)
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Nominal radius
    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    #[inline]
    pub fn n_ladders(&self) -> usize {
        self.n_ladders
    }

    #[inline]
    pub fn n_detectors(&self) -> usize {
        self.n_detectors
    }

    #[inline]
    pub fn technology(&self) -> LayerTechnology {
        self.technology
    }

    /// Longitudinal acceptance
    #[inline]
    pub fn z_range(&self) -> (f64, f64) {
        (self.z_min, self.z_max)
    }

    /// Sensitive half-width of a module in local y
    #[inline]
    pub fn half_width(&self) -> f64 {
        self.half_width
    }

    /// All modules, ladder-major
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Look up a module; `None` for an address outside the segmentation
    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        if id.ladder >= self.n_ladders || id.detector >= self.n_detectors {
            return None;
        }
        self.modules.get(id.ladder * self.n_detectors + id.detector)
    }

    /// Map a global azimuth and z to the module covering them
    ///
    /// Returns `None` when z lies outside the longitudinal acceptance.
    pub fn find_detector_index(&self, phi: f64, z: f64) -> Option<ModuleId> {
        if !phi.is_finite() || !(z >= self.z_min && z < self.z_max) {
            return None;
        }
        let step = TAU / self.n_ladders as f64;
        let dphi = (phi - self.phi_offset).rem_euclid(TAU);
        let ladder = ((dphi / step + 0.5).floor() as usize) % self.n_ladders;

        let det_len = (self.z_max - self.z_min) / self.n_detectors as f64;
        let detector = (((z - self.z_min) / det_len) as usize).min(self.n_detectors - 1);

        Some(ModuleId::new(ladder, detector))
    }

    /// Whether a point in the module frame falls on insensitive material
    pub fn is_dead_zone(&self, module: &Module, y: f64, z: f64) -> bool {
        y.abs() > self.half_width
            || z < module.z_min + self.detector_gap
            || z > module.z_max - self.detector_gap
    }

    /// Radiation-length fraction crossed at module-local `y` and global `z`
    ///
    /// Always finite; the baseline applies wherever no band matches.
    pub fn thickness(&self, y: f64, z: f64) -> f64 {
        let z_rel = z - self.nearest_detector_center(z);
        let extra: f64 = self
            .bands
            .iter()
            .filter(|band| match band.axis {
                BandAxis::Y => band.contains(y),
                BandAxis::Z => band.contains(z_rel),
            })
            .map(|band| band.extra_x0)
            .sum();

        let x0 = self.baseline_x0 + extra;
        if x0.is_finite() {
            x0
        } else {
            self.baseline_x0
        }
    }

    /// Traversed density times length [g/cm²] for a given x/X0 in silicon
    #[inline]
    pub fn x_rho(x_over_x0: f64) -> f64 {
        x_over_x0 * SILICON_X0 * SILICON_DENSITY
    }

    fn nearest_detector_center(&self, z: f64) -> f64 {
        let det_len = (self.z_max - self.z_min) / self.n_detectors as f64;
        let raw = ((z - self.z_min) / det_len).floor();
        let idx = if raw.is_finite() {
            raw.clamp(0.0, (self.n_detectors - 1) as f64)
        } else {
            0.0
        };
        self.z_min + (idx + 0.5) * det_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn pixel_layer() -> DetectorLayer {
        DetectorLayer::new(
            0,
            LayerParams {
                radius: 4.0,
                n_ladders: 20,
                n_detectors: 4,
                phi_offset: 0.0,
                z_min: -14.0,
                z_max: 14.0,
                half_width: None,
                detector_gap: 0.0,
                ladder_stagger: 0.0,
                technology: LayerTechnology::Pixel,
                baseline_x0: None,
                bands: None,
            },
        )
    }

    #[test]
    fn test_find_detector_index() {
        let layer = pixel_layer();
        let step = 2.0 * PI / 20.0;

        assert_eq!(layer.find_detector_index(0.0, -13.0), Some(ModuleId::new(0, 0)));
        assert_eq!(layer.find_detector_index(3.0 * step + 0.01, 1.0), Some(ModuleId::new(3, 2)));
        // Just below 2π maps back to ladder 0
        assert_eq!(layer.find_detector_index(2.0 * PI - 0.01, 13.9), Some(ModuleId::new(0, 3)));
        // Negative azimuth wraps
        assert_eq!(layer.find_detector_index(-step, 0.0), Some(ModuleId::new(19, 2)));
    }

    #[test]
    fn test_find_detector_index_outside_acceptance() {
        let layer = pixel_layer();
        assert_eq!(layer.find_detector_index(0.3, 14.0), None);
        assert_eq!(layer.find_detector_index(0.3, -20.0), None);
        assert_eq!(layer.find_detector_index(f64::NAN, 0.0), None);
    }

    #[test]
    fn test_module_placement() {
        let layer = pixel_layer();
        assert_eq!(layer.modules().len(), 80);
        let m = layer.module(ModuleId::new(5, 1)).unwrap();
        assert!((m.alpha - 5.0 * 2.0 * PI / 20.0).abs() < 1e-12);
        assert!((m.z_min + 7.0).abs() < 1e-12);
        assert!((m.z_max - 0.0).abs() < 1e-12);
        assert!(layer.module(ModuleId::new(20, 0)).is_none());
    }

    #[test]
    fn test_thickness_bands() {
        let layer = pixel_layer();
        let base = LayerTechnology::Pixel.default_baseline_x0();

        // Away from every band
        assert!((layer.thickness(0.05, 3.0) - base).abs() < 1e-12);
        // Cooling tube band on both sides
        assert!((layer.thickness(0.25, 3.0) - (base + 0.0045)).abs() < 1e-12);
        assert!((layer.thickness(-0.25, 3.0) - (base + 0.0045)).abs() < 1e-12);
        // Detector centre at z = 3.5
        assert!((layer.thickness(0.05, 3.5) - (base + 0.0036)).abs() < 1e-12);
        // Outside the layer still finite
        assert!(layer.thickness(100.0, 1e6).is_finite());
    }

    #[test]
    fn test_dead_zone() {
        let mut params = LayerParams {
            radius: 4.0,
            n_ladders: 20,
            n_detectors: 4,
            phi_offset: 0.0,
            z_min: -14.0,
            z_max: 14.0,
            half_width: Some(0.6),
            detector_gap: 0.1,
            ladder_stagger: 0.0,
            technology: LayerTechnology::Pixel,
            baseline_x0: None,
            bands: None,
        };
        let layer = DetectorLayer::new(0, params.clone());
        let m = *layer.module(ModuleId::new(0, 2)).unwrap();
        assert!(!layer.is_dead_zone(&m, 0.1, 3.0));
        assert!(layer.is_dead_zone(&m, 0.7, 3.0));
        assert!(layer.is_dead_zone(&m, 0.1, 0.05));

        params.detector_gap = 0.0;
        let layer = DetectorLayer::new(0, params);
        assert!(!layer.is_dead_zone(&m, 0.1, 0.05));
    }
}
