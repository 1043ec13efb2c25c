//! Tracker configuration
//!
//! All tunable thresholds live here with documented defaults. The whole
//! configuration is serde-(de)serializable; fields missing from a JSON file
//! take their default value.
//!
//! # Example
//!
//! ```
//! use siltrack::tracker::{PassConfig, TrackerConfig};
//!
//! let config = TrackerConfig::builder()
//!     .b_field(5.0)
//!     .max_skips(1)
//!     .passes(vec![PassConfig::unconstrained(5)])
//!     .build();
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::common::constants::PION_MASS;
use crate::error::{Result, TrackingError};
use crate::track::{Propagator, Vertex};

use super::{
    DEFAULT_CHI2_MAX, DEFAULT_MAX_CANDIDATES, DEFAULT_MAX_CONSECUTIVE_SKIPS,
    DEFAULT_MAX_HYPOTHESES, DEFAULT_MAX_SKIPS, DEFAULT_N_SIGMA,
};

/// Search settings of one layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerSearchConfig {
    /// chi2 gate for accepting a cluster
    pub chi2_max: f64,
    /// Window half-width in local y, in units of the predicted sigma
    pub n_sigma_y: f64,
    /// Window half-width in z, in units of the predicted sigma
    pub n_sigma_z: f64,
    /// Intrinsic cluster resolution added to the predicted y variance [cm]
    pub resolution_y: f64,
    /// Intrinsic cluster resolution added to the predicted z variance [cm]
    pub resolution_z: f64,
    /// Cap on the window half-width in y [cm]
    pub max_window_y: f64,
    /// Cap on the window half-width in z [cm]
    pub max_window_z: f64,
}

impl Default for LayerSearchConfig {
    fn default() -> Self {
        Self {
            chi2_max: DEFAULT_CHI2_MAX,
            n_sigma_y: DEFAULT_N_SIGMA,
            n_sigma_z: DEFAULT_N_SIGMA,
            resolution_y: 0.005,
            resolution_z: 0.015,
            max_window_y: 2.0,
            max_window_z: 2.0,
        }
    }
}

impl LayerSearchConfig {
    fn validate(&self, layer: usize) -> Result<()> {
        let positive = [
            ("chi2_max", self.chi2_max),
            ("n_sigma_y", self.n_sigma_y),
            ("n_sigma_z", self.n_sigma_z),
            ("max_window_y", self.max_window_y),
            ("max_window_z", self.max_window_z),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(TrackingError::configuration(format!(
                    "layer {} {} must be positive, got {}",
                    layer, name, value
                )));
            }
        }
        if self.resolution_y < 0.0 || self.resolution_z < 0.0 {
            return Err(TrackingError::configuration(format!(
                "layer {} resolutions must be non-negative",
                layer
            )));
        }
        Ok(())
    }
}

/// One search pass over the seeds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassConfig {
    /// Apply the primary vertex as a pseudo-measurement at the end of the search
    pub constrained: bool,
    /// Minimum clusters for a track to be accepted in this pass
    pub min_clusters: usize,
    /// Weight of the vertex pseudo-measurement (covariance is divided by it)
    pub vertex_weight: f64,
    /// chi2 gate of the vertex pseudo-measurement
    pub vertex_chi2_max: f64,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self::constrained(4)
    }
}

impl PassConfig {
    /// Vertex-constrained pass
    pub fn constrained(min_clusters: usize) -> Self {
        Self {
            constrained: true,
            min_clusters,
            vertex_weight: 0.5,
            vertex_chi2_max: 50.0,
        }
    }

    /// Pass without vertex constraint
    pub fn unconstrained(min_clusters: usize) -> Self {
        Self {
            constrained: false,
            ..Self::constrained(min_clusters)
        }
    }
}

/// Final refit settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefitConfig {
    /// Run the outward and inward refits
    pub enabled: bool,
    /// Scale applied to the covariance diagonal before each refit
    pub covariance_scale: f64,
    /// chi2 gate while replaying clusters
    pub chi2_max: f64,
}

impl Default for RefitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            covariance_scale: 100.0,
            chi2_max: 100.0,
        }
    }
}

/// When standalone triplet seeding runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StandaloneMode {
    /// Only for events without external seeds
    #[default]
    WhenNoSeeds,
    /// Always, after the external seeds
    Always,
    /// Never
    Never,
}

/// Standalone triplet seeding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedingConfig {
    pub mode: StandaloneMode,
    /// Layer of the first (outermost) cluster
    pub outer_layer: usize,
    /// Layer of the middle cluster
    pub middle_layer: usize,
    /// Layer of the innermost cluster
    pub inner_layer: usize,
    /// Azimuthal window half-width around the line to the beam [rad]
    pub window_phi: f64,
    /// Longitudinal window half-width [cm]
    pub window_z: f64,
    /// Largest z spread of the primary vertex (sets the z window slope) [cm]
    pub vertex_z_spread: f64,
    /// Minimum transverse momentum of a seed [GeV]
    pub min_pt: f64,
    /// Largest deviation of the middle cluster from the outer-inner z line [cm]
    pub max_z_residual: f64,
    /// Seed covariance diagonal `[y, z, snp, tgl, c]`
    pub covariance: [f64; 5],
}

impl Default for SeedingConfig {
    fn default() -> Self {
        Self {
            mode: StandaloneMode::WhenNoSeeds,
            outer_layer: 5,
            middle_layer: 3,
            inner_layer: 1,
            window_phi: 0.08,
            window_z: 0.5,
            vertex_z_spread: 10.0,
            min_pt: 0.1,
            max_z_residual: 0.2,
            covariance: [1e-2, 1e-2, 1e-3, 1e-3, 1e-5],
        }
    }
}

/// Complete tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Mass hypothesis for material corrections [GeV]
    pub mass: f64,
    /// Solenoid field [kG]
    pub b_field: f64,
    /// Apply the mean energy-loss correction
    pub energy_loss: bool,
    /// Per-layer search settings; a single entry applies to every layer
    pub layers: Vec<LayerSearchConfig>,
    /// Total layers a track may cross without a cluster
    pub max_skips: usize,
    /// Consecutive layers a track may cross without a cluster
    pub max_consecutive_skips: usize,
    /// Branches kept per layer
    pub max_candidates_per_layer: usize,
    /// Node budget of one seed's search
    pub max_hypotheses_per_seed: usize,
    /// chi2 added per skipped layer when ranking hypotheses
    pub skip_penalty: f64,
    /// chi2 added per dead-zone crossing when ranking hypotheses
    pub dead_zone_penalty: f64,
    /// Passes, run in order
    pub passes: Vec<PassConfig>,
    pub refit: RefitConfig,
    /// Fraction of the lowest charges dropped from the truncated mean
    pub dedx_low_fraction: f64,
    /// Fraction of the highest charges dropped from the truncated mean
    pub dedx_high_fraction: f64,
    /// Fraction of clusters allowed to disagree with the track label
    pub fake_fraction: f64,
    /// Transverse beam-spot sigma used when no vertex is supplied [cm]
    pub beam_spot_sigma_xy: f64,
    /// Longitudinal beam-spot sigma used when no vertex is supplied [cm]
    pub beam_spot_sigma_z: f64,
    pub seeding: SeedingConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            mass: PION_MASS,
            b_field: 5.0,
            energy_loss: true,
            layers: vec![LayerSearchConfig::default()],
            max_skips: DEFAULT_MAX_SKIPS,
            max_consecutive_skips: DEFAULT_MAX_CONSECUTIVE_SKIPS,
            max_candidates_per_layer: DEFAULT_MAX_CANDIDATES,
            max_hypotheses_per_seed: DEFAULT_MAX_HYPOTHESES,
            skip_penalty: 10.0,
            dead_zone_penalty: 2.0,
            passes: vec![PassConfig::constrained(4), PassConfig::unconstrained(4)],
            refit: RefitConfig::default(),
            dedx_low_fraction: 0.0,
            dedx_high_fraction: 0.4,
            fake_fraction: 0.2,
            beam_spot_sigma_xy: 0.01,
            beam_spot_sigma_z: 5.0,
            seeding: SeedingConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Create with builder pattern
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::default()
    }

    /// Parse from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Search settings of a layer
    #[inline]
    pub fn layer(&self, index: usize) -> &LayerSearchConfig {
        &self.layers[index.min(self.layers.len() - 1)]
    }

    /// Propagator for the configured mass, field and energy-loss switch
    pub fn propagator(&self) -> Propagator {
        Propagator::new(self.mass, self.b_field, self.energy_loss)
    }

    /// Beam-spot vertex used when the event supplies none
    pub fn beam_spot(&self) -> Vertex {
        Vertex::beam_spot(self.beam_spot_sigma_xy, self.beam_spot_sigma_z)
    }

    /// Check the configuration on its own
    pub fn validate(&self) -> Result<()> {
        if !(self.mass > 0.0) {
            return Err(TrackingError::configuration("mass must be positive"));
        }
        if !self.b_field.is_finite() {
            return Err(TrackingError::configuration("magnetic field must be finite"));
        }
        if self.layers.is_empty() {
            return Err(TrackingError::configuration(
                "at least one layer search entry is required",
            ));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            layer.validate(i)?;
        }
        if self.passes.is_empty() {
            return Err(TrackingError::configuration("at least one pass is required"));
        }
        for (i, pass) in self.passes.iter().enumerate() {
            if pass.min_clusters == 0 {
                return Err(TrackingError::configuration(format!(
                    "pass {} needs min_clusters >= 1",
                    i
                )));
            }
            if pass.constrained && !(pass.vertex_weight > 0.0 && pass.vertex_chi2_max > 0.0) {
                return Err(TrackingError::configuration(format!(
                    "pass {} has non-positive vertex weight or gate",
                    i
                )));
            }
        }
        if self.max_candidates_per_layer == 0 || self.max_hypotheses_per_seed == 0 {
            return Err(TrackingError::configuration(
                "candidate and hypothesis budgets must be at least 1",
            ));
        }
        if self.skip_penalty < 0.0 || self.dead_zone_penalty < 0.0 {
            return Err(TrackingError::configuration("penalties must be non-negative"));
        }
        if !(self.refit.covariance_scale > 0.0 && self.refit.chi2_max > 0.0) {
            return Err(TrackingError::configuration(
                "refit scale and gate must be positive",
            ));
        }
        let dedx_ok = (0.0..1.0).contains(&self.dedx_low_fraction)
            && (0.0..1.0).contains(&self.dedx_high_fraction)
            && self.dedx_low_fraction + self.dedx_high_fraction < 1.0;
        if !dedx_ok {
            return Err(TrackingError::configuration(
                "dE/dx truncation fractions must leave some clusters",
            ));
        }
        if !(0.0..=1.0).contains(&self.fake_fraction) {
            return Err(TrackingError::configuration(
                "fake_fraction must be within [0, 1]",
            ));
        }
        if !(self.beam_spot_sigma_xy > 0.0 && self.beam_spot_sigma_z > 0.0) {
            return Err(TrackingError::configuration(
                "beam-spot sigmas must be positive",
            ));
        }
        if self.seeding.covariance.iter().any(|v| !(*v > 0.0)) {
            return Err(TrackingError::configuration(
                "seed covariance diagonal must be positive",
            ));
        }
        Ok(())
    }

    /// Check the configuration against a detector with `num_layers` layers
    pub fn validate_for(&self, num_layers: usize) -> Result<()> {
        self.validate()?;
        if self.layers.len() != 1 && self.layers.len() != num_layers {
            return Err(TrackingError::configuration(format!(
                "{} layer search entries for {} layers",
                self.layers.len(),
                num_layers
            )));
        }
        if self.seeding.mode != StandaloneMode::Never {
            let s = &self.seeding;
            let ordered = s.inner_layer < s.middle_layer && s.middle_layer < s.outer_layer;
            if !ordered || s.outer_layer >= num_layers {
                return Err(TrackingError::configuration(format!(
                    "seeding layers ({}, {}, {}) must increase and exist",
                    s.inner_layer, s.middle_layer, s.outer_layer
                )));
            }
        }
        Ok(())
    }
}

/// Builder for [`TrackerConfig`]
#[derive(Debug, Default)]
pub struct TrackerConfigBuilder {
    mass: Option<f64>,
    b_field: Option<f64>,
    energy_loss: Option<bool>,
    layers: Option<Vec<LayerSearchConfig>>,
    max_skips: Option<usize>,
    max_consecutive_skips: Option<usize>,
    max_candidates_per_layer: Option<usize>,
    max_hypotheses_per_seed: Option<usize>,
    skip_penalty: Option<f64>,
    dead_zone_penalty: Option<f64>,
    passes: Option<Vec<PassConfig>>,
    refit: Option<RefitConfig>,
    fake_fraction: Option<f64>,
    seeding: Option<SeedingConfig>,
}

impl TrackerConfigBuilder {
    pub fn mass(mut self, mass: f64) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn b_field(mut self, b_field: f64) -> Self {
        self.b_field = Some(b_field);
        self
    }

    pub fn energy_loss(mut self, enabled: bool) -> Self {
        self.energy_loss = Some(enabled);
        self
    }

    /// Same search settings on every layer
    pub fn layer_search(mut self, layer: LayerSearchConfig) -> Self {
        self.layers = Some(vec![layer]);
        self
    }

    /// Per-layer search settings, innermost first
    pub fn layers(mut self, layers: Vec<LayerSearchConfig>) -> Self {
        self.layers = Some(layers);
        self
    }

    pub fn max_skips(mut self, max: usize) -> Self {
        self.max_skips = Some(max);
        self
    }

    pub fn max_consecutive_skips(mut self, max: usize) -> Self {
        self.max_consecutive_skips = Some(max);
        self
    }

    pub fn max_candidates_per_layer(mut self, max: usize) -> Self {
        self.max_candidates_per_layer = Some(max);
        self
    }

    pub fn max_hypotheses_per_seed(mut self, max: usize) -> Self {
        self.max_hypotheses_per_seed = Some(max);
        self
    }

    pub fn skip_penalty(mut self, penalty: f64) -> Self {
        self.skip_penalty = Some(penalty);
        self
    }

    pub fn dead_zone_penalty(mut self, penalty: f64) -> Self {
        self.dead_zone_penalty = Some(penalty);
        self
    }

    pub fn passes(mut self, passes: Vec<PassConfig>) -> Self {
        self.passes = Some(passes);
        self
    }

    pub fn refit(mut self, refit: RefitConfig) -> Self {
        self.refit = Some(refit);
        self
    }

    pub fn fake_fraction(mut self, fraction: f64) -> Self {
        self.fake_fraction = Some(fraction);
        self
    }

    pub fn seeding(mut self, seeding: SeedingConfig) -> Self {
        self.seeding = Some(seeding);
        self
    }

    /// Build the configuration; unset fields take their defaults
    pub fn build(self) -> TrackerConfig {
        let defaults = TrackerConfig::default();
        TrackerConfig {
            mass: self.mass.unwrap_or(defaults.mass),
            b_field: self.b_field.unwrap_or(defaults.b_field),
            energy_loss: self.energy_loss.unwrap_or(defaults.energy_loss),
            layers: self.layers.unwrap_or(defaults.layers),
            max_skips: self.max_skips.unwrap_or(defaults.max_skips),
            max_consecutive_skips: self
                .max_consecutive_skips
                .unwrap_or(defaults.max_consecutive_skips),
            max_candidates_per_layer: self
                .max_candidates_per_layer
                .unwrap_or(defaults.max_candidates_per_layer),
            max_hypotheses_per_seed: self
                .max_hypotheses_per_seed
                .unwrap_or(defaults.max_hypotheses_per_seed),
            skip_penalty: self.skip_penalty.unwrap_or(defaults.skip_penalty),
            dead_zone_penalty: self.dead_zone_penalty.unwrap_or(defaults.dead_zone_penalty),
            passes: self.passes.unwrap_or(defaults.passes),
            refit: self.refit.unwrap_or(defaults.refit),
            fake_fraction: self.fake_fraction.unwrap_or(defaults.fake_fraction),
            seeding: self.seeding.unwrap_or(defaults.seeding),
            ..defaults
        }
    }
}
