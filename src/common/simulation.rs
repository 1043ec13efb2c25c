//! Toy event generation
//!
//! Tracks are followed outward from the beam line with the same exact
//! transport the reconstruction uses, so clusters sit on the true helix.
//! Smearing and random events use `StdRng` seeded by the caller for
//! reproducibility.

use nalgebra::Vector5;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use smallvec::smallvec;
use std::f64::consts::TAU;

use crate::common::constants::B2C;
use crate::detector::{ClusterInput, Detector, DetectorLayer, ModuleId};
use crate::error::{Result, TrackingError};
use crate::track::{TrackCovariance, TrackParams, TrackState};
use crate::tracker::quality::path_length_factor;
use crate::tracker::Seed;

/// Kinematics of a simulated particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSpec {
    /// Transverse momentum [GeV]
    pub pt: f64,
    /// Azimuth of the momentum at the vertex [rad]
    pub phi: f64,
    /// Tangent of the dip angle
    pub tgl: f64,
    /// Charge sign (+1 or -1)
    pub charge: f64,
    /// z of the production point [cm]
    pub z0: f64,
    pub label: Option<i64>,
}

impl TrackSpec {
    /// Positive particle from the origin
    pub fn new(pt: f64, phi: f64, tgl: f64) -> Self {
        Self {
            pt,
            phi,
            tgl,
            charge: 1.0,
            z0: 0.0,
            label: None,
        }
    }

    pub fn with_charge(mut self, charge: f64) -> Self {
        self.charge = charge.signum();
        self
    }

    pub fn with_z0(mut self, z0: f64) -> Self {
        self.z0 = z0;
        self
    }

    pub fn with_label(mut self, label: i64) -> Self {
        self.label = Some(label);
        self
    }

    /// Signed curvature in a field of `b_field` kG
    ///
    /// A positive particle in a positive field turns clockwise seen from +z.
    pub fn curvature(&self, b_field: f64) -> f64 {
        -self.charge * B2C * b_field / self.pt
    }
}

/// Crossing of a simulated track with a layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerHit {
    pub layer: usize,
    pub module: ModuleId,
    pub y: f64,
    pub z: f64,
    /// Path length through the layer relative to normal incidence
    pub path_factor: f64,
}

/// Generator of clusters and seeds on a fixed detector
#[derive(Debug, Clone)]
pub struct EventGenerator {
    layers: Vec<DetectorLayer>,
    b_field: f64,
    sigma_y: f64,
    sigma_z: f64,
    seed_covariance: [f64; 5],
}

impl EventGenerator {
    /// Generator for a detector in a 5 kG field with 12 µm × 100 µm resolution
    pub fn new(detector: &Detector) -> Self {
        Self {
            layers: detector.layers().to_vec(),
            b_field: 5.0,
            sigma_y: 0.0012,
            sigma_z: 0.01,
            seed_covariance: [1e-2, 1e-2, 1e-4, 1e-4, 1e-7],
        }
    }

    pub fn with_field(mut self, b_field: f64) -> Self {
        self.b_field = b_field;
        self
    }

    /// Cluster position resolution [cm]
    pub fn with_resolution(mut self, sigma_y: f64, sigma_z: f64) -> Self {
        self.sigma_y = sigma_y;
        self.sigma_z = sigma_z;
        self
    }

    /// Seed covariance diagonal `[y, z, snp, tgl, c]`
    pub fn with_seed_covariance(mut self, diagonal: [f64; 5]) -> Self {
        self.seed_covariance = diagonal;
        self
    }

    #[inline]
    pub fn b_field(&self) -> f64 {
        self.b_field
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Exact state at the production point, frame along the momentum
    pub fn vertex_state(&self, spec: &TrackSpec) -> TrackState {
        let params = TrackParams::new(0.0, spec.z0, 0.0, spec.tgl, spec.curvature(self.b_field));
        TrackState::new(
            0.0,
            spec.phi,
            params,
            TrackCovariance::zeros(),
            self.layers.len(),
        )
        .with_label(spec.label)
    }

    /// Crossings of the track with every layer it reaches, innermost first
    ///
    /// Crossings in insensitive areas are left out. Following stops at the
    /// first layer the track cannot reach. The frame is turned to the
    /// crossing point after every layer so the track stays representable
    /// until it turns back.
    pub fn hits(&self, spec: &TrackSpec) -> Vec<LayerHit> {
        let mut state = self.vertex_state(spec);
        let mut hits = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            if state.transport_to_radius(layer.radius()).is_err()
                || state.rotate(state.phi()).is_err()
            {
                break;
            }
            let Some(id) = layer.find_detector_index(state.phi(), state.z()) else {
                continue;
            };
            let Some(module) = layer.module(id) else {
                continue;
            };
            let mut on_plane = state.clone();
            if on_plane.rotate(module.alpha).is_err() || on_plane.transport_to(module.x).is_err()
            {
                continue;
            }
            if layer.is_dead_zone(module, on_plane.y(), on_plane.z()) {
                continue;
            }
            hits.push(LayerHit {
                layer: layer.index(),
                module: id,
                y: on_plane.y(),
                z: on_plane.z(),
                path_factor: path_length_factor(on_plane.snp(), on_plane.tgl()),
            });
        }
        hits
    }

    /// Clusters exactly on the track
    ///
    /// Fails when the track reaches no layer at all.
    pub fn clusters(&self, spec: &TrackSpec) -> Result<Vec<ClusterInput>> {
        let hits = self.hits(spec);
        if hits.is_empty() {
            return Err(TrackingError::GeometryMiss {
                radius: self.layers.first().map_or(0.0, |l| l.radius()),
            });
        }
        Ok(hits.iter().map(|hit| self.cluster(hit, spec, 0.0, 0.0)).collect())
    }

    /// Clusters smeared by the resolution
    pub fn smeared_clusters<R: Rng>(&self, spec: &TrackSpec, rng: &mut R) -> Vec<ClusterInput> {
        self.hits(spec)
            .iter()
            .map(|hit| {
                let dy = rng.sample::<f64, _>(StandardNormal) * self.sigma_y;
                let dz = rng.sample::<f64, _>(StandardNormal) * self.sigma_z;
                self.cluster(hit, spec, dy, dz)
            })
            .collect()
    }

    fn cluster(&self, hit: &LayerHit, spec: &TrackSpec, dy: f64, dz: f64) -> ClusterInput {
        ClusterInput {
            layer: hit.layer,
            module: hit.module,
            y: hit.y + dy,
            z: hit.z + dz,
            sigma_y2: self.sigma_y * self.sigma_y,
            sigma_z2: self.sigma_z * self.sigma_z,
            sigma_yz: 0.0,
            charge: hit.path_factor,
            labels: spec.label.map_or_else(Default::default, |l| smallvec![l]),
            id: None,
        }
    }

    /// Exact state at radius `radius`, frame through the crossing point,
    /// with the generator's seed covariance
    pub fn seed_at(&self, spec: &TrackSpec, radius: f64) -> Result<TrackState> {
        let mut state = self.vertex_state(spec);
        state.transport_to_radius(radius)?;
        state.rotate(state.phi())?;
        let covariance = TrackCovariance::from_diagonal(&Vector5::from(self.seed_covariance));
        Ok(TrackState::new(
            state.x(),
            state.alpha(),
            *state.params(),
            covariance,
            self.layers.len(),
        )
        .with_label(spec.label))
    }

    /// Seed record at `radius`
    pub fn seed(&self, spec: &TrackSpec, radius: f64, quality: f64) -> Result<Seed> {
        Ok(Seed::from_state(&self.seed_at(spec, radius)?, quality))
    }
}

/// Random event: clusters and seeds of `n_tracks` particles
#[derive(Debug, Clone)]
pub struct RandomEvent {
    pub specs: Vec<TrackSpec>,
    pub clusters: Vec<ClusterInput>,
    pub seeds: Vec<Seed>,
}

impl EventGenerator {
    /// Random event with pT uniform in [`pt_min`, 2·`pt_min` + 1] GeV
    ///
    /// Every particle gets a seed at `seed_radius`, with quality 1/pT so
    /// that stiffer tracks go first; particles whose seed cannot be built are
    /// kept as clusters only.
    pub fn random_event(
        &self,
        n_tracks: usize,
        pt_min: f64,
        seed_radius: f64,
        rng_seed: u64,
    ) -> RandomEvent {
        let mut rng = StdRng::seed_from_u64(rng_seed);
        let mut event = RandomEvent {
            specs: Vec::with_capacity(n_tracks),
            clusters: Vec::new(),
            seeds: Vec::with_capacity(n_tracks),
        };
        for label in 0..n_tracks {
            let charge = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            let spec = TrackSpec::new(
                rng.gen_range(pt_min..2.0 * pt_min + 1.0),
                rng.gen_range(0.0..TAU),
                rng.gen_range(-0.8..0.8),
            )
            .with_charge(charge)
            .with_z0(rng.gen_range(-1.0..1.0))
            .with_label(label as i64);

            event.clusters.extend(self.smeared_clusters(&spec, &mut rng));
            if let Ok(seed) = self.seed(&spec, seed_radius, 1.0 / spec.pt) {
                event.seeds.push(seed);
            }
            event.specs.push(spec);
        }
        event
    }
}
