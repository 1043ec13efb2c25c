//! Standalone seeding from cluster triplets
//!
//! Each unused cluster of the outer seeding layer opens a search: middle
//! clusters are looked up in a window around the straight line from the beam
//! line through the outer cluster, inner clusters in a window around the
//! middle cluster's azimuth. The circle through the three points gives the
//! curvature and the direction at the outer point; the arc-length slope gives
//! the dip. The best triplet of each outer cluster becomes a seed on the outer
//! cluster's module plane.

use nalgebra::Vector5;

use super::config::SeedingConfig;
use super::event::Seed;
use crate::common::constants::{ALMOST_ONE, B2C, STRAIGHT_LINE_CURVATURE};
use crate::detector::{ClusterRef, Detector, Module};
use crate::track::{TrackCovariance, TrackParams};

/// Cluster position in the global frame
#[derive(Debug, Clone, Copy, PartialEq)]
struct SpacePoint {
    cluster: ClusterRef,
    x: f64,
    y: f64,
    z: f64,
    radius: f64,
    phi: f64,
    label: Option<i64>,
}

/// Seed candidate of one outer cluster
#[derive(Debug, Clone, Copy)]
struct Triplet {
    curvature: f64,
    snp: f64,
    tgl: f64,
    z_residual: f64,
}

/// Signed curvature of the circle through three points, positive when the
/// path `p1 → p2 → p3` turns counter-clockwise
fn circle_curvature(p1: (f64, f64), p2: (f64, f64), p3: (f64, f64)) -> f64 {
    let cross = (p2.0 - p1.0) * (p3.1 - p1.1) - (p2.1 - p1.1) * (p3.0 - p1.0);
    let d12 = (p2.0 - p1.0).hypot(p2.1 - p1.1);
    let d23 = (p3.0 - p2.0).hypot(p3.1 - p2.1);
    let d13 = (p3.0 - p1.0).hypot(p3.1 - p1.1);
    let denom = d12 * d23 * d13;
    if denom <= 0.0 {
        return 0.0;
    }
    2.0 * cross / denom
}

/// Arc length along a circle of curvature `c` spanning a chord of length `chord`
fn arc_length(chord: f64, c: f64) -> f64 {
    if c.abs() < STRAIGHT_LINE_CURVATURE {
        return chord;
    }
    let arg = (0.5 * c * chord).clamp(-1.0, 1.0);
    2.0 * arg.asin() / c
}

/// Builds seeds from unused clusters of three layers
pub struct StandaloneSeeder<'a> {
    detector: &'a mut Detector,
    config: &'a SeedingConfig,
    b_field: f64,
}

impl<'a> StandaloneSeeder<'a> {
    pub fn new(detector: &'a mut Detector, config: &'a SeedingConfig, b_field: f64) -> Self {
        Self {
            detector,
            config,
            b_field,
        }
    }

    /// Seeds of the current event, stiffest first
    pub fn find_seeds(&mut self) -> Vec<Seed> {
        let outer_layer = self.config.outer_layer;
        let n_outer = self.detector.clusters(outer_layer).len();
        let mut seeds = Vec::new();

        for index in 0..n_outer {
            let outer_ref = ClusterRef::new(outer_layer, index);
            if self.detector.is_used(outer_ref) {
                continue;
            }
            let Some(outer) = self.space_point(outer_ref) else {
                continue;
            };

            let mut best: Option<(Triplet, Option<i64>)> = None;
            let middles = self.window(self.config.middle_layer, &outer, outer.phi);
            for middle in middles {
                let inners = self.window(self.config.inner_layer, &outer, middle.phi);
                for inner in inners {
                    let Some(triplet) = self.evaluate(&inner, &middle, &outer) else {
                        continue;
                    };
                    let better = best
                        .as_ref()
                        .map_or(true, |(b, _)| triplet.z_residual < b.z_residual);
                    if better {
                        let label = match (inner.label, middle.label, outer.label) {
                            (Some(a), Some(b), Some(c)) if a == b && b == c => Some(a),
                            _ => None,
                        };
                        best = Some((triplet, label));
                    }
                }
            }

            if let Some((triplet, label)) = best {
                if let Some(seed) = self.make_seed(&outer, &triplet, label) {
                    seeds.push(seed);
                }
            }
        }

        seeds.sort_by(|a, b| a.quality.total_cmp(&b.quality));
        log::debug!(
            "standalone seeding: {} seeds from {} outer clusters",
            seeds.len(),
            n_outer
        );
        seeds
    }

    fn module(&self, cluster: ClusterRef) -> Option<&Module> {
        self.detector.module_of(cluster)
    }

    fn space_point(&self, cluster_ref: ClusterRef) -> Option<SpacePoint> {
        let cluster = self.detector.cluster(cluster_ref)?;
        let module = self.module(cluster_ref)?;
        let (sin_a, cos_a) = module.alpha.sin_cos();
        let x = module.x * cos_a - cluster.y * sin_a;
        let y = module.x * sin_a + cluster.y * cos_a;
        Some(SpacePoint {
            cluster: cluster_ref,
            x,
            y,
            z: cluster.z,
            radius: x.hypot(y),
            phi: cluster.phi,
            label: cluster.primary_label(),
        })
    }

    /// Unused clusters of `layer` near the beam-line projection of `outer`,
    /// in azimuth around `phi`
    fn window(&mut self, layer: usize, outer: &SpacePoint, phi: f64) -> Vec<SpacePoint> {
        let radius = self.detector.layer(layer).radius();
        let scale = radius / outer.radius;
        let z_center = outer.z * scale;
        let dz = self.config.window_z + self.config.vertex_z_spread * (1.0 - scale);
        let arc_min = radius * (phi - self.config.window_phi);
        let arc_max = radius * (phi + self.config.window_phi);

        let clusters = self.detector.clusters_mut(layer);
        clusters.select_clusters(z_center - dz, z_center + dz, arc_min, arc_max);
        let mut found = Vec::new();
        while let Some(index) = clusters.next_cluster() {
            if !clusters.is_used(index) {
                found.push(ClusterRef::new(layer, index));
            }
        }
        found
            .into_iter()
            .filter_map(|cluster| self.space_point(cluster))
            .collect()
    }

    fn evaluate(&self, inner: &SpacePoint, middle: &SpacePoint, outer: &SpacePoint) -> Option<Triplet> {
        let p1 = (inner.x, inner.y);
        let p2 = (middle.x, middle.y);
        let p3 = (outer.x, outer.y);
        let curvature = circle_curvature(p1, p2, p3);

        if self.b_field != 0.0 && curvature.abs() > STRAIGHT_LINE_CURVATURE {
            let pt = B2C * self.b_field.abs() / curvature.abs();
            if pt < self.config.min_pt {
                log::trace!("triplet rejected: pt {:.3} below threshold", pt);
                return None;
            }
        }

        let module = self.module(outer.cluster)?;
        let d23 = (p3.0 - p2.0).hypot(p3.1 - p2.1);
        let turn = 0.5 * curvature * d23;
        if turn.abs() >= 1.0 {
            return None;
        }
        let direction = (p3.1 - p2.1).atan2(p3.0 - p2.0) + turn.asin();
        let snp = (direction - module.alpha).sin();
        if snp.abs() >= ALMOST_ONE {
            return None;
        }

        let d12 = (p2.0 - p1.0).hypot(p2.1 - p1.1);
        let d13 = (p3.0 - p1.0).hypot(p3.1 - p1.1);
        let s13 = arc_length(d13, curvature);
        if s13 <= 0.0 {
            return None;
        }
        let tgl = (outer.z - inner.z) / s13;
        let z_residual = (middle.z - (inner.z + tgl * arc_length(d12, curvature))).abs();
        if z_residual > self.config.max_z_residual {
            return None;
        }

        Some(Triplet {
            curvature,
            snp,
            tgl,
            z_residual,
        })
    }

    fn make_seed(&self, outer: &SpacePoint, triplet: &Triplet, label: Option<i64>) -> Option<Seed> {
        let module = self.module(outer.cluster)?;
        let cluster = self.detector.cluster(outer.cluster)?;
        Some(Seed {
            x: module.x,
            alpha: module.alpha,
            params: TrackParams::new(
                cluster.y,
                cluster.z,
                triplet.snp,
                triplet.tgl,
                triplet.curvature,
            ),
            covariance: TrackCovariance::from_diagonal(&Vector5::from(self.config.covariance)),
            quality: triplet.curvature.abs(),
            label,
        })
    }
}
