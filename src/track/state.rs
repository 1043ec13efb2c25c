//! Track state in a rotating local frame
//!
//! Parameters are `[y, z, snp, tgl, c]`: local y and z at local x, sine of the
//! azimuth of the momentum relative to the frame, tangent of the dip angle,
//! and signed curvature in 1/cm (positive turns counter-clockwise seen from
//! +z). The frame is rotated by `alpha` about the beam axis; its x axis passes
//! through the module the track currently sits on.
//!
//! Transport follows the circle exactly, including the arc length entering
//! z, so going from x₁ to x₂ and back returns the starting parameters.

use nalgebra::{Matrix2, Matrix5, Vector2, Vector5};
use smallvec::SmallVec;
use std::f64::consts::TAU;

use crate::common::constants::{ALMOST_ONE, STRAIGHT_LINE_CURVATURE};
use crate::common::linalg::{chi2_2d, kalman_update, symmetrize};
use crate::detector::{ClusterRecord, ClusterRef};
use crate::error::{Result, TrackingError};

/// Track parameters `[y, z, snp, tgl, c]`
pub type TrackParams = Vector5<f64>;

/// Covariance of the track parameters
pub type TrackCovariance = Matrix5<f64>;

/// Parameter indices
pub const Y: usize = 0;
pub const Z: usize = 1;
pub const SNP: usize = 2;
pub const TGL: usize = 3;
pub const CRV: usize = 4;

/// Result of offering a measurement to the state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateOutcome {
    /// Measurement absorbed with this chi2 contribution
    Accepted { chi2: f64 },
    /// Predicted chi2 at or above the gate; state untouched
    Rejected { chi2: f64 },
}

impl UpdateOutcome {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, UpdateOutcome::Accepted { .. })
    }

    #[inline]
    pub fn chi2(&self) -> f64 {
        match *self {
            UpdateOutcome::Accepted { chi2 } | UpdateOutcome::Rejected { chi2 } => chi2,
        }
    }
}

/// Kalman state of one track hypothesis
#[derive(Debug, Clone, PartialEq)]
pub struct TrackState {
    x: f64,
    alpha: f64,
    params: TrackParams,
    covariance: TrackCovariance,
    chi2: f64,
    clusters: SmallVec<[Option<usize>; 8]>,
    n_clusters: usize,
    n_skips: usize,
    consecutive_skips: usize,
    n_dead_zones: usize,
    label: Option<i64>,
}

impl TrackState {
    /// Create a state with no clusters attached
    ///
    /// `num_layers` fixes the length of the cluster slot list.
    pub fn new(
        x: f64,
        alpha: f64,
        params: TrackParams,
        covariance: TrackCovariance,
        num_layers: usize,
    ) -> Self {
        Self {
            x,
            alpha: alpha.rem_euclid(TAU),
            params,
            covariance: symmetrize(&covariance),
            chi2: 0.0,
            clusters: SmallVec::from_elem(None, num_layers),
            n_clusters: 0,
            n_skips: 0,
            consecutive_skips: 0,
            n_dead_zones: 0,
            label: None,
        }
    }

    /// Attach a truth label (from the seed)
    pub fn with_label(mut self, label: Option<i64>) -> Self {
        self.label = label;
        self
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.x
    }

    #[inline]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    #[inline]
    pub fn params(&self) -> &TrackParams {
        &self.params
    }

    #[inline]
    pub fn covariance(&self) -> &TrackCovariance {
        &self.covariance
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.params[Y]
    }

    #[inline]
    pub fn z(&self) -> f64 {
        self.params[Z]
    }

    #[inline]
    pub fn snp(&self) -> f64 {
        self.params[SNP]
    }

    #[inline]
    pub fn tgl(&self) -> f64 {
        self.params[TGL]
    }

    #[inline]
    pub fn curvature(&self) -> f64 {
        self.params[CRV]
    }

    /// Accumulated chi2
    #[inline]
    pub fn chi2(&self) -> f64 {
        self.chi2
    }

    #[inline]
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    #[inline]
    pub fn n_skips(&self) -> usize {
        self.n_skips
    }

    #[inline]
    pub fn consecutive_skips(&self) -> usize {
        self.consecutive_skips
    }

    #[inline]
    pub fn n_dead_zones(&self) -> usize {
        self.n_dead_zones
    }

    #[inline]
    pub fn label(&self) -> Option<i64> {
        self.label
    }

    /// Number of layer slots
    #[inline]
    pub fn num_layers(&self) -> usize {
        self.clusters.len()
    }

    /// Cluster index recorded for a layer
    #[inline]
    pub fn cluster_at(&self, layer: usize) -> Option<usize> {
        self.clusters.get(layer).copied().flatten()
    }

    /// Recorded clusters, innermost layer first
    pub fn cluster_refs(&self) -> impl Iterator<Item = ClusterRef> + '_ {
        self.clusters
            .iter()
            .enumerate()
            .filter_map(|(layer, slot)| slot.map(|index| ClusterRef::new(layer, index)))
    }

    /// Transverse momentum [GeV] in a field of `b_field` kG
    pub fn pt(&self, b_field: f64) -> f64 {
        let c = self.curvature().abs();
        if c < STRAIGHT_LINE_CURVATURE {
            f64::INFINITY
        } else {
            crate::common::constants::B2C * b_field.abs() / c
        }
    }

    /// Total momentum [GeV]
    pub fn momentum(&self, b_field: f64) -> f64 {
        self.pt(b_field) * (1.0 + self.tgl() * self.tgl()).sqrt()
    }

    /// Global (x, y, z) of the current point
    pub fn global_position(&self) -> [f64; 3] {
        let (sa, ca) = self.alpha.sin_cos();
        [
            self.x * ca - self.y() * sa,
            self.x * sa + self.y() * ca,
            self.z(),
        ]
    }

    /// Global azimuth of the current point, in [0, 2π)
    pub fn phi(&self) -> f64 {
        let [gx, gy, _] = self.global_position();
        gy.atan2(gx).rem_euclid(TAU)
    }

    /// Distance of the current point from the beam line
    pub fn radius(&self) -> f64 {
        self.x.hypot(self.y())
    }

    /// Local x at which the track crosses the cylinder of radius `r`
    ///
    /// Solves the circle/cylinder intersection in closed form and keeps the
    /// root on the current half-turn nearest to the current x.
    pub fn local_x_at_radius(&self, r: f64) -> Result<f64> {
        let miss = TrackingError::GeometryMiss { radius: r };
        let (x0, y0, f0, c) = (self.x, self.y(), self.snp(), self.curvature());
        if f0.abs() >= ALMOST_ONE {
            return Err(miss);
        }
        let r0 = ((1.0 - f0) * (1.0 + f0)).sqrt();

        if c.abs() < STRAIGHT_LINE_CURVATURE {
            let b = x0 * r0 + y0 * f0;
            let disc = b * b - (x0 * x0 + y0 * y0 - r * r);
            if disc < 0.0 {
                return Err(miss);
            }
            let sq = disc.sqrt();
            let (t1, t2) = (-b - sq, -b + sq);
            let t = if t1.abs() < t2.abs() { t1 } else { t2 };
            return Ok(x0 + t * r0);
        }

        // Intersect the track circle (centre `centre`, radius 1/|c|) with the
        // cylinder. d² − 1/c² is expanded so no large terms cancel.
        let centre = (x0 - f0 / c, y0 + r0 / c);
        let d = centre.0.hypot(centre.1);
        if d == 0.0 {
            return Err(miss);
        }
        let power = x0 * x0 + y0 * y0 + 2.0 * (y0 * r0 - x0 * f0) / c;
        let along = (r * r + power) / (2.0 * d);
        let h2 = r * r - along * along;
        if h2 < 0.0 {
            return Err(miss);
        }
        let h = h2.sqrt();
        let (ux, uy) = (centre.0 / d, centre.1 / d);

        [(along * ux - h * uy, along * uy + h * ux), (along * ux + h * uy, along * uy - h * ux)]
            .iter()
            .filter_map(|&(px, py)| {
                // Direction at the crossing; only the current half-turn is reachable
                let f = f0 + c * (px - x0);
                let cf = r0 + c * (y0 - py);
                (cf > 0.0 && f.abs() < ALMOST_ONE).then_some(px)
            })
            .min_by(|p, q| (p - x0).abs().total_cmp(&(q - x0).abs()))
            .ok_or(miss)
    }

    /// Transport the state to local x (no material)
    ///
    /// Fails with [`TrackingError::GeometryMiss`] when the track turns
    /// parallel to the plane before reaching it.
    pub fn transport_to(&mut self, x2: f64) -> Result<()> {
        let dx = x2 - self.x;
        if dx == 0.0 {
            return Ok(());
        }
        let f1 = self.snp();
        let c = self.curvature();
        let tgl = self.tgl();
        let f2 = f1 + c * dx;
        if f1.abs() >= ALMOST_ONE || f2.abs() >= ALMOST_ONE {
            return Err(TrackingError::GeometryMiss { radius: x2 });
        }
        let r1 = ((1.0 - f1) * (1.0 + f1)).sqrt();
        let r2 = ((1.0 - f2) * (1.0 + f2)).sqrt();

        // Mean direction and half turning angle over the step
        let (a1, a2) = (f1.asin(), f2.asin());
        let m = 0.5 * (a1 + a2);
        let d = 0.5 * (a2 - a1);
        let (tan_m, sec_m) = (m.tan(), 1.0 / m.cos());
        let (arc_ratio, arc_ratio_d) = if d.abs() < 1e-4 {
            (1.0 + d * d / 6.0, d / 3.0)
        } else {
            let (sd, cd) = d.sin_cos();
            (d / sd, (sd - d * cd) / (sd * sd))
        };
        let path = dx * sec_m * arc_ratio;

        let dm_df1 = 0.5 * (1.0 / r1 + 1.0 / r2);
        let dd_df1 = 0.5 * (1.0 / r2 - 1.0 / r1);
        let dmd_dc = 0.5 * dx / r2;
        let dpath_dm = dx * sec_m * tan_m * arc_ratio;
        let dpath_dd = dx * sec_m * arc_ratio_d;

        let mut jac = Matrix5::identity();
        jac[(Y, SNP)] = dx * sec_m * sec_m * dm_df1;
        jac[(Y, CRV)] = dx * sec_m * sec_m * dmd_dc;
        jac[(Z, SNP)] = tgl * (dpath_dm * dm_df1 + dpath_dd * dd_df1);
        jac[(Z, TGL)] = path;
        jac[(Z, CRV)] = tgl * (dpath_dm + dpath_dd) * dmd_dc;
        jac[(SNP, CRV)] = dx;

        self.params[Y] += dx * tan_m;
        self.params[Z] += tgl * path;
        self.params[SNP] = f2;
        self.x = x2;
        self.covariance = symmetrize(&(jac * self.covariance * jac.transpose()));
        Ok(())
    }

    /// Transport to the cylinder of radius `r` (no material)
    pub fn transport_to_radius(&mut self, r: f64) -> Result<()> {
        let x = self.local_x_at_radius(r)?;
        self.transport_to(x)
    }

    /// Rotate into the frame at azimuth `alpha`
    ///
    /// The point is unchanged; the covariance is re-expressed at constant
    /// new local x.
    pub fn rotate(&mut self, alpha: f64) -> Result<()> {
        let da = alpha - self.alpha;
        if da == 0.0 {
            return Ok(());
        }
        let (sa, ca) = da.sin_cos();
        let f = self.snp();
        if f.abs() >= ALMOST_ONE {
            return Err(TrackingError::GeometryMiss { radius: self.radius() });
        }
        let cf = ((1.0 - f) * (1.0 + f)).sqrt();
        let f_new = f * ca - cf * sa;
        let cf_new = cf * ca + f * sa;
        if cf_new <= 0.0 || f_new.abs() >= ALMOST_ONE {
            return Err(TrackingError::GeometryMiss { radius: self.radius() });
        }

        let mut jac = Matrix5::identity();
        jac[(Y, Y)] = cf / cf_new;
        jac[(Z, Y)] = -sa * self.tgl() / cf_new;
        jac[(SNP, Y)] = -sa * self.curvature();
        jac[(SNP, SNP)] = cf_new / cf;

        let (x, y) = (self.x, self.y());
        self.x = x * ca + y * sa;
        self.params[Y] = -x * sa + y * ca;
        self.params[SNP] = f_new;
        self.alpha = alpha.rem_euclid(TAU);
        self.covariance = symmetrize(&(jac * self.covariance * jac.transpose()));
        Ok(())
    }

    /// Innovation covariance for a measurement with covariance `v`
    #[inline]
    fn innovation_covariance(&self, v: &Matrix2<f64>) -> Matrix2<f64> {
        self.covariance.fixed_view::<2, 2>(0, 0).into_owned() + v
    }

    /// Predicted chi2 of a measurement at the current point
    ///
    /// Pure: the state is never modified.
    pub fn predicted_chi2_of(&self, measurement: &Vector2<f64>, v: &Matrix2<f64>) -> Result<f64> {
        let residual = measurement - Vector2::new(self.y(), self.z());
        chi2_2d(&residual, &self.innovation_covariance(v))
            .ok_or_else(|| TrackingError::degenerate("innovation covariance"))
    }

    /// Predicted chi2 of a cluster expressed in the current frame
    pub fn predicted_chi2(&self, cluster: &ClusterRecord) -> Result<f64> {
        self.predicted_chi2_of(&cluster.measurement(), &cluster.covariance())
    }

    /// Gated Kalman update with an arbitrary (y, z) measurement
    ///
    /// Adds the chi2 contribution but records no cluster.
    pub fn filter(
        &mut self,
        measurement: &Vector2<f64>,
        v: &Matrix2<f64>,
        chi2_max: f64,
    ) -> Result<UpdateOutcome> {
        let chi2 = self.predicted_chi2_of(measurement, v)?;
        if !(chi2 < chi2_max) {
            return Ok(UpdateOutcome::Rejected { chi2 });
        }
        let (params, covariance, chi2) =
            kalman_update(&self.params, &self.covariance, measurement, v)
                .ok_or_else(|| TrackingError::degenerate("innovation covariance"))?;
        self.params = params;
        self.covariance = covariance;
        self.chi2 += chi2;
        Ok(UpdateOutcome::Accepted { chi2 })
    }

    /// Gated update with a cluster, recording it for its layer
    ///
    /// A cluster already recorded on the same layer is replaced, so a layer
    /// never holds two clusters.
    pub fn update(
        &mut self,
        cluster_ref: ClusterRef,
        cluster: &ClusterRecord,
        chi2_max: f64,
    ) -> Result<UpdateOutcome> {
        let outcome = self.filter(&cluster.measurement(), &cluster.covariance(), chi2_max)?;
        if outcome.is_accepted() {
            if let Some(slot) = self.clusters.get_mut(cluster_ref.layer) {
                if slot.replace(cluster_ref.index).is_none() {
                    self.n_clusters += 1;
                }
            }
            self.consecutive_skips = 0;
        }
        Ok(outcome)
    }

    /// Record a layer crossed without a compatible cluster
    pub fn record_skip(&mut self) {
        self.n_skips += 1;
        self.consecutive_skips += 1;
    }

    /// Record a layer crossed in an insensitive area
    pub fn record_dead_zone(&mut self) {
        self.n_dead_zones += 1;
    }

    /// chi2 per cluster with penalties for skips and dead zones
    pub fn normalized_chi2(&self, skip_penalty: f64, dead_zone_penalty: f64) -> f64 {
        let penalized = self.chi2
            + skip_penalty * self.n_skips as f64
            + dead_zone_penalty * self.n_dead_zones as f64;
        penalized / self.n_clusters.max(1) as f64
    }

    /// Keep only the scaled diagonal of the covariance
    ///
    /// Used to start a refit without memory of the previous fit.
    pub fn reset_covariance(&mut self, scale: f64) {
        let diagonal = self.covariance.diagonal() * scale;
        self.covariance = Matrix5::from_diagonal(&diagonal);
    }

    /// Drop the fit history (chi2, clusters, counters) keeping the parameters
    pub fn reset_history(&mut self) {
        self.chi2 = 0.0;
        self.clusters.iter_mut().for_each(|slot| *slot = None);
        self.n_clusters = 0;
        self.n_skips = 0;
        self.consecutive_skips = 0;
        self.n_dead_zones = 0;
    }

    /// Replace the parameters (used by material corrections)
    pub(crate) fn set_curvature(&mut self, c: f64) {
        self.params[CRV] = c;
    }

    /// Add process noise
    pub(crate) fn add_noise(&mut self, noise: &TrackCovariance) {
        self.covariance = symmetrize(&(self.covariance + noise));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::COVARIANCE_TOLERANCE;
    use crate::common::linalg::is_positive_semidefinite;
    use crate::detector::{ClusterInput, ModuleId};
    use smallvec::SmallVec;

    fn state(y: f64, snp: f64, c: f64) -> TrackState {
        let params = TrackParams::new(y, 1.0, snp, 0.5, c);
        let cov = TrackCovariance::from_diagonal(&Vector5::new(1e-2, 1e-2, 1e-4, 1e-4, 1e-6));
        TrackState::new(40.0, 0.3, params, cov, 6)
    }

    fn cluster(y: f64, z: f64) -> ClusterRecord {
        let input = ClusterInput {
            layer: 2,
            module: ModuleId::new(0, 0),
            y,
            z,
            sigma_y2: 1e-4,
            sigma_z2: 1e-4,
            sigma_yz: 0.0,
            charge: 1.0,
            labels: SmallVec::new(),
            id: None,
        };
        ClusterRecord::from_input(input, 0, 0.0)
    }

    #[test]
    fn test_straight_line_transport() {
        let mut s = state(0.0, 0.0, 0.0);
        s.transport_to(10.0).unwrap();
        assert!(s.y().abs() < 1e-12);
        // z advances by tgl × path
        assert!((s.z() - (1.0 - 0.5 * 30.0)).abs() < 1e-12);
    }

    #[test]
    fn test_transport_round_trip() {
        let mut s = state(0.2, 0.1, 2e-3);
        let original = s.clone();
        s.transport_to(4.0).unwrap();
        s.transport_to(40.0).unwrap();
        assert!((s.params() - original.params()).amax() < 1e-10);
        assert!((s.covariance() - original.covariance()).amax() < 1e-12);
    }

    #[test]
    fn test_transport_stays_on_circle() {
        // Global positions along the step lie on one circle of radius 1/|c|
        let c = 5e-3;
        let mut s = state(0.0, 0.2, c);
        let start = s.global_position();
        s.transport_to(20.0).unwrap();
        let mid = s.global_position();
        s.transport_to(10.0).unwrap();
        let end = s.global_position();

        let chord = |p: [f64; 3], q: [f64; 3]| (p[0] - q[0]).hypot(p[1] - q[1]);
        let (a, b, cc) = (chord(start, mid), chord(mid, end), chord(start, end));
        let s2 = (a + b + cc) / 2.0;
        let area = (s2 * (s2 - a) * (s2 - b) * (s2 - cc)).sqrt();
        let menger = 4.0 * area / (a * b * cc);
        assert!((menger - c).abs() < 1e-8);
    }

    #[test]
    fn test_transport_miss_when_turning() {
        let mut s = state(0.0, 0.9, 0.05);
        let before = s.clone();
        assert!(matches!(
            s.transport_to(100.0),
            Err(TrackingError::GeometryMiss { .. })
        ));
        assert_eq!(s, before);
    }

    #[test]
    fn test_local_x_at_radius() {
        let mut s = state(0.3, 0.05, 1e-3);
        let x = s.local_x_at_radius(15.0).unwrap();
        s.transport_to(x).unwrap();
        assert!((s.radius() - 15.0).abs() < 1e-9);

        let mut line = state(0.3, 0.05, 0.0);
        line.transport_to_radius(15.0).unwrap();
        assert!((line.radius() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_unreachable_radius() {
        // Tight helix can never reach a large radius
        let s = state(0.0, 0.0, 0.2);
        assert!(s.local_x_at_radius(200.0).is_err());
    }

    #[test]
    fn test_rotation_preserves_point() {
        let mut s = state(0.4, 0.1, 1e-3);
        let before = s.global_position();
        let before_dir = s.alpha() + s.snp().asin();
        s.rotate(0.5).unwrap();
        let after = s.global_position();
        for i in 0..3 {
            assert!((before[i] - after[i]).abs() < 1e-10);
        }
        let after_dir = s.alpha() + s.snp().asin();
        assert!((before_dir - after_dir).abs() < 1e-12);
        assert!(is_positive_semidefinite(s.covariance(), COVARIANCE_TOLERANCE));
    }

    #[test]
    fn test_predicted_chi2_is_pure() {
        let s = state(0.0, 0.0, 0.0);
        let c = cluster(0.05, 1.02);
        let before = s.clone();
        let chi2_a = s.predicted_chi2(&c).unwrap();
        let chi2_b = s.predicted_chi2(&c).unwrap();
        assert_eq!(chi2_a, chi2_b);
        assert_eq!(s, before);
    }

    #[test]
    fn test_update_accept_and_reject() {
        let mut s = state(0.0, 0.0, 0.0);
        let near = cluster(0.01, 1.0);
        let outcome = s.update(ClusterRef::new(2, 7), &near, 30.0).unwrap();
        assert!(outcome.is_accepted());
        assert_eq!(s.cluster_at(2), Some(7));
        assert_eq!(s.n_clusters(), 1);
        assert!((s.chi2() - outcome.chi2()).abs() < 1e-12);
        assert!(is_positive_semidefinite(s.covariance(), COVARIANCE_TOLERANCE));

        let before = s.clone();
        let far = cluster(5.0, 1.0);
        let outcome = s.update(ClusterRef::new(3, 1), &far, 30.0).unwrap();
        assert!(!outcome.is_accepted());
        assert_eq!(s, before);
    }

    #[test]
    fn test_update_replaces_same_layer() {
        let mut s = state(0.0, 0.0, 0.0);
        s.update(ClusterRef::new(2, 1), &cluster(0.0, 1.0), 30.0).unwrap();
        s.update(ClusterRef::new(2, 4), &cluster(0.0, 1.0), 30.0).unwrap();
        assert_eq!(s.n_clusters(), 1);
        assert_eq!(s.cluster_at(2), Some(4));
        assert_eq!(s.cluster_refs().count(), 1);
    }

    #[test]
    fn test_skip_bookkeeping() {
        let mut s = state(0.0, 0.0, 0.0);
        s.record_skip();
        s.record_skip();
        assert_eq!(s.consecutive_skips(), 2);
        s.update(ClusterRef::new(1, 0), &cluster(0.0, 1.0), 30.0).unwrap();
        assert_eq!(s.consecutive_skips(), 0);
        assert_eq!(s.n_skips(), 2);

        s.record_dead_zone();
        let expected = (s.chi2() + 2.0 * 2.0 + 1.0) / 1.0;
        assert!((s.normalized_chi2(2.0, 1.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_reset_covariance_and_history() {
        let mut s = state(0.0, 0.0, 0.0);
        s.update(ClusterRef::new(1, 0), &cluster(0.0, 1.0), 30.0).unwrap();
        s.reset_covariance(10.0);
        assert_eq!(s.covariance()[(0, 1)], 0.0);
        s.reset_history();
        assert_eq!(s.n_clusters(), 0);
        assert_eq!(s.chi2(), 0.0);
        assert_eq!(s.cluster_at(1), None);
    }

    #[test]
    fn test_pt() {
        let s = state(0.0, 0.0, 1.5e-3);
        assert!((s.pt(5.0) - 0.999_308_193_3).abs() < 1e-6);
    }
}
