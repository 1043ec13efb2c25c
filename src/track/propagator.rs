//! Transport through material
//!
//! [`Propagator`] wraps the geometric transport of [`TrackState`] and adds
//! process noise for the material crossed: multiple scattering scaled by x/X0
//! and, when enabled, the mean energy loss scaled by x·ρ. The energy-loss
//! correction is signed by the propagation direction: moving outward follows
//! the particle and removes energy, moving inward (from the outer detector
//! towards the vertex) gives it back.

use nalgebra::{Matrix2, Matrix2x3, Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use super::state::{TrackCovariance, TrackState, UpdateOutcome, CRV, SNP, TGL};
use crate::common::constants::{
    HIGHLAND_CONSTANT, MAX_RELATIVE_ENERGY_LOSS, PION_MASS, STRAIGHT_LINE_CURVATURE,
};
use crate::detector::PassiveShell;
use crate::error::{Result, TrackingError};

/// Material crossed at normal incidence
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Material {
    /// Radiation-length fraction
    pub x_over_x0: f64,
    /// Density times thickness [g/cm²]
    pub x_rho: f64,
}

impl Material {
    pub const NONE: Material = Material {
        x_over_x0: 0.0,
        x_rho: 0.0,
    };

    pub fn new(x_over_x0: f64, x_rho: f64) -> Self {
        Self { x_over_x0, x_rho }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x_over_x0 <= 0.0 && self.x_rho <= 0.0
    }
}

impl From<&PassiveShell> for Material {
    fn from(shell: &PassiveShell) -> Self {
        Material::new(shell.x_over_x0, shell.x_rho)
    }
}

/// Mean specific energy loss [GeV cm²/g] at β²
///
/// Simplified Bethe-Bloch for silicon-like media.
pub fn bethe_bloch(beta2: f64) -> f64 {
    let beta2 = beta2.clamp(1e-6, 1.0 - 1e-12);
    0.153e-3 / beta2 * ((5940.0 * beta2 / (1.0 - beta2)).ln() - beta2)
}

/// Primary vertex estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Global position [cm]
    pub position: Vector3<f64>,
    /// Position covariance [cm²]
    pub covariance: Matrix3<f64>,
}

impl Vertex {
    pub fn new(position: Vector3<f64>, covariance: Matrix3<f64>) -> Self {
        Self {
            position,
            covariance,
        }
    }

    /// Beam spot at the origin with the given transverse and longitudinal sigma
    pub fn beam_spot(sigma_xy: f64, sigma_z: f64) -> Self {
        let covariance = Matrix3::from_diagonal(&Vector3::new(
            sigma_xy * sigma_xy,
            sigma_xy * sigma_xy,
            sigma_z * sigma_z,
        ));
        Self::new(Vector3::zeros(), covariance)
    }

    /// Vertex in the frame at azimuth `alpha`
    ///
    /// Returns the local x and the (y, z) measurement with its covariance.
    pub fn in_frame(&self, alpha: f64) -> (f64, Vector2<f64>, Matrix2<f64>) {
        let (sa, ca) = alpha.sin_cos();
        let (vx, vy, vz) = (self.position.x, self.position.y, self.position.z);
        let x = vx * ca + vy * sa;
        let y = -vx * sa + vy * ca;

        // Rows map global (x, y, z) to local (y, z)
        #[rustfmt::skip]
        let rot = Matrix2x3::new(
            -sa, ca, 0.0,
            0.0, 0.0, 1.0,
        );
        let cov = rot * self.covariance * rot.transpose();
        (x, Vector2::new(y, vz), cov)
    }
}

/// Material-aware propagation for one mass hypothesis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Propagator {
    /// Particle mass [GeV]
    pub mass: f64,
    /// Solenoid field [kG]
    pub b_field: f64,
    /// Apply the mean energy-loss correction
    pub energy_loss: bool,
}

impl Default for Propagator {
    fn default() -> Self {
        Self {
            mass: PION_MASS,
            b_field: 5.0,
            energy_loss: true,
        }
    }
}

impl Propagator {
    pub fn new(mass: f64, b_field: f64, energy_loss: bool) -> Self {
        Self {
            mass,
            b_field,
            energy_loss,
        }
    }

    /// Transport to local x, then correct for `material`
    pub fn propagate_to(&self, state: &mut TrackState, x: f64, material: Material) -> Result<()> {
        let direction = (x - state.x()).signum();
        state.transport_to(x)?;
        self.correct_for_material(state, material, direction)
    }

    /// Transport to the cylinder of radius `r`, then correct for `material`
    pub fn propagate_to_radius(
        &self,
        state: &mut TrackState,
        r: f64,
        material: Material,
    ) -> Result<()> {
        let x = state.local_x_at_radius(r)?;
        self.propagate_to(state, x, material)
    }

    /// Cross a list of passive shells in order
    pub fn cross_shells(&self, state: &mut TrackState, shells: &[&PassiveShell]) -> Result<()> {
        for shell in shells {
            self.propagate_to_radius(state, shell.radius, Material::from(*shell))?;
        }
        Ok(())
    }

    /// Add multiple-scattering noise and the energy-loss correction
    ///
    /// `direction` > 0 follows the particle (energy is lost), < 0 goes
    /// against it (energy is restored). Material is scaled by the path length
    /// through a layer perpendicular to local x.
    pub fn correct_for_material(
        &self,
        state: &mut TrackState,
        material: Material,
        direction: f64,
    ) -> Result<()> {
        if material.is_empty() {
            return Ok(());
        }
        let (snp, tgl, c) = (state.snp(), state.tgl(), state.curvature());
        let cos_phi2 = (1.0 - snp) * (1.0 + snp);
        if cos_phi2 <= 0.0 {
            return Err(TrackingError::GeometryMiss { radius: state.x() });
        }
        let one_tgl2 = 1.0 + tgl * tgl;
        let path_factor = (one_tgl2 / cos_phi2).sqrt();
        let x_over_x0 = material.x_over_x0 * path_factor;
        let x_rho = material.x_rho * path_factor;

        // Straight tracks carry no momentum information; assume 1 GeV
        let p = if c.abs() < STRAIGHT_LINE_CURVATURE {
            1.0
        } else {
            state.momentum(self.b_field)
        };
        let p2 = p * p;
        let energy = (p2 + self.mass * self.mass).sqrt();
        let beta2 = p2 / (energy * energy);

        if x_over_x0 > 0.0 {
            let log_term = 1.0 + 0.038 * x_over_x0.ln();
            let theta2 = HIGHLAND_CONSTANT * HIGHLAND_CONSTANT / (beta2 * p2)
                * x_over_x0
                * log_term.max(0.0).powi(2);
            let mut noise = TrackCovariance::zeros();
            noise[(SNP, SNP)] = theta2 * cos_phi2 * one_tgl2;
            noise[(TGL, TGL)] = theta2 * one_tgl2 * one_tgl2;
            noise[(TGL, CRV)] = theta2 * tgl * c * one_tgl2;
            noise[(CRV, TGL)] = noise[(TGL, CRV)];
            noise[(CRV, CRV)] = theta2 * tgl * tgl * c * c;
            state.add_noise(&noise);
        }

        if self.energy_loss && x_rho > 0.0 && c.abs() >= STRAIGHT_LINE_CURVATURE {
            let de = bethe_bloch(beta2) * x_rho;
            if de / energy > MAX_RELATIVE_ENERGY_LOSS {
                return Err(TrackingError::GeometryMiss { radius: state.x() });
            }
            let new_energy = energy - direction.signum() * de;
            let new_p2 = new_energy * new_energy - self.mass * self.mass;
            if new_p2 <= 0.0 {
                return Err(TrackingError::GeometryMiss { radius: state.x() });
            }
            let new_p = new_p2.sqrt();
            state.set_curvature(c * p / new_p);

            // Straggling: 7% spread on the mean loss
            let sigma_de = 0.07 * de;
            let sigma_c = c * energy * sigma_de / new_p2;
            let mut noise = TrackCovariance::zeros();
            noise[(CRV, CRV)] = sigma_c * sigma_c;
            state.add_noise(&noise);
        }
        Ok(())
    }

    /// Propagate to the point of closest approach in x to the vertex and
    /// apply it as a pseudo-measurement
    ///
    /// The vertex covariance is divided by `weight` (< 1 loosens the pull).
    /// `shells` are crossed on the way in. Returns the outcome of the gated
    /// update; a rejected constraint leaves the state at the vertex x.
    pub fn constrain_to_vertex(
        &self,
        state: &mut TrackState,
        vertex: &Vertex,
        weight: f64,
        chi2_max: f64,
        shells: &[&PassiveShell],
    ) -> Result<UpdateOutcome> {
        self.cross_shells(state, shells)?;
        let (x, measurement, cov) = vertex.in_frame(state.alpha());
        self.propagate_to(state, x, Material::NONE)?;
        let cov = cov / weight.max(f64::MIN_POSITIVE);
        state.filter(&measurement, &cov, chi2_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::COVARIANCE_TOLERANCE;
    use crate::common::linalg::is_positive_semidefinite;
    use crate::track::state::TrackParams;
    use nalgebra::Vector5;

    fn state(c: f64) -> TrackState {
        let params = TrackParams::new(0.0, 0.0, 0.0, 0.2, c);
        let cov = TrackCovariance::from_diagonal(&Vector5::new(1e-4, 1e-4, 1e-6, 1e-6, 1e-8));
        TrackState::new(20.0, 0.0, params, cov, 6)
    }

    #[test]
    fn test_zero_material_round_trip() {
        let propagator = Propagator::default();
        let mut s = state(1.5e-3);
        let original = s.clone();
        propagator.propagate_to(&mut s, 5.0, Material::NONE).unwrap();
        propagator.propagate_to(&mut s, 20.0, Material::NONE).unwrap();
        assert!((s.params() - original.params()).amax() < 1e-10);
    }

    #[test]
    fn test_scattering_inflates_angles_only() {
        let propagator = Propagator::new(PION_MASS, 5.0, false);
        let mut s = state(1.5e-3);
        let before = *s.covariance();
        propagator
            .correct_for_material(&mut s, Material::new(0.01, 0.2), -1.0)
            .unwrap();
        let after = *s.covariance();
        assert_eq!(after[(0, 0)], before[(0, 0)]);
        assert!(after[(SNP, SNP)] > before[(SNP, SNP)]);
        assert!(after[(TGL, TGL)] > before[(TGL, TGL)]);
        assert_eq!(s.curvature(), 1.5e-3);
        assert!(is_positive_semidefinite(&after, COVARIANCE_TOLERANCE));
    }

    #[test]
    fn test_energy_loss_sign() {
        let propagator = Propagator::new(PION_MASS, 5.0, true);
        let material = Material::new(0.01, 0.2);

        let mut outward = state(1.5e-3);
        propagator
            .correct_for_material(&mut outward, material, 1.0)
            .unwrap();
        // Losing energy tightens the curvature
        assert!(outward.curvature() > 1.5e-3);

        let mut inward = state(1.5e-3);
        propagator
            .correct_for_material(&mut inward, material, -1.0)
            .unwrap();
        assert!(inward.curvature() < 1.5e-3);
    }

    #[test]
    fn test_stopping_particle_fails() {
        let propagator = Propagator::new(PION_MASS, 5.0, true);
        // ~15 MeV pion through a thick absorber
        let mut s = state(0.1);
        let result = propagator.correct_for_material(&mut s, Material::new(0.5, 50.0), 1.0);
        assert!(result.is_err());
    }

    #[test]
    fn test_bethe_bloch_minimum_ionising() {
        // βγ ≈ 3.5 gives roughly 1.6-1.7 MeV cm²/g
        let beta2 = 3.5_f64.powi(2) / (1.0 + 3.5_f64.powi(2));
        let dedx = bethe_bloch(beta2);
        assert!(dedx > 1.2e-3 && dedx < 2.0e-3, "dedx = {}", dedx);
    }

    #[test]
    fn test_vertex_in_frame() {
        let vertex = Vertex::new(
            Vector3::new(1.0, 0.0, 2.0),
            Matrix3::from_diagonal(&Vector3::new(1e-4, 4e-4, 9e-4)),
        );
        let (x, m, cov) = vertex.in_frame(std::f64::consts::FRAC_PI_2);
        assert!(x.abs() < 1e-12);
        assert!((m[0] + 1.0).abs() < 1e-12);
        assert!((m[1] - 2.0).abs() < 1e-12);
        // Local y is global -x at 90°
        assert!((cov[(0, 0)] - 1e-4).abs() < 1e-15);
        assert!((cov[(1, 1)] - 9e-4).abs() < 1e-15);
    }

    #[test]
    fn test_vertex_constraint_pulls_state() {
        let propagator = Propagator::new(PION_MASS, 5.0, false);
        let mut s = state(1.5e-3);
        s.transport_to(4.0).unwrap();
        let mut params = *s.params();
        params[0] += 0.05;
        let shifted = TrackState::new(s.x(), s.alpha(), params, *s.covariance(), 6);
        let mut s = shifted;

        let vertex = Vertex::beam_spot(0.005, 0.01);
        let outcome = propagator
            .constrain_to_vertex(&mut s, &vertex, 1.0, 1e6, &[])
            .unwrap();
        assert!(outcome.is_accepted());
        assert!(s.x().abs() < 1e-12);
        assert!(s.y().abs() < 0.05);
    }
}
