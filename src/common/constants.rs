//! Physical and numerical constants used by propagation and fitting
//!
//! Units: cm, GeV, kG. These are fixed by physics; user-tunable thresholds
//! live in [`crate::tracker::TrackerConfig`].

/// Conversion between curvature and transverse momentum
///
/// `pt [GeV] = B2C * B [kG] / |c| [1/cm]`
pub const B2C: f64 = 0.299_792_458e-3;

/// Largest |sin(azimuth)| accepted before a track is considered parallel to the plane
pub const ALMOST_ONE: f64 = 0.999_99;

/// Curvature below which the track is propagated as a straight line
pub const STRAIGHT_LINE_CURVATURE: f64 = 1e-9;

/// Radiation length of silicon [cm]
pub const SILICON_X0: f64 = 9.36;

/// Density of silicon [g/cm³]
pub const SILICON_DENSITY: f64 = 2.33;

/// Charged pion mass [GeV], the default tracking hypothesis
pub const PION_MASS: f64 = 0.139_570_18;

/// Highland multiple-scattering constant [GeV]
pub const HIGHLAND_CONSTANT: f64 = 0.0136;

/// Relative energy loss per step beyond which the correction is refused
///
/// Protects against stopping particles producing a negative momentum.
pub const MAX_RELATIVE_ENERGY_LOSS: f64 = 0.3;

/// Symmetry/eigenvalue tolerance used when validating covariances
pub const COVARIANCE_TOLERANCE: f64 = 1e-9;
