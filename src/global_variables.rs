pub const CASE_NAME: &'static str = "Wing Tunnel";

pub type Float = f64;

pub const TOLERANCE_DENSITY: Float = 1e-7;

pub const TOLERANCE_VELOCITY_X: Float = 1e-7;

pub const TOLERANCE_VELOCITY_Y: Float = 1e-7;

pub const MIN_ITER: usize = 1000;

pub const MAX_ITER: usize = 20_000;

pub const NX: usize = 256;

pub const NY: usize = 128;

pub const TAU: Float = 0.6;

pub const U0: Float = 0.1;

/// Below this relaxation time the BGK scheme has non-positive viscosity.
pub const STABILITY_TAU: Float = 0.5;

pub const LATTICE_DENSITY: Float = 1.0;

pub const CS_2: Float = 1.0 / 3.0;

pub const CS_2_INV: Float = 3.0;

pub const CS_4_INV: Float = 9.0;
