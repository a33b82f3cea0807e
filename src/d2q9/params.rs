use crate::global_variables::*;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// Per-step kernel inputs that may change while the run is in progress.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Parameters {
    /// BGK relaxation time.
    pub tau: Float,
    /// Reference speed imposed by fixed-velocity boundaries.
    pub u0: Float,
}

impl Default for Parameters {
    fn default() -> Self {
        Self { tau: TAU, u0: U0 }
    }
}

impl Parameters {
    pub fn new(tau: Float, u0: Float) -> Self {
        Self { tau, u0 }
    }

    /// Lattice kinematic viscosity.
    pub fn viscosity(&self) -> Float {
        CS_2 * (self.tau - 0.5)
    }

    pub fn is_stable(&self) -> bool {
        self.tau > STABILITY_TAU
    }
}

/// Shared control surface for [`Parameters`].
///
/// Clones share the same values. Writers may update them from any thread; the
/// run loop takes one [`snapshot`](ParameterHandle::snapshot) per step, so a
/// step never sees a half-applied change.
#[derive(Clone, Debug, Default)]
pub struct ParameterHandle {
    inner: Arc<RwLock<Parameters>>,
}

impl ParameterHandle {
    pub fn new(parameters: Parameters) -> Self {
        Self {
            inner: Arc::new(RwLock::new(parameters)),
        }
    }

    pub fn snapshot(&self) -> Parameters {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_tau(&self, tau: Float) {
        if tau <= STABILITY_TAU {
            warn!(tau, "relaxation time at or below 0.5, the run will go unstable");
        }
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .tau = tau;
    }

    pub fn set_u0(&self, u0: Float) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .u0 = u0;
    }
}
