//! Two-dimensional lattice Boltzmann solver (D2Q9, BGK collision) for flow
//! around obstacles.

pub mod d2q9;
pub mod error;
pub mod global_variables;
pub mod io;
pub mod post;

pub use error::{CaseError, CaseResult};
pub use global_variables::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeType {
    Fluid = 0,
    Solid = 1,
}

/// L2 norms of the change between two consecutive snapshots.
#[derive(Clone, Debug, PartialEq)]
pub struct Residuals {
    pub density: Float,
    pub velocity: [Float; d2q9::D],
}
