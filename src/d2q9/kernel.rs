//! Per-cell update rule.
//!
//! Every cell is updated independently from the read buffer, the obstacle mask
//! and the boundary set-up; nothing but the cell's own slot in the output is
//! written, so cells run in parallel without locks.
//!
//! Two streaming formulations are kept apart because they disagree at the
//! domain edges:
//!
//! - [`StreamingMode::Push`]: collide in place, then send each value to
//!   `cell + c`. Cells on an edge with an imposed condition are reset to that
//!   condition's equilibrium before streaming. Buffers hold pre-collision
//!   values.
//! - [`StreamingMode::Pull`]: fetch each value from `cell - c`, substituting
//!   the edge's equilibrium for neighbours outside the domain, then collide.
//!   Buffers hold post-collision values.

use super::bc::{AxisSources, BoundaryCondition, Boundaries, Upstream, WallPolicy};
use super::mask::ObstacleMask;
use super::params::Parameters;
use super::state::Distributions;
use super::*;
use crate::error::{CaseError, CaseResult};
use rayon::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamingMode {
    Push,
    Pull,
}

/// Who reverses the values at a solid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolidReflection {
    /// The solid cell stores its incoming values reversed and emits them as
    /// it would any other value.
    SelfReflect,
    /// The solid cell stores what its fluid neighbours send it as it is; a
    /// fluid cell taking a value from a solid neighbour takes the opposite
    /// direction. Solid cells never exchange values among themselves.
    NeighborPull,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EquilibriumForm {
    Generic,
    Explicit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelConfig {
    pub streaming: StreamingMode,
    pub solid_reflection: SolidReflection,
    pub equilibrium: EquilibriumForm,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            streaming: StreamingMode::Push,
            solid_reflection: SolidReflection::SelfReflect,
            equilibrium: EquilibriumForm::Explicit,
        }
    }
}

impl KernelConfig {
    pub fn new(streaming: StreamingMode, solid_reflection: SolidReflection) -> Self {
        Self {
            streaming,
            solid_reflection,
            ..Self::default()
        }
    }

    #[inline]
    pub fn equilibrium(&self, density: Float, velocity: [Float; D]) -> [Float; Q] {
        match self.equilibrium {
            EquilibriumForm::Generic => equilibrium(density, velocity),
            EquilibriumForm::Explicit => equilibrium_explicit(density, velocity),
        }
    }
}

impl StreamingMode {
    pub fn parse(key: &str, value: &str) -> CaseResult<Self> {
        match value {
            "push" => Ok(StreamingMode::Push),
            "pull" => Ok(StreamingMode::Pull),
            _ => Err(CaseError::invalid(key, value, "expected `push` or `pull`")),
        }
    }
}

impl SolidReflection {
    pub fn parse(key: &str, value: &str) -> CaseResult<Self> {
        match value {
            "self" => Ok(SolidReflection::SelfReflect),
            "neighbor" => Ok(SolidReflection::NeighborPull),
            _ => Err(CaseError::invalid(key, value, "expected `self` or `neighbor`")),
        }
    }
}

impl EquilibriumForm {
    pub fn parse(key: &str, value: &str) -> CaseResult<Self> {
        match value {
            "generic" => Ok(EquilibriumForm::Generic),
            "explicit" => Ok(EquilibriumForm::Explicit),
            _ => Err(CaseError::invalid(key, value, "expected `generic` or `explicit`")),
        }
    }
}

/// Everything a cell update reads besides the distributions.
pub struct StepContext<'a> {
    pub nx: usize,
    pub ny: usize,
    pub mask: &'a ObstacleMask,
    pub boundaries: &'a Boundaries,
    pub kernel: &'a KernelConfig,
    pub parameters: Parameters,
}

impl StepContext<'_> {
    #[inline]
    fn coordinates(&self, index: usize) -> [usize; D] {
        [index % self.nx, index / self.nx]
    }

    /// Under [`SolidReflection::NeighborPull`] a solid cell only stores what
    /// its fluid neighbours send it, and each stored value is read back by the
    /// one fluid cell it came from. Slots with no fluid upstream keep their
    /// value.
    #[inline]
    fn stores_for_neighbors(&self, index: usize) -> bool {
        self.kernel.solid_reflection == SolidReflection::NeighborPull && self.mask.is_solid(index)
    }

    /// Value leaving `source` along `q` as seen by the cell it reaches.
    #[inline]
    fn emitted(&self, buffer: &Distributions, source: usize, q: usize) -> Float {
        if self.stores_for_neighbors(source) {
            buffer.get(source, Q_BAR[q])
        } else {
            buffer.get(source, q)
        }
    }

    #[inline]
    fn solid_output(&self, f: &[Float; Q]) -> [Float; Q] {
        match self.kernel.solid_reflection {
            SolidReflection::SelfReflect => reflect(f),
            SolidReflection::NeighborPull => *f,
        }
    }
}

/// Push streaming, first half: post-collision values of every cell.
pub fn collide_push(context: &StepContext, read: &Distributions, post: &mut Distributions) {
    post.as_mut_slice()
        .par_chunks_mut(Q)
        .enumerate()
        .for_each(|(index, cell)| cell.copy_from_slice(&collide_push_cell(context, read, index)));
}

pub fn collide_push_cell(context: &StepContext, read: &Distributions, index: usize) -> [Float; Q] {
    let f = read.cell(index);
    if context.mask.is_solid(index) {
        return context.solid_output(&f);
    }
    let (density, velocity) = moments(&f);
    let imposed = context.boundaries.push_override(
        context.coordinates(index),
        [context.nx, context.ny],
        density,
        &context.parameters,
    );
    let (density, velocity) = imposed.unwrap_or((density, velocity));
    let f_eq = context.kernel.equilibrium(density, velocity);
    let mut f = if imposed.is_some() { f_eq } else { f };
    collide(&mut f, &f_eq, context.parameters.tau);
    f
}

/// Push streaming, second half: every slot of `write` gathers the values
/// pushed onto it.
pub fn stream_push(context: &StepContext, post: &Distributions, write: &mut Distributions) {
    write
        .as_mut_slice()
        .par_chunks_mut(Q)
        .enumerate()
        .for_each(|(index, cell)| {
            for (q, value) in cell.iter_mut().enumerate() {
                *value = gather_push(context, post, index, q);
            }
        });
}

/// Sum of the values pushed onto slot `q` of cell `index`. Clamped edges can
/// deliver more than one value to the same slot. A slot nothing is pushed
/// onto keeps the cell's own post-collision value.
fn gather_push(context: &StepContext, post: &Distributions, index: usize, q: usize) -> Float {
    let sources = context
        .boundaries
        .push_sources(context.coordinates(index), C[q], [context.nx, context.ny]);
    let fluid_only = context.stores_for_neighbors(index);
    if sources.contains(&AxisSources::Reflect) {
        return post.get(index, if fluid_only { q } else { Q_BAR[q] });
    }
    let mut value = 0.0;
    let mut found = false;
    for &j in sources[1].as_slice() {
        for &i in sources[0].as_slice() {
            let source = j * context.nx + i;
            if fluid_only && context.mask.is_solid(source) {
                continue;
            }
            value += context.emitted(post, source, q);
            found = true;
        }
    }
    if found {
        value
    } else {
        post.get(index, q)
    }
}

/// Pull streaming: load from upstream neighbours, collide, write in place.
pub fn stream_pull(context: &StepContext, read: &Distributions, write: &mut Distributions) {
    write
        .as_mut_slice()
        .par_chunks_mut(Q)
        .enumerate()
        .for_each(|(index, cell)| cell.copy_from_slice(&pull_cell(context, read, index)));
}

pub fn pull_cell(context: &StepContext, read: &Distributions, index: usize) -> [Float; Q] {
    let fluid_only = context.stores_for_neighbors(index);
    let mut local_density = None;
    let mut f = [0.0; Q];
    for (q, value) in f.iter_mut().enumerate() {
        let upstream = context.boundaries.pull_upstream(
            context.coordinates(index),
            C[q],
            [context.nx, context.ny],
        );
        *value = match upstream {
            Upstream::Cell(source) if fluid_only && context.mask.is_solid(source) => {
                read.get(index, q)
            }
            Upstream::Cell(source) => context.emitted(read, source, q),
            Upstream::Outside(_) if fluid_only => read.get(index, q),
            Upstream::Outside(BoundaryCondition::Wall(WallPolicy::BounceBack)) => {
                read.get(index, Q_BAR[q])
            }
            Upstream::Outside(condition) => {
                let density = *local_density.get_or_insert_with(|| density(&read.cell(index)));
                match condition.imposed_moments(density, &context.parameters) {
                    Some((density, velocity)) => equilibrium_direction(q, density, velocity),
                    None => read.get(index, q),
                }
            }
        };
    }
    if context.mask.is_solid(index) {
        return context.solid_output(&f);
    }
    let (density, velocity) = moments(&f);
    let f_eq = context.kernel.equilibrium(density, velocity);
    collide(&mut f, &f_eq, context.parameters.tau);
    f
}
