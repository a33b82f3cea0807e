pub mod bc;
pub mod geometry;
pub mod io;
pub mod kernel;
pub mod mask;
pub mod params;
pub mod post;
pub mod state;

pub use bc::{BoundaryCondition, BoundaryFace, Boundaries, WallPolicy};
pub use kernel::{EquilibriumForm, KernelConfig, SolidReflection, StreamingMode};
pub use mask::ObstacleMask;
pub use params::{ParameterHandle, Parameters};
pub use state::{Distributions, PingPong};

use crate::error::CaseResult;
use crate::global_variables::*;
use crate::io::WriteDataMode;
use crate::post::PostResult;
use crate::{NodeType, Residuals};
use io::CaseConditions;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const D: usize = 2;

pub const Q: usize = 9;

pub const C: [[i32; D]; Q] = [
    [0, 0],
    [1, 0],
    [0, 1],
    [-1, 0],
    [0, -1],
    [1, 1],
    [-1, 1],
    [-1, -1],
    [1, -1],
];

pub const W: [Float; Q] = [
    4.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
];

/// Index of the opposite velocity, `C[Q_BAR[q]] == -C[q]`.
pub const Q_BAR: [usize; Q] = [0, 3, 4, 1, 2, 7, 8, 5, 6];

pub fn density(f: &[Float; Q]) -> Float {
    f.iter().sum()
}

/// Density and velocity of a cell. A zero density gives non-finite velocity.
pub fn moments(f: &[Float; Q]) -> (Float, [Float; D]) {
    let density = density(f);
    let velocity = [
        (f[1] - f[3] + f[5] - f[6] - f[7] + f[8]) / density,
        (f[2] - f[4] + f[5] + f[6] - f[7] - f[8]) / density,
    ];
    (density, velocity)
}

/// Equilibrium value along direction `q`.
#[inline]
pub fn equilibrium_direction(q: usize, density: Float, velocity: [Float; D]) -> Float {
    let [ux, uy] = velocity;
    let u_2 = ux * ux + uy * uy;
    let u_dot_c = ux * C[q][0] as Float + uy * C[q][1] as Float;
    W[q] * density
        * (1.0 + CS_2_INV * u_dot_c + 0.5 * CS_4_INV * u_dot_c * u_dot_c - 0.5 * CS_2_INV * u_2)
}

/// Second-order D2Q9 equilibrium distribution.
pub fn equilibrium(density: Float, velocity: [Float; D]) -> [Float; Q] {
    let mut f_eq = [0.0; Q];
    for (q, value) in f_eq.iter_mut().enumerate() {
        *value = equilibrium_direction(q, density, velocity);
    }
    f_eq
}

/// Same as [`equilibrium`] with the nine directions written out.
pub fn equilibrium_explicit(density: Float, velocity: [Float; D]) -> [Float; Q] {
    let [ux, uy] = velocity;
    let ux_2 = ux * ux;
    let uy_2 = uy * uy;
    let u_2 = ux_2 + uy_2;
    let ux_uy = ux * uy;
    let mut f_eq = [0.0; Q];
    let mut coeff = (2.0 * density) / 9.0;
    f_eq[0] = coeff * (2.0 - 3.0 * u_2);
    coeff = density / 18.0;
    f_eq[1] = coeff * (2.0 + 6.0 * ux + 9.0 * ux_2 - 3.0 * u_2);
    f_eq[2] = coeff * (2.0 + 6.0 * uy + 9.0 * uy_2 - 3.0 * u_2);
    f_eq[3] = coeff * (2.0 - 6.0 * ux + 9.0 * ux_2 - 3.0 * u_2);
    f_eq[4] = coeff * (2.0 - 6.0 * uy + 9.0 * uy_2 - 3.0 * u_2);
    coeff = density / 36.0;
    f_eq[5] = coeff * (1.0 + 3.0 * (ux + uy) + 9.0 * ux_uy + 3.0 * u_2);
    f_eq[6] = coeff * (1.0 - 3.0 * (ux - uy) - 9.0 * ux_uy + 3.0 * u_2);
    f_eq[7] = coeff * (1.0 - 3.0 * (ux + uy) + 9.0 * ux_uy + 3.0 * u_2);
    f_eq[8] = coeff * (1.0 + 3.0 * (ux - uy) - 9.0 * ux_uy + 3.0 * u_2);
    f_eq
}

/// BGK relaxation towards `f_eq`.
#[inline]
pub fn collide(f: &mut [Float; Q], f_eq: &[Float; Q], tau: Float) {
    for q in 0..Q {
        f[q] -= (f[q] - f_eq[q]) / tau;
    }
}

/// Bounce-back: every value leaves along the direction it arrived from.
#[inline]
pub fn reflect(f: &[Float; Q]) -> [Float; Q] {
    let mut f_out = [0.0; Q];
    for q in 0..Q {
        f_out[q] = f[Q_BAR[q]];
    }
    f_out
}

#[derive(Clone)]
pub struct Simulation {
    pub case_name: String,
    pub case_path: PathBuf,
    pub time_step: usize,
    pub simulation_time: Instant,
    pub tolerance_density: Float,
    pub tolerance_velocity_x: Float,
    pub tolerance_velocity_y: Float,
    pub min_iter: usize,
    pub max_iter: usize,
    pub write_data_mode: WriteDataMode,
    stop: Arc<AtomicBool>,
}

impl Simulation {
    pub fn next_step(&mut self) {
        self.time_step += 1;
    }

    pub fn stop_condition(&self, residuals: &Residuals) -> bool {
        let converged_density = residuals.density <= self.tolerance_density;
        let converged_velocity_x = residuals.velocity[0] <= self.tolerance_velocity_x;
        let converged_velocity_y = residuals.velocity[1] <= self.tolerance_velocity_y;
        let converged_quantities =
            converged_density && converged_velocity_x && converged_velocity_y;
        let min_iterations = self.time_step >= self.min_iter;
        let max_iterations = self.time_step + 1 >= self.max_iter;
        (min_iterations && converged_quantities) || max_iterations || self.stop_requested()
    }

    /// Flag that ends the run at the next step boundary when set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

impl Simulation {
    pub fn new(case_path: &Path) -> Self {
        Self {
            case_name: String::from(CASE_NAME),
            case_path: case_path.to_path_buf(),
            time_step: 0,
            simulation_time: Instant::now(),
            tolerance_density: TOLERANCE_DENSITY,
            tolerance_velocity_x: TOLERANCE_VELOCITY_X,
            tolerance_velocity_y: TOLERANCE_VELOCITY_Y,
            min_iter: MIN_ITER,
            max_iter: MAX_ITER,
            write_data_mode: WriteDataMode::Frequency(500),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_setup(case_path: &Path, parameters: &HashMap<String, String>) -> CaseResult<Self> {
        use crate::io::{optional, FILE_SETUP};
        let mut simulation = Simulation::new(case_path);
        if let Some(case_name) = parameters.get("case_name") {
            simulation.case_name = case_name.clone();
        }
        simulation.tolerance_density = optional(parameters, "tolerance_density", FILE_SETUP)?
            .unwrap_or(TOLERANCE_DENSITY);
        simulation.tolerance_velocity_x =
            optional(parameters, "tolerance_velocity_x", FILE_SETUP)?
                .unwrap_or(TOLERANCE_VELOCITY_X);
        simulation.tolerance_velocity_y =
            optional(parameters, "tolerance_velocity_y", FILE_SETUP)?
                .unwrap_or(TOLERANCE_VELOCITY_Y);
        simulation.min_iter = optional(parameters, "min_iter", FILE_SETUP)?.unwrap_or(MIN_ITER);
        simulation.max_iter = optional(parameters, "max_iter", FILE_SETUP)?.unwrap_or(MAX_ITER);
        if let Some(mode) = parameters.get("write_data_mode") {
            simulation.write_data_mode = WriteDataMode::parse(mode)?;
        }
        Ok(simulation)
    }
}

/// Density, velocity and node type of one cell, as seen by consumers of the
/// lattice.
#[derive(Clone, Debug)]
pub struct ShallowNode {
    pub index: [usize; D],

    pub coordinates: [Float; D],

    pub node_type: NodeType,

    pub density: Float,

    pub velocity: [Float; D],
}

impl ShallowNode {
    pub fn new(index: [usize; D], density: Float, velocity: [Float; D]) -> Self {
        Self {
            index,
            coordinates: [index[0] as Float + 0.5, index[1] as Float + 0.5],
            node_type: NodeType::Fluid,
            density,
            velocity,
        }
    }

    pub fn speed(&self) -> Float {
        (self.velocity[0] * self.velocity[0] + self.velocity[1] * self.velocity[1]).sqrt()
    }
}

/// What a visualization pass should draw for one cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CellSample {
    Solid,
    /// Density, velocity or vorticity is NaN or infinite.
    NonFinite,
    Fluid {
        density: Float,
        velocity: [Float; D],
        speed: Float,
        vorticity: Float,
    },
}

/// Macroscopic fields derived from the last written buffer.
#[derive(Clone, Debug)]
pub struct ShallowLattice {
    pub nx: usize,
    pub ny: usize,
    pub nodes: Vec<ShallowNode>,
}

impl ShallowLattice {
    pub fn new(nx: usize, ny: usize, density: Float, velocity: [Float; D]) -> Self {
        let nodes = (0..nx * ny)
            .map(|index| ShallowNode::new([index % nx, index / nx], density, velocity))
            .collect();
        Self { nx, ny, nodes }
    }

    pub fn get_node(&self, index: &[usize]) -> &ShallowNode {
        let i = index[0];
        let j = index[1];
        let number_of_rows = self.nx * j;
        &self.nodes[i + number_of_rows]
    }

    pub fn get_node_mut(&mut self, index: &[usize]) -> &mut ShallowNode {
        let i = index[0];
        let j = index[1];
        let number_of_rows = self.nx * j;
        &mut self.nodes[i + number_of_rows]
    }

    /// Circulation density from central differences over the 4-neighbourhood.
    /// Zero on the outer ring of cells.
    pub fn vorticity(&self, i: usize, j: usize) -> Float {
        if i == 0 || j == 0 || i + 1 >= self.nx || j + 1 >= self.ny {
            return 0.0;
        }
        let duy_dx =
            self.get_node(&[i + 1, j]).velocity[1] - self.get_node(&[i - 1, j]).velocity[1];
        let dux_dy =
            self.get_node(&[i, j + 1]).velocity[0] - self.get_node(&[i, j - 1]).velocity[0];
        0.5 * (duy_dx - dux_dy)
    }

    pub fn sample(&self, i: usize, j: usize) -> CellSample {
        let node = self.get_node(&[i, j]);
        if node.node_type == NodeType::Solid {
            return CellSample::Solid;
        }
        let vorticity = self.vorticity(i, j);
        let speed = node.speed();
        let finite = node.density.is_finite() && speed.is_finite() && vorticity.is_finite();
        if finite {
            CellSample::Fluid {
                density: node.density,
                velocity: node.velocity,
                speed,
                vorticity,
            }
        } else {
            CellSample::NonFinite
        }
    }

    pub fn number_of_non_finite_nodes(&self) -> usize {
        self.nodes
            .par_iter()
            .filter(|node| node.node_type == NodeType::Fluid)
            .filter(|node| !(node.density.is_finite() && node.speed().is_finite()))
            .count()
    }

    pub fn compute_residuals(&self, old_lattice: &ShallowLattice) -> Residuals {
        Residuals {
            density: self.residual(old_lattice, |node| node.density),
            velocity: [
                self.residual(old_lattice, |node| node.velocity[0]),
                self.residual(old_lattice, |node| node.velocity[1]),
            ],
        }
    }

    fn residual<F>(&self, old_lattice: &ShallowLattice, value: F) -> Float
    where
        F: Fn(&ShallowNode) -> Float + Sync,
    {
        self.nodes
            .par_iter()
            .zip(old_lattice.nodes.par_iter())
            .map(|(node, old_node)| (value(node) - value(old_node)).powi(2))
            .sum::<Float>()
            .sqrt()
    }
}

/// Distributions, obstacle mask and boundary set-up of a running case.
pub struct Lattice {
    pub nx: usize,
    pub ny: usize,
    pub kernel: KernelConfig,
    pub boundaries: Boundaries,
    mask: ObstacleMask,
    distributions: PingPong,
    post_collision: Distributions,
}

impl Lattice {
    /// Seeds both buffers with the equilibrium of `initial(i, j)`; `None`
    /// leaves the cell empty.
    pub fn from_fn<F>(
        mask: ObstacleMask,
        boundaries: Boundaries,
        kernel: KernelConfig,
        initial: F,
    ) -> Self
    where
        F: Fn(usize, usize) -> Option<(Float, [Float; D])> + Sync,
    {
        let (nx, ny) = (mask.nx(), mask.ny());
        let mut seed = Distributions::zeros(nx, ny);
        seed.as_mut_slice()
            .par_chunks_mut(Q)
            .enumerate()
            .for_each(|(index, cell)| {
                if let Some((density, velocity)) = initial(index % nx, index / nx) {
                    cell.copy_from_slice(&kernel.equilibrium(density, velocity));
                }
            });
        Self {
            nx,
            ny,
            kernel,
            boundaries,
            mask,
            distributions: PingPong::new(seed.clone()),
            post_collision: seed,
        }
    }

    /// Uniform flow everywhere, optionally empty inside solids.
    pub fn uniform(
        mask: ObstacleMask,
        boundaries: Boundaries,
        kernel: KernelConfig,
        density: Float,
        velocity: [Float; D],
        zero_solid_cells: bool,
    ) -> Self {
        let solid = mask.clone();
        let nx = mask.nx();
        Self::from_fn(mask, boundaries, kernel, move |i, j| {
            if zero_solid_cells && solid.is_solid(j * nx + i) {
                None
            } else {
                Some((density, velocity))
            }
        })
    }

    pub fn from_conditions(conditions: &CaseConditions, mask: ObstacleMask) -> Self {
        let velocity = conditions.initial_velocity(conditions.u0);
        Self::uniform(
            mask,
            conditions.boundaries,
            conditions.kernel,
            conditions.initial_density,
            velocity,
            conditions.zero_solid_cells,
        )
    }

    pub fn mask(&self) -> &ObstacleMask {
        &self.mask
    }

    /// The buffer written by the last step.
    pub fn current(&self) -> &Distributions {
        self.distributions.current()
    }

    /// Number of completed steps.
    pub fn generation(&self) -> u64 {
        self.distributions.generation()
    }

    pub fn node_type(&self, i: usize, j: usize) -> NodeType {
        self.mask.node_type(j * self.nx + i)
    }

    pub fn total_mass(&self) -> Float {
        self.current().total()
    }

    /// Advances the lattice by one time step with the given parameters.
    pub fn step(&mut self, parameters: &Parameters) {
        let context = kernel::StepContext {
            nx: self.nx,
            ny: self.ny,
            mask: &self.mask,
            boundaries: &self.boundaries,
            kernel: &self.kernel,
            parameters: *parameters,
        };
        let post_collision = &mut self.post_collision;
        match self.kernel.streaming {
            StreamingMode::Push => self.distributions.advance(|read, write| {
                kernel::collide_push(&context, read, post_collision);
                kernel::stream_push(&context, post_collision, write);
            }),
            StreamingMode::Pull => self
                .distributions
                .advance(|read, write| kernel::stream_pull(&context, read, write)),
        }
    }

    pub fn generate_shallow_lattice(&self) -> ShallowLattice {
        let current = self.current();
        let nodes = (0..self.nx * self.ny)
            .into_par_iter()
            .map(|index| {
                let f = current.cell(index);
                let node_type = self.mask.node_type(index);
                let (density, velocity) = match node_type {
                    NodeType::Fluid => moments(&f),
                    NodeType::Solid => (density(&f), [0.0; D]),
                };
                let mut node = ShallowNode::new([index % self.nx, index / self.nx], density, velocity);
                node.node_type = node_type;
                node
            })
            .collect();
        ShallowLattice {
            nx: self.nx,
            ny: self.ny,
            nodes,
        }
    }
}

/// Sets up the case found under `case_path` and runs it to completion.
pub fn run(case_path: &Path, steps: Option<usize>, benchmark: bool) -> CaseResult<()> {
    let setup_time = Instant::now();
    let mut simulation = Simulation::build_case_setup(case_path)?;
    if let Some(steps) = steps {
        simulation.max_iter = steps;
    }
    let conditions = CaseConditions::build(case_path)?;
    let mask = conditions.build_obstacle_mask(case_path)?;
    let mut lattice = Lattice::from_conditions(&conditions, mask);
    lattice.write_coordinates(case_path)?;
    lattice.write_map(case_path)?;
    conditions.write_case_parameters(case_path)?;
    info!(
        nx = lattice.nx,
        ny = lattice.ny,
        solid_nodes = lattice.mask().number_of_solid_nodes(),
        streaming = ?lattice.kernel.streaming,
        solid_reflection = ?lattice.kernel.solid_reflection,
        "case ready"
    );
    let parameters = ParameterHandle::new(conditions.parameters());
    let setup_duration = setup_time.elapsed();
    let last = simulate(
        &mut simulation,
        &mut lattice,
        &parameters,
        benchmark.then_some(setup_duration),
    )?;
    info!(
        steps = lattice.generation(),
        elapsed = simulation.simulation_time.elapsed().as_secs_f64(),
        mean_density = post::compute_mean_density(&last)[0].value,
        "run finished"
    );
    Ok(())
}

/// Steps `lattice` until `simulation` says stop, reading `parameters` anew at
/// every step. With `benchmark` set, per-phase timings are appended to the
/// benchmark file.
pub fn simulate(
    simulation: &mut Simulation,
    lattice: &mut Lattice,
    parameters: &ParameterHandle,
    benchmark: Option<Duration>,
) -> CaseResult<ShallowLattice> {
    let mut old_lattice = lattice.generate_shallow_lattice();
    simulation.write_post_processing_from_each_n_steps(
        &old_lattice,
        1,
        post::compute_porosity,
        "porosity.dat",
    )?;
    let mut writer: Option<JoinHandle<()>> = None;
    let mut unstable = false;

    loop {
        let loop_time = Instant::now();

        let step_parameters = parameters.snapshot();
        let step_time = Instant::now();
        lattice.step(&step_parameters);
        let step_duration = step_time.elapsed();

        let gsl_time = Instant::now();
        let shallow_lattice = lattice.generate_shallow_lattice();
        let gsl_duration = gsl_time.elapsed();

        let cr_time = Instant::now();
        let residuals = shallow_lattice.compute_residuals(&old_lattice);
        let cr_duration = cr_time.elapsed();

        let non_finite = shallow_lattice.number_of_non_finite_nodes();
        if non_finite > 0 && !unstable {
            warn!(
                step = simulation.time_step,
                non_finite,
                tau = step_parameters.tau,
                u0 = step_parameters.u0,
                "lattice went unstable"
            );
        }
        unstable = non_finite > 0;

        let wr_time = Instant::now();
        for (function, file_name) in [
            (
                post::compute_mean_density as fn(&ShallowLattice) -> Vec<PostResult>,
                "mean_density.dat",
            ),
            (post::compute_mean_velocities, "mean_velocities.dat"),
            (post::compute_max_velocity, "max_velocity.dat"),
            (post::compute_total_mass, "total_mass.dat"),
            (post::compute_non_finite_nodes, "non_finite_nodes.dat"),
        ] {
            simulation.write_post_processing_from_each_n_steps(
                &shallow_lattice,
                1,
                function,
                file_name,
            )?;
        }
        if simulation.should_write_data() {
            if let Some(handle) = writer.take() {
                let _ = handle.join();
            }
            let simulation_clone = simulation.clone();
            let snapshot = shallow_lattice.clone();
            writer = Some(std::thread::spawn(move || {
                if let Err(e) = simulation_clone.write_data_from_steps(&snapshot) {
                    error!("error while writing the data files: {e}");
                }
            }));
        }
        let wr_duration = wr_time.elapsed();

        if simulation.stop_condition(&residuals) {
            if let Some(handle) = writer.take() {
                let _ = handle.join();
            }
            simulation.print_residuals(&residuals);
            simulation.write_residuals(&residuals)?;
            simulation.write_data_from_steps(&shallow_lattice)?;
            simulation.write_vtk_from_steps(&shallow_lattice)?;
            return Ok(shallow_lattice);
        }

        simulation.print_residuals(&residuals);
        simulation.write_residuals(&residuals)?;

        if let Some(setup_duration) = benchmark {
            let elapsed_times = [
                ("setup", setup_duration),
                ("step", step_duration),
                ("gsl", gsl_duration),
                ("cr", cr_duration),
                ("wr", wr_duration),
                ("loop", loop_time.elapsed()),
            ];
            debug!(step = simulation.time_step, ?elapsed_times, "step timings");
            crate::io::write_inside_loop_elapsed_time(
                &simulation.case_path,
                &elapsed_times,
                simulation.time_step,
            )?;
        }

        old_lattice = shallow_lattice;
        simulation.next_step();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_weights_sum_to_one() {
        assert_abs_diff_eq!(W.iter().sum::<Float>(), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_opposite_directions() {
        for q in 0..Q {
            assert_eq!(C[Q_BAR[q]][0], -C[q][0]);
            assert_eq!(C[Q_BAR[q]][1], -C[q][1]);
            assert_eq!(Q_BAR[Q_BAR[q]], q);
            assert_eq!(W[Q_BAR[q]], W[q]);
        }
    }

    #[test]
    fn test_equilibrium_conserves_mass_and_momentum() {
        let cases = [
            (1.0, [0.0, 0.0]),
            (1.0, [0.1, 0.0]),
            (0.93, [-0.05, 0.08]),
            (1.2, [0.12, -0.03]),
        ];
        for (rho, u) in cases {
            let f_eq = equilibrium(rho, u);
            let (density, velocity) = moments(&f_eq);
            assert_abs_diff_eq!(density, rho, epsilon = 1e-14);
            assert_abs_diff_eq!(velocity[0], u[0], epsilon = 1e-14);
            assert_abs_diff_eq!(velocity[1], u[1], epsilon = 1e-14);
        }
    }

    #[test]
    fn test_explicit_equilibrium_matches_generic() {
        let cases = [(1.0, [0.0, 0.0]), (0.97, [0.07, -0.02]), (1.1, [-0.1, 0.1])];
        for (rho, u) in cases {
            let generic = equilibrium(rho, u);
            let explicit = equilibrium_explicit(rho, u);
            for q in 0..Q {
                assert_abs_diff_eq!(generic[q], explicit[q], epsilon = 1e-15);
            }
        }
    }

    #[test]
    fn test_rest_equilibrium_is_weights() {
        let f_eq = equilibrium(2.0, [0.0, 0.0]);
        for q in 0..Q {
            assert_abs_diff_eq!(f_eq[q], 2.0 * W[q], epsilon = 1e-15);
        }
    }

    #[test]
    fn test_equilibrium_is_collision_fixed_point() {
        let f_eq = equilibrium(1.05, [0.04, -0.06]);
        for tau in [0.51, 0.6, 1.0, 1.7, 5.0] {
            let mut f = f_eq;
            collide(&mut f, &f_eq, tau);
            assert_eq!(f, f_eq);
        }
    }

    #[test]
    fn test_collision_with_unit_tau_lands_on_equilibrium() {
        let mut f = [0.1, 0.12, 0.08, 0.11, 0.09, 0.03, 0.02, 0.025, 0.035];
        let (rho, u) = moments(&f);
        let f_eq = equilibrium(rho, u);
        collide(&mut f, &f_eq, 1.0);
        for q in 0..Q {
            assert_abs_diff_eq!(f[q], f_eq[q], epsilon = 1e-15);
        }
    }

    #[test]
    fn test_reflect_reverses_every_direction() {
        let f_in = [0.4, 0.11, 0.12, 0.13, 0.14, 0.021, 0.022, 0.023, 0.024];
        let f_out = reflect(&f_in);
        for q in 0..Q {
            assert_eq!(f_out[q], f_in[Q_BAR[q]]);
        }
        let (_, velocity_in) = moments(&f_in);
        let (_, velocity_out) = moments(&f_out);
        assert_abs_diff_eq!(velocity_out[0], -velocity_in[0], epsilon = 1e-15);
        assert_abs_diff_eq!(velocity_out[1], -velocity_in[1], epsilon = 1e-15);
    }

    #[test]
    fn test_zero_density_gives_non_finite_velocity() {
        let (density, velocity) = moments(&[0.0; Q]);
        assert_eq!(density, 0.0);
        assert!(velocity[0].is_nan() && velocity[1].is_nan());
    }

    #[test]
    fn test_vorticity_of_solid_rotation() {
        let mut lattice = ShallowLattice::new(5, 5, 1.0, [0.0, 0.0]);
        for node in lattice.nodes.iter_mut() {
            let x = node.coordinates[0] - 2.5;
            let y = node.coordinates[1] - 2.5;
            node.velocity = [-0.01 * y, 0.01 * x];
        }
        assert_abs_diff_eq!(lattice.vorticity(2, 2), 0.02, epsilon = 1e-15);
        assert_abs_diff_eq!(lattice.vorticity(1, 3), 0.02, epsilon = 1e-15);
        assert_eq!(lattice.vorticity(0, 2), 0.0);
        assert_eq!(lattice.vorticity(2, 4), 0.0);
    }

    #[test]
    fn test_cell_samples() {
        let mut lattice = ShallowLattice::new(3, 3, 1.0, [0.03, 0.04]);
        lattice.get_node_mut(&[0, 0]).node_type = NodeType::Solid;
        lattice.get_node_mut(&[2, 2]).density = Float::NAN;
        assert_eq!(lattice.sample(0, 0), CellSample::Solid);
        assert_eq!(lattice.sample(2, 2), CellSample::NonFinite);
        match lattice.sample(1, 1) {
            CellSample::Fluid { speed, vorticity, .. } => {
                assert_abs_diff_eq!(speed, 0.05, epsilon = 1e-15);
                assert_eq!(vorticity, 0.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(lattice.number_of_non_finite_nodes(), 1);
    }

    #[test]
    fn test_residuals_of_identical_lattices_are_zero() {
        let lattice = ShallowLattice::new(4, 4, 1.0, [0.1, 0.0]);
        let residuals = lattice.compute_residuals(&lattice.clone());
        assert_eq!(residuals.density, 0.0);
        assert_eq!(residuals.velocity, [0.0, 0.0]);

        let mut changed = lattice.clone();
        changed.get_node_mut(&[1, 1]).velocity[1] = 0.3;
        changed.get_node_mut(&[2, 1]).velocity[1] = 0.4;
        let residuals = changed.compute_residuals(&lattice);
        assert_abs_diff_eq!(residuals.velocity[1], 0.5, epsilon = 1e-15);
    }

    #[test]
    fn test_stop_condition() {
        let mut simulation = Simulation::new(Path::new("."));
        simulation.min_iter = 10;
        simulation.max_iter = 100;
        let converged = Residuals {
            density: 0.0,
            velocity: [0.0, 0.0],
        };
        let moving = Residuals {
            density: 1.0,
            velocity: [1.0, 1.0],
        };
        assert!(!simulation.stop_condition(&converged));
        simulation.time_step = 10;
        assert!(simulation.stop_condition(&converged));
        assert!(!simulation.stop_condition(&moving));
        simulation.time_step = 99;
        assert!(simulation.stop_condition(&moving));
        simulation.time_step = 20;
        simulation.stop_handle().store(true, Ordering::Release);
        assert!(simulation.stop_condition(&moving));
    }
}
