use super::bc::{BoundaryCondition, BoundaryFace, Boundaries, WallPolicy};
use super::geometry::{Empty, Polygon};
use super::kernel::{EquilibriumForm, KernelConfig, SolidReflection, StreamingMode};
use super::mask::ObstacleMask;
use super::params::Parameters;
use super::post::vtk;
use super::{Lattice, ShallowLattice, Simulation, D};
use crate::error::{CaseError, CaseResult};
use crate::global_variables::*;
use crate::io::{optional, FILE_CONDITIONS};
use crate::post::PostResult;
use crate::{NodeType, Residuals};
use colored::*;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

const DEFAULT_CASE_SETUP: &str = r#"case_name                        = Wing Tunnel

tolerance_density                = 1e-7
tolerance_velocity_x             = 1e-7
tolerance_velocity_y             = 1e-7

min_iter                         = 1000
max_iter                         = 20000

write_data_mode                  = frequency 500
"#;

const DEFAULT_CASE_CONDITIONS: &str = r#"nx                               = 256
ny                               = 128

tau                              = 0.6
u0                               = 0.1

initial_density                  = 1.0
initial_velocity                 = u0
zero_solid_cells                 = false

streaming                        = push
solid_reflection                 = self
equilibrium                      = explicit

west_boundary_condition          = fixed_velocity 1
east_boundary_condition          = fixed_velocity 1
south_boundary_condition         = no_slip
north_boundary_condition         = no_slip

obstacle                         = wing
"#;

/// Initial velocity of every fluid cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InitialVelocity {
    Value([Float; D]),
    /// `(U0, 0)` with the configured `u0`.
    FreeStream,
}

/// Where the obstacle mask comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum ObstacleSource {
    None,
    Wing,
    Polygon(Polygon),
    /// `pre_processing/map.dat`.
    Map,
}

impl ObstacleSource {
    fn parse(key: &str, value: &str) -> CaseResult<Self> {
        let mut parts = value.split_whitespace();
        match parts.next() {
            Some("none") => Ok(ObstacleSource::None),
            Some("wing") => Ok(ObstacleSource::Wing),
            Some("map") => Ok(ObstacleSource::Map),
            Some("polygon") => {
                let numbers = parts
                    .map(|token| {
                        token
                            .parse::<Float>()
                            .map_err(|e| CaseError::invalid(key, value, e.to_string()))
                    })
                    .collect::<CaseResult<Vec<Float>>>()?;
                if numbers.len() % 2 != 0 {
                    return Err(CaseError::invalid(key, value, "odd number of coordinates"));
                }
                let vertices = numbers.chunks(2).map(|xy| [xy[0], xy[1]]).collect();
                Ok(ObstacleSource::Polygon(Polygon::new(vertices)))
            }
            _ => Err(CaseError::invalid(
                key,
                value,
                "expected `none`, `wing`, `map` or `polygon x y ...`",
            )),
        }
    }
}

/// Everything `case_conditions.jou` describes.
#[derive(Clone, Debug, PartialEq)]
pub struct CaseConditions {
    pub nx: usize,
    pub ny: usize,
    pub tau: Float,
    pub u0: Float,
    pub initial_density: Float,
    pub initial_velocity: InitialVelocity,
    pub zero_solid_cells: bool,
    pub kernel: KernelConfig,
    pub boundaries: Boundaries,
    pub obstacle: ObstacleSource,
}

impl Default for CaseConditions {
    fn default() -> Self {
        Self {
            nx: NX,
            ny: NY,
            tau: TAU,
            u0: U0,
            initial_density: LATTICE_DENSITY,
            initial_velocity: InitialVelocity::FreeStream,
            zero_solid_cells: false,
            kernel: KernelConfig::default(),
            boundaries: Boundaries::wind_tunnel(WallPolicy::NoSlip),
            obstacle: ObstacleSource::Wing,
        }
    }
}

impl CaseConditions {
    pub fn initial_velocity(&self, u0: Float) -> [Float; D] {
        match self.initial_velocity {
            InitialVelocity::Value(velocity) => velocity,
            InitialVelocity::FreeStream => [u0, 0.0],
        }
    }

    pub fn parameters(&self) -> Parameters {
        Parameters::new(self.tau, self.u0)
    }

    pub fn from_parameters(parameters: &HashMap<String, String>) -> CaseResult<Self> {
        let mut conditions = CaseConditions::default();
        let file = FILE_CONDITIONS;
        conditions.nx = optional(parameters, "nx", file)?.unwrap_or(NX);
        conditions.ny = optional(parameters, "ny", file)?.unwrap_or(NY);
        conditions.tau = optional(parameters, "tau", file)?.unwrap_or(TAU);
        conditions.u0 = optional(parameters, "u0", file)?.unwrap_or(U0);
        conditions.initial_density =
            optional(parameters, "initial_density", file)?.unwrap_or(LATTICE_DENSITY);
        conditions.zero_solid_cells =
            optional(parameters, "zero_solid_cells", file)?.unwrap_or(false);

        if let Some(value) = parameters.get("initial_velocity") {
            conditions.initial_velocity = parse_initial_velocity(value)?;
        }
        if let Some(value) = parameters.get("streaming") {
            conditions.kernel.streaming = StreamingMode::parse("streaming", value)?;
        }
        if let Some(value) = parameters.get("solid_reflection") {
            conditions.kernel.solid_reflection =
                SolidReflection::parse("solid_reflection", value)?;
        }
        if let Some(value) = parameters.get("equilibrium") {
            conditions.kernel.equilibrium = EquilibriumForm::parse("equilibrium", value)?;
        }
        for face in BoundaryFace::ALL {
            let key = format!("{}_boundary_condition", face.name());
            if let Some(value) = parameters.get(&key) {
                let condition = BoundaryCondition::parse(&key, value)?;
                conditions.boundaries = conditions.boundaries.with(face, condition);
            }
        }
        if let Some(value) = parameters.get("obstacle") {
            conditions.obstacle = ObstacleSource::parse("obstacle", value)?;
        }
        conditions.validate()?;
        Ok(conditions)
    }

    pub fn validate(&self) -> CaseResult<()> {
        if self.nx == 0 {
            return Err(CaseError::invalid("nx", "0", "the lattice needs at least one column"));
        }
        if self.ny == 0 {
            return Err(CaseError::invalid("ny", "0", "the lattice needs at least one row"));
        }
        if !(self.tau > 0.0) {
            return Err(CaseError::invalid(
                "tau",
                &self.tau.to_string(),
                "relaxation time must be positive",
            ));
        }
        if !self.parameters().is_stable() {
            warn!(tau = self.tau, "relaxation time at or below 0.5, the run will go unstable");
        }
        self.boundaries.validate()
    }

    /// Reads `case_conditions.jou`, writing the default file first when the
    /// case has none.
    pub fn build(root: &Path) -> CaseResult<CaseConditions> {
        let path = root
            .join(crate::io::PRE_PROCESSING_PATH)
            .join(crate::io::CASE_CONDITIONS_FILE);
        if path.exists() {
            println!(
                "Reading the case conditions file: {}.\n",
                path.display().to_string().yellow().bold()
            );
        } else {
            println!(
                "Creating the default case conditions file: {}.\n",
                path.display().to_string().yellow().bold()
            );
            fs::write(&path, DEFAULT_CASE_CONDITIONS)?;
        }
        let parameters = crate::io::read_case_conditions(root)?;
        CaseConditions::from_parameters(&parameters)
    }

    pub fn build_obstacle_mask(&self, root: &Path) -> CaseResult<ObstacleMask> {
        let (nx, ny) = (self.nx, self.ny);
        let mask = match &self.obstacle {
            ObstacleSource::None => ObstacleMask::from_geometry(nx, ny, &Empty),
            ObstacleSource::Wing => ObstacleMask::from_geometry(nx, ny, &Polygon::wing(nx, ny)),
            ObstacleSource::Polygon(polygon) => ObstacleMask::from_geometry(nx, ny, polygon),
            ObstacleSource::Map => {
                let map = read_obstacle_map(root)?;
                let rows = map.len();
                let columns = map.first().map_or(0, Vec::len);
                if rows != ny || map.iter().any(|row| row.len() != nx) {
                    return Err(CaseError::MapShape {
                        rows,
                        columns,
                        nx,
                        ny,
                    });
                }
                ObstacleMask::from_map(&map, NodeType::Solid as i32)
            }
        };
        info!(
            obstacle = ?self.obstacle,
            solid_nodes = mask.number_of_solid_nodes(),
            "obstacle mask built"
        );
        Ok(mask)
    }

    pub fn write_case_parameters(&self, root: &Path) -> CaseResult<()> {
        let nx = self.nx;
        let ny = self.ny;
        let tau = self.tau;
        let u0 = self.u0;
        let viscosity = self.parameters().viscosity();
        let case_parameters_str = format!(
            r#"nx                               = {nx}
ny                               = {ny}

tau                              = {tau:.8e}
u0                               = {u0:.8e}

viscosity                        = {viscosity:.8e}"#
        );
        let path = root
            .join(crate::io::POST_PROCESSING_PATH)
            .join(crate::io::CASE_PARAMETERS_FILE);
        println!(
            "Writing the case parameters file: {}.\n",
            path.display().to_string().yellow().bold()
        );
        let mut file = File::create(path)?;
        writeln!(file, "{}", case_parameters_str)?;
        Ok(())
    }
}

fn parse_initial_velocity(value: &str) -> CaseResult<InitialVelocity> {
    let key = "initial_velocity";
    if value == "u0" {
        return Ok(InitialVelocity::FreeStream);
    }
    let components = value
        .split_whitespace()
        .map(|token| {
            token
                .parse::<Float>()
                .map_err(|e| CaseError::invalid(key, value, e.to_string()))
        })
        .collect::<CaseResult<Vec<Float>>>()?;
    match components.as_slice() {
        &[ux, uy] => Ok(InitialVelocity::Value([ux, uy])),
        _ => Err(CaseError::invalid(key, value, "expected `ux uy` or `u0`")),
    }
}

/// Reads `pre_processing/map.dat` as `map[j][i]`. The file lists the top row
/// of the domain first.
pub fn read_obstacle_map(root: &Path) -> CaseResult<Vec<Vec<i32>>> {
    let path = root
        .join(crate::io::PRE_PROCESSING_PATH)
        .join(crate::io::OBSTACLE_MAP_FILE);
    let contents = fs::read_to_string(path)?;
    parse_map(&contents)
}

pub fn parse_map(contents: &str) -> CaseResult<Vec<Vec<i32>>> {
    let mut map = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.split_whitespace()
                .map(|value| {
                    value
                        .parse::<i32>()
                        .map_err(|e| CaseError::invalid("map", value, e.to_string()))
                })
                .collect::<CaseResult<Vec<i32>>>()
        })
        .collect::<CaseResult<Vec<Vec<i32>>>>()?;
    map.reverse();
    Ok(map)
}

impl Simulation {
    pub fn build_case_setup(root: &Path) -> CaseResult<Simulation> {
        crate::io::create_case_directories(root)?;
        let path = root
            .join(crate::io::PRE_PROCESSING_PATH)
            .join(crate::io::CASE_SETUP_FILE);
        if path.exists() {
            println!(
                "Reading the case setup file: {}.\n",
                path.display().to_string().yellow().bold()
            );
        } else {
            println!(
                "Creating the default case setup file: {}.\n",
                path.display().to_string().yellow().bold()
            );
            fs::write(&path, DEFAULT_CASE_SETUP)?;
        }
        let parameters = crate::io::read_case_setup(root)?;
        let simulation = Simulation::from_setup(root, &parameters)?;
        simulation.create_script_for_residuals_graph()?;
        Ok(simulation)
    }

    pub fn should_write_data(&self) -> bool {
        self.write_data_mode.includes(self.time_step)
    }

    pub fn print_residuals(&self, residuals: &Residuals) {
        if self.time_step % 100 == 0 {
            let duration = self.simulation_time.elapsed().as_secs_f64();
            println!("\n{} {:.2} s.", "Elapsed time:".cyan().bold(), duration);
            println!(
                "\n{:>8} {:>16} {:>16} {:>16}\n",
                "step".cyan().bold(),
                "density".cyan().bold(),
                "velocity_x".cyan().bold(),
                "velocity_y".cyan().bold(),
            );
        }
        println!(
            "{:>8} {:>16.8e} {:>16.8e} {:>16.8e}",
            self.time_step, residuals.density, residuals.velocity[0], residuals.velocity[1],
        );
    }

    pub fn write_residuals(&self, residuals: &Residuals) -> CaseResult<()> {
        let path = self
            .case_path
            .join(crate::io::DATA_PATH)
            .join(crate::io::RESIDUALS_FILE);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if self.time_step == 0 {
            writeln!(
                file,
                "{:>8} {:>16} {:>16} {:>16}",
                "step", "density", "velocity_x", "velocity_y"
            )?;
        }
        writeln!(
            file,
            "{:>8} {:>16.8e} {:>16.8e} {:>16.8e}",
            self.time_step, residuals.density, residuals.velocity[0], residuals.velocity[1],
        )?;
        Ok(())
    }

    /// Appends the results of `function` to `post_processing/<file_name>`
    /// every `n` steps.
    pub fn write_post_processing_from_each_n_steps<F>(
        &self,
        lattice: &ShallowLattice,
        n: usize,
        function: F,
        file_name: &str,
    ) -> CaseResult<()>
    where
        F: Fn(&ShallowLattice) -> Vec<PostResult>,
    {
        if self.time_step % n == 0 {
            let post_results = function(lattice);
            let path = self
                .case_path
                .join(crate::io::POST_PROCESSING_PATH)
                .join(file_name);
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            if self.time_step == 0 {
                write!(file, "{:>8}", "step")?;
                for post_result in &post_results {
                    write!(file, " {:>16}", post_result.name)?;
                }
                writeln!(file)?;
            }
            write!(file, "{:>8}", self.time_step)?;
            for post_result in &post_results {
                write!(file, " {:>16.8e}", post_result.value)?;
            }
            writeln!(file)?;
        }
        Ok(())
    }

    fn create_script_for_residuals_graph(&self) -> CaseResult<()> {
        let path = self
            .case_path
            .join(crate::io::POST_PROCESSING_PATH)
            .join(crate::io::RESIDUALS_GRAPH_FILE);
        let mut file = File::create(&path)?;
        println!(
            "Creating the residuals graph script file: {}.\n",
            path.display().to_string().yellow().bold()
        );
        writeln!(
            file,
            r#"set title "{case_name}"
set ylabel "Residuals"
set xlabel "Iterations"
set grid
set logscale y
set yrange [{min_tolerance}:]
set ytics format "%L"
set terminal push
set terminal pngcairo font "courier"
set output "fig_{case_name_prefix}_residuals.png"
plot "../data/residuals.dat" u 1:2 t "density" w l,\
"" u 1:3 t "velocity (x)" w l,\
"" u 1:4 t "velocity (y)" w l
set terminal pop
set output"#,
            case_name = self.case_name,
            min_tolerance = self.tolerance_density,
            case_name_prefix = self.case_name_prefix(),
        )?;
        Ok(())
    }

    pub fn case_name_prefix(&self) -> String {
        self.case_name.replace(' ', "_").to_lowercase()
    }

    pub fn write_data_from_steps(&self, lattice: &ShallowLattice) -> CaseResult<()> {
        let step_path = self
            .case_path
            .join(crate::io::DATA_PATH)
            .join(self.time_step.to_string());
        fs::create_dir_all(&step_path)?;
        println!(
            "\nWriting {} and {} for time step {}.\n",
            crate::io::DENSITY_FILE.yellow().bold(),
            crate::io::VELOCITY_FILE.yellow().bold(),
            self.time_step.to_string().yellow().bold()
        );
        write_density(lattice, &step_path.join(crate::io::DENSITY_FILE))?;
        write_velocity(lattice, &step_path.join(crate::io::VELOCITY_FILE))?;
        Ok(())
    }

    pub fn write_vtk_from_steps(&self, lattice: &ShallowLattice) -> CaseResult<()> {
        let path_str = format!("{}_results_{:08}.vtk", self.case_name_prefix(), self.time_step);
        let path = self.case_path.join(crate::io::VTK_PATH).join(&path_str);
        println!(
            "\nWriting {} for time step {}.\n",
            path_str.yellow().bold(),
            self.time_step.to_string().yellow().bold()
        );
        vtk::write_vtk(lattice, &path)
    }
}

impl Lattice {
    pub fn write_coordinates(&self, root: &Path) -> CaseResult<()> {
        let path = root
            .join(crate::io::DATA_PATH)
            .join(crate::io::COORDINATES_FILE);
        println!("Writing {}.\n", crate::io::COORDINATES_FILE.yellow().bold());
        let mut file = BufWriter::new(File::create(path)?);
        writeln!(file, "{:>8} {:>8} {:>16} {:>16}", "i", "j", "x", "y")?;
        for j in 0..self.ny {
            for i in 0..self.nx {
                let (x, y) = (i as Float + 0.5, j as Float + 0.5);
                writeln!(file, "{i:>8} {j:>8} {x:>16.8e} {y:>16.8e}")?;
            }
        }
        file.flush()?;
        Ok(())
    }

    /// Writes the node types in the `map.dat` layout, top row first.
    pub fn write_map(&self, root: &Path) -> CaseResult<()> {
        let path = root
            .join(crate::io::DATA_PATH)
            .join(crate::io::OBSTACLE_MAP_FILE);
        println!("Writing {}.\n", crate::io::OBSTACLE_MAP_FILE.yellow().bold());
        let mut file = BufWriter::new(File::create(path)?);
        for j in (0..self.ny).rev() {
            let row = (0..self.nx)
                .map(|i| (self.node_type(i, j) as i32).to_string())
                .collect::<Vec<String>>()
                .join(" ");
            writeln!(file, "{row}")?;
        }
        file.flush()?;
        Ok(())
    }
}

fn write_density(lattice: &ShallowLattice, path: &Path) -> CaseResult<()> {
    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "{:>16}", "density")?;
    for node in &lattice.nodes {
        writeln!(file, "{density:>16.8e}", density = node.density)?;
    }
    file.flush()?;
    Ok(())
}

fn write_velocity(lattice: &ShallowLattice, path: &Path) -> CaseResult<()> {
    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "{:>16} {:>16}", "velocity_x", "velocity_y")?;
    for node in &lattice.nodes {
        writeln!(
            file,
            "{velocity_x:>16.8e} {velocity_y:>16.8e}",
            velocity_x = node.velocity[0],
            velocity_y = node.velocity[1],
        )?;
    }
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::extract_parameters;

    #[test]
    fn test_default_conditions_file_parses() {
        let conditions =
            CaseConditions::from_parameters(&extract_parameters(DEFAULT_CASE_CONDITIONS)).unwrap();
        assert_eq!((conditions.nx, conditions.ny), (256, 128));
        assert_eq!(conditions.initial_velocity, InitialVelocity::FreeStream);
        assert_eq!(conditions.initial_velocity(0.05), [0.05, 0.0]);
        assert_eq!(conditions.kernel, KernelConfig::default());
        assert_eq!(conditions.boundaries, Boundaries::wind_tunnel(WallPolicy::NoSlip));
        assert_eq!(conditions.obstacle, ObstacleSource::Wing);
    }

    #[test]
    fn test_conditions_overrides() {
        let parameters = extract_parameters(
            r#"nx = 32
ny = 16
initial_velocity = 0.02 -0.01
streaming = pull
solid_reflection = neighbor
equilibrium = generic
west_boundary_condition = periodic
east_boundary_condition = periodic
south_boundary_condition = bounce_back
obstacle = polygon 4 4 10 4 10 8"#,
        );
        let conditions = CaseConditions::from_parameters(&parameters).unwrap();
        assert_eq!(conditions.initial_velocity(0.1), [0.02, -0.01]);
        assert_eq!(conditions.kernel.streaming, StreamingMode::Pull);
        assert_eq!(conditions.kernel.solid_reflection, SolidReflection::NeighborPull);
        assert_eq!(conditions.kernel.equilibrium, EquilibriumForm::Generic);
        assert_eq!(conditions.boundaries.west, BoundaryCondition::Periodic);
        assert_eq!(
            conditions.boundaries.south,
            BoundaryCondition::Wall(WallPolicy::BounceBack)
        );
        assert_eq!(
            conditions.boundaries.north,
            BoundaryCondition::Wall(WallPolicy::NoSlip)
        );
        assert_eq!(
            conditions.obstacle,
            ObstacleSource::Polygon(Polygon::new(vec![[4.0, 4.0], [10.0, 4.0], [10.0, 8.0]]))
        );
    }

    #[test]
    fn test_invalid_conditions_are_rejected() {
        let reject = |contents: &str| {
            CaseConditions::from_parameters(&extract_parameters(contents)).is_err()
        };
        assert!(reject("nx = 0"));
        assert!(reject("ny = -3"));
        assert!(reject("tau = 0"));
        assert!(reject("tau = -1.0"));
        assert!(reject("initial_velocity = 0.1"));
        assert!(reject("streaming = sideways"));
        assert!(reject("obstacle = polygon 1 2 3"));
        assert!(reject("obstacle = circle"));
        assert!(reject("west_boundary_condition = periodic"));
        assert!(!reject("tau = 0.5"));
    }

    #[test]
    fn test_parse_map_reverses_rows() {
        let map = parse_map("1 1 0\n0 0 0\n").unwrap();
        assert_eq!(map, vec![vec![0, 0, 0], vec![1, 1, 0]]);
        assert!(parse_map("0 x").is_err());
        let mask = ObstacleMask::from_map(&map, 1);
        assert!(mask.is_solid(3) && mask.is_solid(4) && !mask.is_solid(0));
    }
}
