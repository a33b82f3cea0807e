use crate::d2q9::{ShallowLattice, D};
use crate::error::{CaseError, CaseResult};
use crate::global_variables::*;
use crate::io::{required, FILE_PARAMETERS};
use crate::NodeType;
use colored::*;
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Lattice size recorded in `post_processing/case_parameters.jou`.
pub struct CaseParameters {
    pub nx: usize,
    pub ny: usize,
    pub tau: Float,
    pub u0: Float,
}

impl CaseParameters {
    pub fn from_file(root: &Path) -> CaseResult<CaseParameters> {
        let parameters = crate::io::read_case_parameters(root)?;
        Ok(CaseParameters {
            nx: required(&parameters, "nx", FILE_PARAMETERS)?,
            ny: required(&parameters, "ny", FILE_PARAMETERS)?,
            tau: required(&parameters, "tau", FILE_PARAMETERS)?,
            u0: required(&parameters, "u0", FILE_PARAMETERS)?,
        })
    }
}

/// Parses the data lines of a column file, skipping its header line.
fn read_columns<const N: usize>(path: &Path, number_of_lines: usize) -> CaseResult<Vec<[Float; N]>> {
    let contents = fs::read_to_string(path)?;
    let name = path.display().to_string();
    let rows = contents
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let values = line
                .split_whitespace()
                .map(|token| {
                    token
                        .parse::<Float>()
                        .map_err(|e| CaseError::invalid(&name, token, e.to_string()))
                })
                .collect::<CaseResult<Vec<Float>>>()?;
            <[Float; N]>::try_from(values.as_slice())
                .map_err(|_| CaseError::invalid(&name, line, format!("expected {N} columns")))
        })
        .collect::<CaseResult<Vec<[Float; N]>>>()?;
    if rows.len() != number_of_lines {
        return Err(CaseError::invalid(
            &name,
            &rows.len().to_string(),
            format!("expected {number_of_lines} lines"),
        ));
    }
    Ok(rows)
}

impl ShallowLattice {
    /// Rebuilds the snapshot written at `time_step` under `root/data`.
    pub fn from_data(root: &Path, time_step: usize, nx: usize, ny: usize) -> CaseResult<Self> {
        let mut lattice = ShallowLattice::new(nx, ny, LATTICE_DENSITY, [0.0; D]);
        let step_path = root
            .join(crate::io::DATA_PATH)
            .join(time_step.to_string());
        let densities = read_columns::<1>(&step_path.join(crate::io::DENSITY_FILE), nx * ny)?;
        let velocities = read_columns::<D>(&step_path.join(crate::io::VELOCITY_FILE), nx * ny)?;
        lattice
            .nodes
            .iter_mut()
            .zip(densities.iter().zip(velocities.iter()))
            .for_each(|(node, (density, velocity))| {
                node.density = density[0];
                node.velocity = *velocity;
            });
        lattice.read_node_types(root)?;
        Ok(lattice)
    }

    /// Marks solid nodes from `data/map.dat`.
    fn read_node_types(&mut self, root: &Path) -> CaseResult<()> {
        let contents = fs::read_to_string(
            root.join(crate::io::DATA_PATH)
                .join(crate::io::OBSTACLE_MAP_FILE),
        )?;
        let map = crate::d2q9::io::parse_map(&contents)?;
        let rows = map.len();
        let columns = map.first().map_or(0, Vec::len);
        if rows != self.ny || map.iter().any(|row| row.len() != self.nx) {
            return Err(CaseError::MapShape {
                rows,
                columns,
                nx: self.nx,
                ny: self.ny,
            });
        }
        for node in self.nodes.iter_mut() {
            let [i, j] = node.index;
            if map[j][i] == NodeType::Solid as i32 {
                node.node_type = NodeType::Solid;
            }
        }
        Ok(())
    }
}

/// Legacy ASCII VTK structured grid with one point per cell centre.
pub fn write_vtk(lattice: &ShallowLattice, path: &Path) -> CaseResult<()> {
    let point_data = lattice.nx * lattice.ny;
    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "# vtk DataFile Version 3.0")?;
    writeln!(file, "LBM simulation data")?;
    writeln!(file, "ASCII")?;
    writeln!(file, "DATASET STRUCTURED_GRID")?;
    writeln!(file, "DIMENSIONS {} {} 1", lattice.nx, lattice.ny)?;
    writeln!(file, "POINTS {} float", point_data)?;
    for node in &lattice.nodes {
        writeln!(
            file,
            "{:>.6e} {:>.6e} 0.0",
            node.coordinates[0], node.coordinates[1]
        )?;
    }
    writeln!(file, "POINT_DATA {}", point_data)?;
    writeln!(file, "SCALARS density float 1")?;
    writeln!(file, "LOOKUP_TABLE default")?;
    for node in &lattice.nodes {
        writeln!(file, "{:>.6e}", node.density)?;
    }
    writeln!(file, "VECTORS velocity float")?;
    for node in &lattice.nodes {
        writeln!(file, "{:>.6e} {:>.6e} 0.0", node.velocity[0], node.velocity[1])?;
    }
    writeln!(file, "SCALARS speed float 1")?;
    writeln!(file, "LOOKUP_TABLE default")?;
    for node in &lattice.nodes {
        writeln!(file, "{:>.6e}", node.speed())?;
    }
    writeln!(file, "SCALARS vorticity float 1")?;
    writeln!(file, "LOOKUP_TABLE default")?;
    for node in &lattice.nodes {
        let [i, j] = node.index;
        writeln!(file, "{:>.6e}", lattice.vorticity(i, j))?;
    }
    writeln!(file, "SCALARS node_type int 1")?;
    writeln!(file, "LOOKUP_TABLE default")?;
    for node in &lattice.nodes {
        writeln!(file, "{}", node.node_type as i32)?;
    }
    file.flush()?;
    Ok(())
}

/// Time steps with a `data/<step>` directory, in increasing order.
pub fn read_data_directory(root: &Path) -> CaseResult<Vec<usize>> {
    let mut time_steps = Vec::new();
    for entry in fs::read_dir(root.join(crate::io::DATA_PATH))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Ok(time_step) = entry.file_name().to_string_lossy().parse::<usize>() {
                time_steps.push(time_step);
            }
        }
    }
    time_steps.sort_unstable();
    Ok(time_steps)
}

/// Writes one VTK file per saved time step.
pub fn run_vtk_post_processing(root: &Path) -> CaseResult<()> {
    let case_setup = crate::io::read_case_setup(root)?;
    let case_name = case_setup
        .get("case_name")
        .map_or(CASE_NAME, String::as_str)
        .replace(' ', "_")
        .to_lowercase();
    let case_parameters = CaseParameters::from_file(root)?;
    let time_steps = read_data_directory(root)?;
    info!(
        ?time_steps,
        tau = case_parameters.tau,
        u0 = case_parameters.u0,
        "rebuilding vtk files"
    );
    fs::create_dir_all(root.join(crate::io::VTK_PATH))?;
    time_steps.par_iter().try_for_each(|&time_step| {
        let lattice =
            ShallowLattice::from_data(root, time_step, case_parameters.nx, case_parameters.ny)?;
        let path_str = format!("{case_name}_{:08}.vtk", time_step);
        let path = root.join(crate::io::VTK_PATH).join(&path_str);
        println!(
            "Writing {} for time step {}.\n",
            path_str.yellow().bold(),
            time_step.to_string().yellow().bold()
        );
        write_vtk(&lattice, &path)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn scratch(name: &str) -> std::path::PathBuf {
        let root = env::temp_dir().join(format!("lbm_flow_vtk_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join(crate::io::DATA_PATH).join("7")).unwrap();
        root
    }

    #[test]
    fn test_from_data_reads_fields_and_node_types() {
        let root = scratch("from_data");
        let data = root.join(crate::io::DATA_PATH);
        fs::write(data.join("map.dat"), "0 1\n0 0\n").unwrap();
        fs::write(
            data.join("7").join("density.dat"),
            "density\n1.0\n1.1\n1.2\n1.3\n",
        )
        .unwrap();
        fs::write(
            data.join("7").join("velocity.dat"),
            "velocity_x velocity_y\n0.1 0.0\n0.2 0.0\n0.3 0.01\n0.0 0.0\n",
        )
        .unwrap();

        let lattice = ShallowLattice::from_data(&root, 7, 2, 2).unwrap();
        assert_eq!(lattice.get_node(&[1, 0]).density, 1.1);
        assert_eq!(lattice.get_node(&[0, 1]).velocity, [0.3, 0.01]);
        assert_eq!(lattice.get_node(&[1, 1]).node_type, NodeType::Solid);
        assert_eq!(lattice.get_node(&[0, 0]).node_type, NodeType::Fluid);
        assert_eq!(read_data_directory(&root).unwrap(), vec![7]);

        let vtk = root.join("out.vtk");
        write_vtk(&lattice, &vtk).unwrap();
        let contents = fs::read_to_string(&vtk).unwrap();
        assert!(contents.contains("DIMENSIONS 2 2 1"));
        assert!(contents.contains("SCALARS vorticity float 1"));
        assert!(contents.ends_with("0\n0\n0\n1\n"));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_truncated_data_is_an_error() {
        let root = scratch("truncated");
        let data = root.join(crate::io::DATA_PATH);
        fs::write(data.join("map.dat"), "0 0\n0 0\n").unwrap();
        fs::write(data.join("7").join("density.dat"), "density\n1.0\n").unwrap();
        fs::write(
            data.join("7").join("velocity.dat"),
            "velocity_x velocity_y\n0.1 0.0\n",
        )
        .unwrap();
        assert!(ShallowLattice::from_data(&root, 7, 2, 2).is_err());
        fs::remove_dir_all(&root).unwrap();
    }
}
