use crate::error::{CaseError, CaseResult};
use colored::*;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DATA_PATH: &str = "data";

pub const PRE_PROCESSING_PATH: &str = "pre_processing";

pub const POST_PROCESSING_PATH: &str = "post_processing";

pub const VTK_PATH: &str = "post_processing/vtk_files";

pub const CASE_SETUP_FILE: &str = "case_setup.jou";

pub const CASE_CONDITIONS_FILE: &str = "case_conditions.jou";

pub const CASE_PARAMETERS_FILE: &str = "case_parameters.jou";

pub const COORDINATES_FILE: &str = "coordinates.dat";

pub const DENSITY_FILE: &str = "density.dat";

pub const VELOCITY_FILE: &str = "velocity.dat";

pub const RESIDUALS_FILE: &str = "residuals.dat";

pub const OBSTACLE_MAP_FILE: &str = "map.dat";

pub const RESIDUALS_GRAPH_FILE: &str = "gr_residuals.gp";

pub const BENCHMARK_FILE: &str = "benchmark_elapsed_time.dat";

/// Names used in error messages for keys read from each case file.
pub const FILE_SETUP: &str = "case_setup.jou";

pub const FILE_CONDITIONS: &str = "case_conditions.jou";

pub const FILE_PARAMETERS: &str = "case_parameters.jou";

/// Which time steps get their fields written to `data/<step>/`.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteDataMode {
    Frequency(usize),

    ListOfSteps(Vec<usize>),
}

impl WriteDataMode {
    /// Parses `frequency N` or `list a b c`.
    pub fn parse(value: &str) -> CaseResult<Self> {
        let key = "write_data_mode";
        let mut parts = value.split_whitespace();
        let number = |token: &str| {
            token
                .parse::<usize>()
                .map_err(|e| CaseError::invalid(key, value, e.to_string()))
        };
        match parts.next() {
            Some("frequency") => {
                let token = parts
                    .next()
                    .ok_or_else(|| CaseError::invalid(key, value, "missing frequency"))?;
                let n = number(token)?;
                if n == 0 {
                    return Err(CaseError::invalid(key, value, "frequency must be positive"));
                }
                Ok(WriteDataMode::Frequency(n))
            }
            Some("list") => {
                let steps = parts.map(number).collect::<CaseResult<Vec<usize>>>()?;
                Ok(WriteDataMode::ListOfSteps(steps))
            }
            _ => Err(CaseError::invalid(key, value, "expected `frequency N` or `list ...`")),
        }
    }

    pub fn includes(&self, time_step: usize) -> bool {
        match self {
            WriteDataMode::Frequency(n) => time_step % n == 0,
            WriteDataMode::ListOfSteps(list) => time_step == 0 || list.contains(&time_step),
        }
    }
}

pub fn create_case_directories(root: &Path) -> CaseResult<()> {
    let list_of_paths = [
        DATA_PATH,
        PRE_PROCESSING_PATH,
        POST_PROCESSING_PATH,
        VTK_PATH,
    ];
    for path_str in list_of_paths {
        let path = root.join(path_str);
        if !path.exists() {
            println!("Creating the {} path.\n", path_str.yellow().bold());
            fs::create_dir_all(&path)?;
        }
    }
    Ok(())
}

fn read_parameters(path: &Path) -> CaseResult<HashMap<String, String>> {
    let contents = fs::read_to_string(path)?;
    Ok(extract_parameters(&contents))
}

pub fn read_case_setup(root: &Path) -> CaseResult<HashMap<String, String>> {
    read_parameters(&root.join(PRE_PROCESSING_PATH).join(CASE_SETUP_FILE))
}

pub fn read_case_conditions(root: &Path) -> CaseResult<HashMap<String, String>> {
    read_parameters(&root.join(PRE_PROCESSING_PATH).join(CASE_CONDITIONS_FILE))
}

pub fn read_case_parameters(root: &Path) -> CaseResult<HashMap<String, String>> {
    read_parameters(&root.join(POST_PROCESSING_PATH).join(CASE_PARAMETERS_FILE))
}

/// Splits `key = value` lines, skipping blanks and `#` comments.
pub fn extract_parameters(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (key, value) = line.split_once('=').unwrap_or((line, ""));
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect::<HashMap<String, String>>()
}

/// Parses `key` if present.
pub fn optional<T>(
    parameters: &HashMap<String, String>,
    key: &str,
    file: &'static str,
) -> CaseResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match parameters.get(key) {
        None => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| CaseError::invalid(&format!("{key} ({file})"), value, e.to_string())),
    }
}

pub fn required<T>(
    parameters: &HashMap<String, String>,
    key: &str,
    file: &'static str,
) -> CaseResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional(parameters, key, file)?.ok_or_else(|| CaseError::MissingKey {
        key: key.to_string(),
        file,
    })
}

pub fn write_inside_loop_elapsed_time(
    root: &Path,
    elapsed_times: &[(&str, Duration)],
    time_step: usize,
) -> CaseResult<()> {
    let path = root.join(POST_PROCESSING_PATH).join(BENCHMARK_FILE);
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if time_step == 0 {
        write!(file, "{:>8}", "step")?;
        for (key, _) in elapsed_times {
            write!(file, " {:>16}", key)?;
        }
        writeln!(file)?;
    }
    write!(file, "{:>8}", time_step)?;
    for (_, value) in elapsed_times {
        write!(file, " {:>16.8e}", value.as_secs_f64())?;
    }
    writeln!(file)?;
    Ok(())
}
