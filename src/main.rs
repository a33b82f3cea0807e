use clap::{arg, command, value_parser, Command};
use colored::*;
use lbm_flow as lbm;
use rayon::ThreadPoolBuilder;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = command!()
        .arg(
            arg!(
                -n --number_of_threads <NUMBER_OF_THREADS> "Sets the number of threads"
            )
            .required(true)
            .value_parser(value_parser!(usize)),
        )
        .arg(
            arg!(
                -c --case <CASE> "Sets the case directory"
            )
            .required(false)
            .default_value(".")
            .value_parser(value_parser!(PathBuf)),
        )
        .subcommand(
            Command::new("run")
                .about("Runs the simulation")
                .arg(
                    arg!(
                        -b --benchmark "Writes the elapsed time of each phase"
                    )
                    .required(false),
                )
                .arg(
                    arg!(
                        -s --steps <STEPS> "Overrides max_iter"
                    )
                    .required(false)
                    .value_parser(value_parser!(usize)),
                ),
        )
        .subcommand(
            Command::new("post").about("Runs the post-processing: writes the vtk files"),
        )
        .get_matches();

    if let Some(&num_threads) = matches.get_one::<usize>("number_of_threads") {
        if let Err(e) = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
        {
            eprintln!("{} {e}.", "Error while building the thread pool:".red().bold());
            process::exit(1);
        }
    }

    let case_path = matches
        .get_one::<PathBuf>("case")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));

    let result = match matches.subcommand() {
        Some(("run", sub_matches)) => {
            let benchmark = sub_matches.get_flag("benchmark");
            let steps = sub_matches.get_one::<usize>("steps").copied();
            lbm::d2q9::run(&case_path, steps, benchmark)
        }
        Some(("post", _)) => lbm::d2q9::post::vtk::run_vtk_post_processing(&case_path),
        _ => {
            eprintln!("Nothing to do: use the `run` or `post` subcommand.");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {e}.", "Error:".red().bold());
        process::exit(1);
    }
}
