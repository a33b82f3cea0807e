use lbm_flow::d2q9::io::CaseConditions;
use lbm_flow::d2q9::*;
use lbm_flow::io::{DATA_PATH, POST_PROCESSING_PATH, PRE_PROCESSING_PATH, VTK_PATH};
use lbm_flow::CaseError;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

fn scratch(name: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("lbm_flow_case_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&root);
    fs::create_dir_all(root.join(PRE_PROCESSING_PATH)).unwrap();
    root
}

const SMALL_CASE: &str = r#"nx                               = 24
ny                               = 12
tau                              = 0.7
u0                               = 0.05
obstacle                         = polygon 8 5 14 5 14 7
"#;

const SMALL_SETUP: &str = r#"case_name                        = Small Tunnel
min_iter                         = 5
max_iter                         = 11
write_data_mode                  = frequency 5
"#;

#[test]
fn run_writes_case_files_and_post_rebuilds_vtk() {
    let root = scratch("run");
    fs::write(root.join(PRE_PROCESSING_PATH).join("case_conditions.jou"), SMALL_CASE).unwrap();
    fs::write(root.join(PRE_PROCESSING_PATH).join("case_setup.jou"), SMALL_SETUP).unwrap();

    run(&root, None, true).unwrap();

    let data = root.join(DATA_PATH);
    let post_processing = root.join(POST_PROCESSING_PATH);
    for file in ["coordinates.dat", "map.dat", "residuals.dat"] {
        assert!(data.join(file).exists(), "missing {file}");
    }
    for step in ["0", "5", "10"] {
        assert!(data.join(step).join("density.dat").exists());
        assert!(data.join(step).join("velocity.dat").exists());
    }
    for file in [
        "case_parameters.jou",
        "mean_density.dat",
        "mean_velocities.dat",
        "max_velocity.dat",
        "total_mass.dat",
        "porosity.dat",
        "non_finite_nodes.dat",
        "gr_residuals.gp",
        "benchmark_elapsed_time.dat",
    ] {
        assert!(post_processing.join(file).exists(), "missing {file}");
    }
    assert!(root
        .join(VTK_PATH)
        .join("small_tunnel_results_00000010.vtk")
        .exists());

    let map = fs::read_to_string(data.join("map.dat")).unwrap();
    assert_eq!(map.lines().count(), 12);
    assert!(map.lines().all(|line| line.split_whitespace().count() == 24));
    assert!(map.contains('1'));

    let residual_lines = fs::read_to_string(data.join("residuals.dat"))
        .unwrap()
        .lines()
        .count();
    assert_eq!(residual_lines, 1 + 11);

    post::vtk::run_vtk_post_processing(&root).unwrap();
    for step in [0, 5, 10] {
        let path = root
            .join(VTK_PATH)
            .join(format!("small_tunnel_{:08}.vtk", step));
        let contents = fs::read_to_string(path).unwrap();
        assert!(contents.contains("DIMENSIONS 24 12 1"));
        assert!(contents.contains("SCALARS node_type int 1"));
    }

    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn missing_case_files_are_created_with_defaults() {
    let root = scratch("defaults");
    let simulation = Simulation::build_case_setup(&root).unwrap();
    assert_eq!(simulation.case_name, "Wing Tunnel");
    let conditions = CaseConditions::build(&root).unwrap();
    assert_eq!(conditions, CaseConditions::default());
    assert!(root.join(PRE_PROCESSING_PATH).join("case_setup.jou").exists());
    assert!(root
        .join(PRE_PROCESSING_PATH)
        .join("case_conditions.jou")
        .exists());
    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn obstacle_map_must_match_the_lattice() {
    let root = scratch("map");
    fs::write(
        root.join(PRE_PROCESSING_PATH).join("case_conditions.jou"),
        "nx = 4\nny = 3\nobstacle = map\n",
    )
    .unwrap();
    fs::write(
        root.join(PRE_PROCESSING_PATH).join("map.dat"),
        "0 0 0 0\n0 1 1 0\n0 0 0 0\n",
    )
    .unwrap();
    let conditions = CaseConditions::build(&root).unwrap();
    let mask = conditions.build_obstacle_mask(&root).unwrap();
    assert_eq!(mask.number_of_solid_nodes(), 2);
    assert!(mask.is_solid(4 + 1) && mask.is_solid(4 + 2));

    fs::write(
        root.join(PRE_PROCESSING_PATH).join("map.dat"),
        "0 0 0\n0 1 0\n",
    )
    .unwrap();
    match conditions.build_obstacle_mask(&root) {
        Err(CaseError::MapShape { rows, columns, .. }) => assert_eq!((rows, columns), (2, 3)),
        other => panic!("unexpected {other:?}"),
    }
    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn stop_request_ends_the_run_at_the_next_step() {
    let root = scratch("stop");
    let mut simulation = Simulation::build_case_setup(&root).unwrap();
    let mut lattice = Lattice::uniform(
        ObstacleMask::empty(16, 8),
        Boundaries::wind_tunnel(WallPolicy::BounceBack),
        KernelConfig::default(),
        1.0,
        [0.05, 0.0],
        false,
    );
    simulation.stop_handle().store(true, Ordering::Release);
    let parameters = ParameterHandle::new(Parameters::new(0.7, 0.05));
    let last = simulate(&mut simulation, &mut lattice, &parameters, None).unwrap();
    assert_eq!(simulation.time_step, 0);
    assert_eq!(lattice.generation(), 1);
    assert_eq!(last.nodes.len(), 16 * 8);
    fs::remove_dir_all(&root).unwrap();
}
