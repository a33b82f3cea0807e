pub mod vtk;

use super::*;
use crate::global_variables::*;
use crate::post::PostResult;
use rayon::prelude::*;

fn fluid_nodes<'a>(lattice: &'a ShallowLattice) -> impl ParallelIterator<Item = &'a ShallowNode> {
    lattice
        .nodes
        .par_iter()
        .filter(|node| node.node_type == NodeType::Fluid)
}

fn number_of_fluid_nodes(lattice: &ShallowLattice) -> Float {
    fluid_nodes(lattice).count() as Float
}

pub fn compute_mean_velocities(lattice: &ShallowLattice) -> Vec<PostResult> {
    let ux_sum = fluid_nodes(lattice)
        .map(|node| node.velocity[0])
        .sum::<Float>();
    let uy_sum = fluid_nodes(lattice)
        .map(|node| node.velocity[1])
        .sum::<Float>();
    let u_sum = fluid_nodes(lattice).map(ShallowNode::speed).sum::<Float>();
    let number_of_fluid_nodes = number_of_fluid_nodes(lattice);
    vec![
        PostResult::lattice(
            "mean_velocity",
            "mean velocity (magnitude)",
            u_sum / number_of_fluid_nodes,
        ),
        PostResult::lattice(
            "mean_velocity_x",
            "mean velocity (x)",
            ux_sum / number_of_fluid_nodes,
        ),
        PostResult::lattice(
            "mean_velocity_y",
            "mean velocity (y)",
            uy_sum / number_of_fluid_nodes,
        ),
    ]
}

pub fn compute_mean_density(lattice: &ShallowLattice) -> Vec<PostResult> {
    let rho_sum = fluid_nodes(lattice).map(|node| node.density).sum::<Float>();
    let rho_mean = rho_sum / number_of_fluid_nodes(lattice);
    vec![PostResult::lattice("mean_density", "mean density", rho_mean)]
}

pub fn compute_porosity(lattice: &ShallowLattice) -> Vec<PostResult> {
    let number_of_fluid_nodes = number_of_fluid_nodes(lattice);
    let number_of_solid_nodes = lattice.nodes.len() as Float - number_of_fluid_nodes;
    let porosity = number_of_fluid_nodes / (number_of_fluid_nodes + number_of_solid_nodes);
    vec![
        PostResult::plain(
            "n_solid_nodes",
            "number of solid nodes",
            number_of_solid_nodes,
        ),
        PostResult::plain(
            "n_fluid_nodes",
            "number of fluid nodes",
            number_of_fluid_nodes,
        ),
        PostResult::plain("porosity", "porosity", porosity),
    ]
}

/// Largest finite speed over the fluid nodes.
pub fn compute_max_velocity(lattice: &ShallowLattice) -> Vec<PostResult> {
    let max_velocity = fluid_nodes(lattice)
        .map(ShallowNode::speed)
        .filter(|speed| speed.is_finite())
        .reduce_with(|a, b| a.max(b))
        .unwrap_or(0.0);
    vec![PostResult::lattice(
        "max_velocity",
        "maximum velocity",
        max_velocity,
    )]
}

/// Sum of the densities of every node, solids included.
pub fn compute_total_mass(lattice: &ShallowLattice) -> Vec<PostResult> {
    let total_mass = lattice
        .nodes
        .par_iter()
        .map(|node| node.density)
        .sum::<Float>();
    vec![PostResult::lattice("total_mass", "total mass", total_mass)]
}

pub fn compute_non_finite_nodes(lattice: &ShallowLattice) -> Vec<PostResult> {
    vec![PostResult::plain(
        "n_non_finite",
        "number of non-finite fluid nodes",
        lattice.number_of_non_finite_nodes() as Float,
    )]
}
