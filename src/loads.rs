use std::collections::BTreeMap;

use nalgebra::Vector3;

use crate::{
    datatypes::{NodalForceMap, SurfaceElement},
    error::GraniteError,
};

/// Force components at or below this magnitude are left out of the deck.
pub const FORCE_EPSILON: f64 = 1e-12;

/// The outcome of distributing one lumped force over a surface. The per-node
/// forces approximate a uniform pressure; area and pressure are kept for the
/// deck comments.
#[derive(Debug)]
pub struct DistributedLoad {
    pub nodal_forces: NodalForceMap,
    pub total_area: f64,
    pub pressure: f64,
}

fn triangle_area(p0: &[f64; 3], p1: &[f64; 3], p2: &[f64; 3]) -> f64 {
    let v1 = Vector3::new(p1[0] - p0[0], p1[1] - p0[1], p1[2] - p0[2]);
    let v2 = Vector3::new(p2[0] - p0[0], p2[1] - p0[1], p2[2] - p0[2]);

    0.5 * v1.cross(&v2).norm()
}

/// Computes the planar area of a surface element from its node coordinates
///
/// Triangles take half the cross product magnitude of two edge vectors;
/// quads sum the two triangles of their fan split; larger polygons fall
/// back to a fan triangulation from the first node, which assumes the
/// nodes are listed in perimeter order.
///
/// # Arguments
/// * `coordinates` - The element's node coordinates in file order
///
/// # Returns
/// The element area; zero for degenerate elements with fewer than 3 nodes
pub fn element_area(coordinates: &[[f64; 3]]) -> f64 {
    match coordinates.len() {
        n if n < 3 => 0.0,
        3 => triangle_area(&coordinates[0], &coordinates[1], &coordinates[2]),
        4 => {
            triangle_area(&coordinates[0], &coordinates[1], &coordinates[2])
                + triangle_area(&coordinates[0], &coordinates[2], &coordinates[3])
        }
        n => {
            let mut area = 0.0;
            for i in 1..n - 1 {
                area += triangle_area(&coordinates[0], &coordinates[i], &coordinates[i + 1]);
            }
            area
        }
    }
}

/// Distributes a lumped force across a surface as per-node point forces
///
/// Every element's area is split equally between its nodes, so a node
/// shared by several elements accumulates a share from each. The per-node
/// force is the uniform surface pressure times the node's accumulated
/// area, along the normalized direction.
///
/// # Arguments
/// * `elements` - The surface's elements
/// * `total_force` - The lumped force magnitude
/// * `direction` - The force direction; normalized here
///
/// # Returns
/// A DistributedLoad, or ZeroArea / ZeroDirection when the surface or the
/// direction is degenerate
pub fn distribute(
    elements: &[SurfaceElement],
    total_force: f64,
    direction: [f64; 3],
) -> Result<DistributedLoad, GraniteError> {
    let mut node_areas: BTreeMap<usize, f64> = BTreeMap::new();
    let mut total_area: f64 = 0.0;

    for element in elements {
        let area = element_area(&element.node_coordinates);
        total_area += area;

        if element.node_ids.is_empty() {
            continue;
        }

        let area_portion = area / element.node_ids.len() as f64;
        for node in &element.node_ids {
            *node_areas.entry(*node).or_insert(0.0) += area_portion;
        }
    }

    if total_area <= 0.0 {
        return Err(GraniteError::ZeroArea);
    }

    let pressure = total_force / total_area;

    let direction = Vector3::new(direction[0], direction[1], direction[2]);
    let magnitude = direction.norm();
    if magnitude <= 0.0 {
        return Err(GraniteError::ZeroDirection);
    }
    let unit = direction / magnitude;

    let mut nodal_forces: NodalForceMap = BTreeMap::new();
    for (node, node_area) in node_areas {
        let force_magnitude = pressure * node_area;
        nodal_forces.insert(
            node,
            [
                force_magnitude * unit.x,
                force_magnitude * unit.y,
                force_magnitude * unit.z,
            ],
        );
    }

    Ok(DistributedLoad {
        nodal_forces,
        total_area,
        pressure,
    })
}
