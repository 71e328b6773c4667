use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use indicatif::ProgressBar;
use log::{debug, error, info, warn};

use crate::{
    datatypes::{SimulationJob, SurfaceElement},
    error::GraniteError,
};

enum MeshParseState {
    Nodes,
    Elements,
    Entities,
    Limbo,
}

/// The second-order mesh produced by Gmsh, reduced to what the solver deck
/// needs: every node coordinate and the surface elements grouped by the
/// geometric surface they discretize. Node ids are the 1-based tags from the
/// mesh file, matching the ids the solver deck references.
#[derive(Debug)]
pub struct Mesh {
    node_coordinates: HashMap<usize, [f64; 3]>,
    surfaces: BTreeMap<i32, Vec<Vec<usize>>>,
}

impl Mesh {
    pub(crate) fn new(
        node_coordinates: HashMap<usize, [f64; 3]>,
        surfaces: BTreeMap<i32, Vec<Vec<usize>>>,
    ) -> Self {
        Mesh {
            node_coordinates,
            surfaces,
        }
    }

    /// Checks whether a geometric surface produced any mesh elements
    pub fn surface_exists(&self, surface_id: i32) -> bool {
        self.surfaces.contains_key(&surface_id)
    }

    /// All surface ids present in the mesh, in ascending order
    pub fn surface_ids(&self) -> Vec<i32> {
        self.surfaces.keys().copied().collect()
    }

    /// Resolves the elements of a surface into node ids plus coordinates
    ///
    /// # Arguments
    /// * `surface_id` - The geometric surface tag from the CAD model
    ///
    /// # Returns
    /// One SurfaceElement per mesh element on the surface
    pub fn surface_elements(&self, surface_id: i32) -> Result<Vec<SurfaceElement>, GraniteError> {
        let connectivity = self.surfaces.get(&surface_id).ok_or_else(|| {
            GraniteError::Mesher(format!("surface {surface_id} is not in the mesh"))
        })?;

        let mut elements = Vec::with_capacity(connectivity.len());
        for node_ids in connectivity {
            let mut node_coordinates = Vec::with_capacity(node_ids.len());
            for node_id in node_ids {
                let coordinate = self.node_coordinates.get(node_id).ok_or_else(|| {
                    GraniteError::Mesher(format!(
                        "surface {surface_id} references unknown node {node_id}"
                    ))
                })?;
                node_coordinates.push(*coordinate);
            }
            elements.push(SurfaceElement {
                node_ids: node_ids.clone(),
                node_coordinates,
            });
        }

        Ok(elements)
    }

    /// The unique node ids on a surface, in ascending order
    ///
    /// # Arguments
    /// * `surface_id` - The geometric surface tag from the CAD model
    pub fn surface_nodes(&self, surface_id: i32) -> Result<Vec<usize>, GraniteError> {
        let connectivity = self.surfaces.get(&surface_id).ok_or_else(|| {
            GraniteError::Mesher(format!("surface {surface_id} is not in the mesh"))
        })?;

        let unique: BTreeSet<usize> = connectivity.iter().flatten().copied().collect();
        Ok(unique.into_iter().collect())
    }
}

/// Maps a Gmsh element type to its node count, for the surface types that
/// can appear on a meshed CAD face. Returns None for unsupported types.
fn element_node_count(element_type: usize) -> Option<usize> {
    match element_type {
        2 => Some(3),  // 3-node triangle
        3 => Some(4),  // 4-node quadrangle
        9 => Some(6),  // 6-node second order triangle
        10 => Some(9), // 9-node second order quadrangle
        16 => Some(8), // 8-node second order quadrangle
        _ => None,
    }
}

/// Builds the Gmsh script that meshes the step geometry
///
/// # Arguments
/// * `job` - The simulation job holding the geometry and mesh settings
/// * `base_name` - The job name used for the output mesh files
fn build_geo(job: &SimulationJob, base_name: &str) -> String {
    format!(
        "// Import solid geometry\n\
         Merge \"{step_file}\";\n\
         vols[] = Volume \"*\";\n\
         Physical Volume(\"SolidVolume\") = {{ vols[] }};\n\
         \n\
         // Define mesh settings\n\
         Mesh.CharacteristicLengthMin = {cl_min};\n\
         Mesh.CharacteristicLengthMax = {cl_max};\n\
         Mesh.Algorithm3D = 1;\n\
         Mesh.HighOrderOptimize = 2;\n\
         Mesh.SaveAll = 0;\n\
         \n\
         Mesh 3;\n\
         SetOrder 2;\n\
         OptimizeMesh \"HighOrderElastic\";\n\
         \n\
         Save \"{base_name}.inp\";\n\
         Save \"{base_name}.msh\";\n",
        step_file = job.step_file,
        cl_min = job.mesh.min_element_size,
        cl_max = job.mesh.max_element_size,
        base_name = base_name,
    )
}

/// Runs Gmsh to mesh the step geometry into second-order tetrahedra
///
/// Produces `{base_name}.inp` with the volume mesh for the solver and
/// `{base_name}.msh` with the surface groupings for boundary conditions.
///
/// # Arguments
/// * `job` - The simulation job holding the geometry and mesh settings
/// * `base_name` - The job name used for the output mesh files
fn compute_mesh(job: &SimulationJob, base_name: &str) -> Result<(), GraniteError> {
    let geo_file = format!("{base_name}.geo");

    info!(
        "building .geo for Gmsh with {:.3} < CL < {:.3}",
        job.mesh.min_element_size, job.mesh.max_element_size
    );
    std::fs::write(&geo_file, build_geo(job, base_name))
        .map_err(|err| GraniteError::Mesher(format!("Failed to write {geo_file}: {err}")))?;

    info!("running gmsh on {}", job.step_file);
    let spinner = ProgressBar::new_spinner();
    spinner.set_message("meshing geometry");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let output = Command::new("gmsh").arg(&geo_file).arg("-").output();

    spinner.finish_and_clear();

    let output = match output {
        Ok(out) => out,
        Err(err) => {
            return Err(GraniteError::Mesher(format!("Failed to start gmsh: {err}")));
        }
    };

    if !output.status.success() {
        error!(
            "gmsh output:\n{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        return Err(GraniteError::Mesher(format!(
            "Gmsh exited with status {}",
            output.status
        )));
    }

    if let Err(err) = std::fs::remove_file(&geo_file) {
        warn!("failed to delete {geo_file}: {err}");
    }

    for artifact in [format!("{base_name}.inp"), format!("{base_name}.msh")] {
        if !Path::new(&artifact).exists() {
            return Err(GraniteError::Mesher(format!(
                "Gmsh did not produce {artifact}"
            )));
        }
    }

    Ok(())
}

fn parse_fields<T: std::str::FromStr>(line: &str, context: &str) -> Result<Vec<T>, GraniteError> {
    line.split_whitespace()
        .map(|field| {
            field
                .parse()
                .map_err(|_| GraniteError::Mesher(format!("unexpected field '{field}' in {context}")))
        })
        .collect()
}

fn next_content_line<'a>(lines: &mut std::str::Lines<'a>) -> Option<&'a str> {
    for line in lines {
        let line = line.trim();
        if !line.is_empty() {
            return Some(line);
        }
    }
    None
}

/// Parses a version 4.1 .msh file into a Mesh
///
/// Only the sections the pipeline needs are read: node coordinates and the
/// dimension-2 element blocks, keyed by the surface entity they belong to.
/// Volume and curve elements are consumed and dropped.
///
/// # Arguments
/// * `contents` - The full text of the mesh file
fn parse_mesh(contents: &str) -> Result<Mesh, GraniteError> {
    let mut node_coordinates: HashMap<usize, [f64; 3]> = HashMap::new();
    let mut surfaces: BTreeMap<i32, Vec<Vec<usize>>> = BTreeMap::new();

    let mut parser_state = MeshParseState::Limbo;
    let mut parsed_section_metadata = false;
    let mut lines = contents.lines();

    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("$End") {
            parser_state = MeshParseState::Limbo;
        }

        match parser_state {
            MeshParseState::Limbo => {
                parsed_section_metadata = false;

                if line.starts_with("$Entities") {
                    parser_state = MeshParseState::Entities;
                } else if line.starts_with("$Node") {
                    parser_state = MeshParseState::Nodes;
                } else if line.starts_with("$Elements") {
                    parser_state = MeshParseState::Elements;
                }
                continue;
            }
            MeshParseState::Nodes => {
                if !parsed_section_metadata {
                    parsed_section_metadata = true;
                    continue;
                }

                // entityDim entityTag parametric numNodesInBlock
                let header: Vec<i64> = parse_fields(line, "node block header")?;
                if header.len() < 4 {
                    return Err(GraniteError::Mesher(
                        "truncated node block header in mesh file".to_string(),
                    ));
                }
                let block_size = usize::try_from(header[3]).map_err(|_| {
                    GraniteError::Mesher(format!(
                        "negative node count {} in node block header",
                        header[3]
                    ))
                })?;

                // the declared count is file data, not a trusted capacity
                let mut node_tags: Vec<usize> = Vec::new();
                for _ in 0..block_size {
                    let tag_line = next_content_line(&mut lines).ok_or_else(|| {
                        GraniteError::Mesher("node block ended before its tags".to_string())
                    })?;
                    let tag: usize = tag_line.parse().map_err(|_| {
                        GraniteError::Mesher(format!("non-integer node tag '{tag_line}'"))
                    })?;
                    node_tags.push(tag);
                }

                for tag in node_tags {
                    let coord_line = next_content_line(&mut lines).ok_or_else(|| {
                        GraniteError::Mesher("node block ended before its coordinates".to_string())
                    })?;
                    let coords: Vec<f64> = parse_fields(coord_line, "node coordinates")?;
                    if coords.len() < 3 {
                        return Err(GraniteError::Mesher(format!(
                            "node {tag} has fewer than three coordinates"
                        )));
                    }
                    node_coordinates.insert(tag, [coords[0], coords[1], coords[2]]);
                }
            }
            MeshParseState::Elements => {
                if !parsed_section_metadata {
                    parsed_section_metadata = true;
                    continue;
                }

                // entityDim entityTag elementType numElementsInBlock
                let header: Vec<i64> = parse_fields(line, "element block header")?;
                if header.len() < 4 {
                    return Err(GraniteError::Mesher(
                        "truncated element block header in mesh file".to_string(),
                    ));
                }
                let entity_dim = header[0];
                let entity_tag = header[1] as i32;
                let element_type = header[2] as usize;
                let block_size = usize::try_from(header[3]).map_err(|_| {
                    GraniteError::Mesher(format!(
                        "negative element count {} in element block header",
                        header[3]
                    ))
                })?;

                for _ in 0..block_size {
                    let element_line = next_content_line(&mut lines).ok_or_else(|| {
                        GraniteError::Mesher("element block ended early".to_string())
                    })?;

                    // every block is consumed, only surface elements are kept
                    if entity_dim != 2 {
                        continue;
                    }

                    let fields: Vec<usize> = parse_fields(element_line, "element connectivity")?;
                    if fields.is_empty() {
                        return Err(GraniteError::Mesher(
                            "element record without a tag".to_string(),
                        ));
                    }
                    let nodes = fields[1..].to_vec();

                    match element_node_count(element_type) {
                        Some(expected) if nodes.len() == expected => {
                            surfaces.entry(entity_tag).or_default().push(nodes);
                        }
                        Some(expected) => {
                            return Err(GraniteError::Mesher(format!(
                                "element {} has {} nodes, expected {} for type {}",
                                fields[0],
                                nodes.len(),
                                expected,
                                element_type
                            )));
                        }
                        None => {
                            debug!("skipping element type {element_type} on surface {entity_tag}");
                        }
                    }
                }
            }
            MeshParseState::Entities => continue,
        }
    }

    info!(
        "loaded {} nodes across {} surfaces",
        node_coordinates.len(),
        surfaces.len()
    );

    Ok(Mesh::new(node_coordinates, surfaces))
}

/// Runs the mesher
///
/// Meshes the job's step geometry with Gmsh, parses the surface mesh back,
/// and verifies that every surface the boundary conditions reference exists.
///
/// # Arguments
/// * `job` - The simulation job to mesh
/// * `base_name` - The job name used for the generated files
///
/// # Returns
/// The parsed Mesh
pub fn run(job: &SimulationJob, base_name: &str) -> Result<Mesh, GraniteError> {
    compute_mesh(job, base_name)?;

    let msh_file = format!("{base_name}.msh");
    let contents = std::fs::read_to_string(&msh_file).map_err(|err| {
        GraniteError::Mesher(format!(
            "Unable to read auto-generated mesh file {msh_file}: {err}"
        ))
    })?;

    let mesh = parse_mesh(&contents)?;

    if let Err(err) = std::fs::remove_file(&msh_file) {
        warn!("failed to delete {msh_file}: {err}");
    }

    for face in &job.fixed_faces {
        if !mesh.surface_exists(face.surface_id) {
            return Err(GraniteError::Mesher(format!(
                "fixed face '{}' references surface {}, which is not in the mesh; available surfaces: {:?}",
                face.name,
                face.surface_id,
                mesh.surface_ids()
            )));
        }
    }
    for load in &job.applied_loads {
        if !mesh.surface_exists(load.surface_id) {
            return Err(GraniteError::Mesher(format!(
                "applied load '{}' references surface {}, which is not in the mesh; available surfaces: {:?}",
                load.name,
                load.surface_id,
                mesh.surface_ids()
            )));
        }
    }

    Ok(mesh)
}
