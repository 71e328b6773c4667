use std::collections::BTreeMap;

/// Element topologies the result decoder recognizes. Ten-node tetrahedra
/// are the only shape CalculiX produces for our second-order volume meshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    QuadraticTetra,
}

#[derive(Debug)]
pub struct Cell {
    pub kind: CellKind,
    pub nodes: Vec<usize>,
}

/// Points and cells decoded from a result file. Cell connectivity indexes
/// into `points` with 0-based ids.
#[derive(Debug, Default)]
pub struct MeshDataset {
    pub points: Vec<[f64; 3]>,
    pub cells: Vec<Cell>,
}

/// Per-node result arrays. The i-th entry of every array belongs to the
/// i-th point of the dataset it was decoded with; correlation is by
/// position, never by node id lookup.
#[derive(Debug, Default)]
pub struct FieldTable {
    pub displacement: Vec<[f64; 3]>,
    pub stress: Vec<[f64; 6]>,
    pub total_strain: Vec<[f64; 6]>,
    pub estimation_error: Vec<f64>,
    pub von_mises: Vec<f64>,
}

/// Counters for content a decode pass dropped rather than aborted on.
#[derive(Debug, Default)]
pub struct DecodeStats {
    pub skipped_records: usize,
    pub skipped_elements: usize,
    pub out_of_order_nodes: usize,
}

/// One 2D mesh element of a loaded surface: node tags in file order with
/// their coordinates in the same order.
#[derive(Debug, Clone)]
pub struct SurfaceElement {
    pub node_ids: Vec<usize>,
    pub node_coordinates: Vec<[f64; 3]>,
}

/// Nodal point forces for one applied load, keyed by ascending node tag.
pub type NodalForceMap = BTreeMap<usize, [f64; 3]>;

#[derive(Debug)]
pub struct MeshSettings {
    pub min_element_size: f64,
    pub max_element_size: f64,
}

#[derive(Debug)]
pub struct Material {
    pub name: String,
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
}

#[derive(Debug)]
pub struct FixedFace {
    pub surface_id: i32,
    pub name: String,
}

#[derive(Debug)]
pub struct AppliedLoad {
    pub surface_id: i32,
    pub name: String,
    pub magnitude: f64,
    pub direction: [f64; 3],
}

/// A full simulation job as loaded from the config json.
#[derive(Debug)]
pub struct SimulationJob {
    pub step_file: String,
    pub mesh: MeshSettings,
    pub material: Material,
    pub fixed_faces: Vec<FixedFace>,
    pub applied_loads: Vec<AppliedLoad>,
}
