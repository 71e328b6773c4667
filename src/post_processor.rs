use log::info;
use vtkio::model::*;

use crate::{
    datatypes::{CellKind, FieldTable, MeshDataset},
    error::GraniteError,
};

/// Writes the decoded mesh and result fields to a VTK XML unstructured grid
///
/// Result arrays are attached as point data under the names ParaView users
/// expect from a CalculiX conversion. Empty arrays are omitted; populated
/// arrays must match the point count exactly, since correlation is by
/// position.
///
/// # Arguments
/// * `dataset` - The decoded mesh
/// * `fields` - The per-node result field arrays
/// * `vtu_file` - The output path
pub fn write_vtu(
    dataset: &MeshDataset,
    fields: &FieldTable,
    vtu_file: &str,
) -> Result<(), GraniteError> {
    let num_points = dataset.points.len();

    let mut points: Vec<f64> = Vec::with_capacity(num_points * 3);
    for point in &dataset.points {
        points.extend_from_slice(point);
    }

    let mut connectivity: Vec<u64> = Vec::new();
    let mut offsets: Vec<u64> = Vec::with_capacity(dataset.cells.len());
    let mut cell_types: Vec<CellType> = Vec::with_capacity(dataset.cells.len());

    let mut offset: u64 = 0;
    for cell in &dataset.cells {
        connectivity.extend(cell.nodes.iter().map(|node| *node as u64));
        offset += cell.nodes.len() as u64;
        offsets.push(offset);
        cell_types.push(match cell.kind {
            CellKind::QuadraticTetra => CellType::QuadraticTetra,
        });
    }

    let mut point_attributes: Vec<Attribute> = Vec::new();
    add_vector_attribute(
        &mut point_attributes,
        "Displacement",
        &fields.displacement,
        num_points,
    )?;
    add_tensor_attribute(&mut point_attributes, "Stress", &fields.stress, num_points)?;
    add_tensor_attribute(
        &mut point_attributes,
        "Total_Strain",
        &fields.total_strain,
        num_points,
    )?;
    add_scalar_attribute(
        &mut point_attributes,
        "Estimation_Error",
        &fields.estimation_error,
        num_points,
    )?;
    add_scalar_attribute(
        &mut point_attributes,
        "von Mises Stress",
        &fields.von_mises,
        num_points,
    )?;

    let vtk = Vtk {
        version: Version { major: 2, minor: 2 },
        title: String::new(),
        byte_order: ByteOrder::LittleEndian,
        file_path: None,
        data: DataSet::inline(UnstructuredGridPiece {
            points: IOBuffer::F64(points),
            cells: Cells {
                cell_verts: VertexNumbers::XML {
                    connectivity,
                    offsets,
                },
                types: cell_types,
            },
            data: Attributes {
                point: point_attributes,
                cell: Vec::new(),
            },
        }),
    };

    let mut vtu = Vec::new();
    vtk.write_xml(&mut vtu).map_err(|err| {
        GraniteError::PostProcessor(format!("Failed to build vtu output: {err}"))
    })?;
    std::fs::write(vtu_file, vtu)
        .map_err(|err| GraniteError::PostProcessor(format!("Failed to write {vtu_file}: {err}")))?;

    info!("wrote output to {vtu_file}");

    Ok(())
}

fn check_length(name: &str, len: usize, num_points: usize) -> Result<(), GraniteError> {
    if len != num_points {
        return Err(GraniteError::PostProcessor(format!(
            "Field {name} has {len} entries for {num_points} points"
        )));
    }
    Ok(())
}

fn add_vector_attribute(
    attributes: &mut Vec<Attribute>,
    name: &str,
    values: &[[f64; 3]],
    num_points: usize,
) -> Result<(), GraniteError> {
    if values.is_empty() {
        return Ok(());
    }
    check_length(name, values.len(), num_points)?;

    let flat: Vec<f64> = values.iter().flatten().copied().collect();
    attributes.push(Attribute::vectors(name).with_data(IOBuffer::F64(flat)));
    Ok(())
}

fn add_tensor_attribute(
    attributes: &mut Vec<Attribute>,
    name: &str,
    values: &[[f64; 6]],
    num_points: usize,
) -> Result<(), GraniteError> {
    if values.is_empty() {
        return Ok(());
    }
    check_length(name, values.len(), num_points)?;

    let flat: Vec<f64> = values.iter().flatten().copied().collect();
    attributes.push(Attribute::generic(name, 6).with_data(IOBuffer::F64(flat)));
    Ok(())
}

fn add_scalar_attribute(
    attributes: &mut Vec<Attribute>,
    name: &str,
    values: &[f64],
    num_points: usize,
) -> Result<(), GraniteError> {
    if values.is_empty() {
        return Ok(());
    }
    check_length(name, values.len(), num_points)?;

    attributes.push(Attribute::scalars(name, 1).with_data(IOBuffer::F64(values.to_vec())));
    Ok(())
}
