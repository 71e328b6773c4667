use std::io::BufRead;

use log::{debug, info, warn};

use crate::{
    datatypes::{Cell, CellKind, DecodeStats, FieldTable, MeshDataset},
    error::GraniteError,
};

/// Result files carry stress in mega-units; stored values are base units.
pub const STRESS_SCALE: f64 = 1e6;

enum ParserState {
    None,
    Nodes,
    Elements,
    Disp,
    Stress,
    Strain,
    Error,
}

/// Computes the von Mises stress from the six independent stress tensor
/// components, ordered (sxx, syy, szz, sxy, syz, szx).
pub fn von_mises(s: &[f64; 6]) -> f64 {
    f64::sqrt(
        0.5 * (f64::powi(s[0] - s[1], 2)
            + f64::powi(s[1] - s[2], 2)
            + f64::powi(s[2] - s[0], 2)
            + 6.0 * (f64::powi(s[3], 2) + f64::powi(s[4], 2) + f64::powi(s[5], 2))),
    )
}

/// Decodes an frd result stream into mesh and field data
///
/// The format is line oriented: marker lines select the active block and
/// `-1` lines carry one record each for that block. Element records span a
/// second `-2` connectivity line, consumed here as well. Records that fail
/// numeric parsing are counted and skipped, never fatal; only a stream read
/// failure aborts the decode.
///
/// # Arguments
/// * `reader` - Buffered reader over the result text
///
/// # Returns
/// The mesh, the per-node field arrays, and counters for dropped content
pub fn decode<R: BufRead>(
    reader: R,
) -> Result<(MeshDataset, FieldTable, DecodeStats), GraniteError> {
    let mut dataset = MeshDataset::default();
    let mut fields = FieldTable::default();
    let mut stats = DecodeStats::default();

    let mut state = ParserState::None;
    let mut lines = reader.lines();
    let mut line_no: usize = 0;

    while let Some(line) = lines.next() {
        let line = line?;
        line_no += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let keyword = match tokens.next() {
            Some(k) => k,
            None => continue,
        };

        match keyword {
            "2C" => {
                state = ParserState::Nodes;
                continue;
            }
            "3C" => {
                state = ParserState::Elements;
                continue;
            }
            "-4" => {
                state = match tokens.next() {
                    Some("DISP") => ParserState::Disp,
                    Some("STRESS") => ParserState::Stress,
                    Some("TOSTRAIN") => ParserState::Strain,
                    Some("ERROR") => ParserState::Error,
                    _ => ParserState::None,
                };
                continue;
            }
            "-3" | "9999" => {
                state = ParserState::None;
                continue;
            }
            "-1" => {}
            _ => continue,
        }

        // one "-1" record for the active block
        let record = match state {
            ParserState::None => Ok(()),
            ParserState::Nodes => decode_node(tokens, line_no, &mut dataset, &mut stats),
            ParserState::Elements => match lines.next() {
                Some(connectivity_line) => {
                    let connectivity_line = connectivity_line?;
                    line_no += 1;
                    decode_element(&connectivity_line, line_no, &mut dataset, &mut stats)
                }
                None => Err(GraniteError::MalformedRecord {
                    line: line_no,
                    reason: "element record with no connectivity line".to_string(),
                }),
            },
            ParserState::Disp => decode_displacement(tokens, line_no, &mut fields),
            ParserState::Stress => decode_stress(tokens, line_no, &mut fields),
            ParserState::Strain => decode_strain(tokens, line_no, &mut fields),
            ParserState::Error => decode_error(tokens, line_no, &mut fields),
        };

        if let Err(err) = record {
            stats.skipped_records += 1;
            debug!("skipping record: {err}");
        }
    }

    Ok((dataset, fields, stats))
}

/// Decodes an frd result file from disk
///
/// # Arguments
/// * `frd_file` - The path to the result file
///
/// # Returns
/// The decoded mesh, field arrays, and decode counters
pub fn decode_file(frd_file: &str) -> Result<(MeshDataset, FieldTable, DecodeStats), GraniteError> {
    let file = std::fs::File::open(frd_file)?;
    let (dataset, fields, stats) = decode(std::io::BufReader::new(file))?;

    info!(
        "loaded {} points and {} cells from {}",
        dataset.points.len(),
        dataset.cells.len(),
        frd_file
    );
    if stats.skipped_records > 0 {
        warn!(
            "skipped {} malformed records in {}; field arrays may be shorter than the point count",
            stats.skipped_records, frd_file
        );
    }
    if stats.skipped_elements > 0 {
        warn!(
            "skipped {} elements with unsupported topology, only 10-node tetrahedra are emitted",
            stats.skipped_elements
        );
    }
    if stats.out_of_order_nodes > 0 {
        warn!(
            "{} node records arrived out of insertion order; field-to-node correlation is suspect",
            stats.out_of_order_nodes
        );
    }

    Ok((dataset, fields, stats))
}

fn next_int(tokens: &mut std::str::SplitWhitespace, line: usize) -> Result<i64, GraniteError> {
    let token = tokens.next().ok_or_else(|| GraniteError::MalformedRecord {
        line,
        reason: "missing integer field".to_string(),
    })?;

    token.parse().map_err(|_| GraniteError::MalformedRecord {
        line,
        reason: format!("non-integer field '{token}'"),
    })
}

fn next_f64(tokens: &mut std::str::SplitWhitespace, line: usize) -> Result<f64, GraniteError> {
    let token = tokens.next().ok_or_else(|| GraniteError::MalformedRecord {
        line,
        reason: "missing numeric field".to_string(),
    })?;

    token.parse().map_err(|_| GraniteError::MalformedRecord {
        line,
        reason: format!("non-numeric field '{token}'"),
    })
}

fn decode_node(
    mut tokens: std::str::SplitWhitespace,
    line: usize,
    dataset: &mut MeshDataset,
    stats: &mut DecodeStats,
) -> Result<(), GraniteError> {
    let id = next_int(&mut tokens, line)?;
    let x = next_f64(&mut tokens, line)?;
    let y = next_f64(&mut tokens, line)?;
    let z = next_f64(&mut tokens, line)?;

    // field arrays correlate to points by position; an id that disagrees
    // with its insertion position means that correlation no longer holds
    if id != dataset.points.len() as i64 + 1 {
        stats.out_of_order_nodes += 1;
    }

    dataset.points.push([x, y, z]);
    Ok(())
}

fn decode_element(
    connectivity_line: &str,
    line: usize,
    dataset: &mut MeshDataset,
    stats: &mut DecodeStats,
) -> Result<(), GraniteError> {
    let mut tokens = connectivity_line.trim().split_whitespace();

    // leading "-2" marker
    if tokens.next().is_none() {
        return Err(GraniteError::MalformedRecord {
            line,
            reason: "empty connectivity line".to_string(),
        });
    }

    let mut nodes: Vec<usize> = Vec::new();
    for token in tokens {
        let id: usize = token.parse().map_err(|_| GraniteError::MalformedRecord {
            line,
            reason: format!("non-integer node id '{token}'"),
        })?;
        if id == 0 {
            return Err(GraniteError::MalformedRecord {
                line,
                reason: "node id 0 in 1-based connectivity".to_string(),
            });
        }
        nodes.push(id - 1);
    }

    if nodes.len() == 10 {
        dataset.cells.push(Cell {
            kind: CellKind::QuadraticTetra,
            nodes,
        });
    } else {
        stats.skipped_elements += 1;
        debug!("skipping element with {} nodes", nodes.len());
    }

    Ok(())
}

fn decode_displacement(
    mut tokens: std::str::SplitWhitespace,
    line: usize,
    fields: &mut FieldTable,
) -> Result<(), GraniteError> {
    let _id = next_int(&mut tokens, line)?;
    let mut displacement = [0.0; 3];
    for component in displacement.iter_mut() {
        *component = next_f64(&mut tokens, line)?;
    }

    fields.displacement.push(displacement);
    Ok(())
}

fn decode_stress(
    mut tokens: std::str::SplitWhitespace,
    line: usize,
    fields: &mut FieldTable,
) -> Result<(), GraniteError> {
    let _id = next_int(&mut tokens, line)?;
    let mut stress = [0.0; 6];
    for component in stress.iter_mut() {
        *component = next_f64(&mut tokens, line)? * STRESS_SCALE;
    }

    fields.stress.push(stress);
    fields.von_mises.push(von_mises(&stress));
    Ok(())
}

fn decode_strain(
    mut tokens: std::str::SplitWhitespace,
    line: usize,
    fields: &mut FieldTable,
) -> Result<(), GraniteError> {
    let _id = next_int(&mut tokens, line)?;
    let mut strain = [0.0; 6];
    for component in strain.iter_mut() {
        *component = next_f64(&mut tokens, line)?;
    }

    fields.total_strain.push(strain);
    Ok(())
}

fn decode_error(
    mut tokens: std::str::SplitWhitespace,
    line: usize,
    fields: &mut FieldTable,
) -> Result<(), GraniteError> {
    let _id = next_int(&mut tokens, line)?;
    let error = next_f64(&mut tokens, line)?;

    fields.estimation_error.push(error);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    const RESULT_SAMPLE: &str = "    1C  granite test part\n\
    1UDATE              25.08.2025\n\
    2C                                    10                                     1\n\
 -1         1  0.00000E+00  0.00000E+00  0.00000E+00\n\
 -1         2  1.00000E+00  0.00000E+00  0.00000E+00\n\
 -1         3  0.00000E+00  1.00000E+00  0.00000E+00\n\
 -1         4  0.00000E+00  0.00000E+00  1.00000E+00\n\
 -1         5  5.00000E-01  0.00000E+00  0.00000E+00\n\
 -1         6  5.00000E-01  5.00000E-01  0.00000E+00\n\
 -1         7  0.00000E+00  5.00000E-01  0.00000E+00\n\
 -1         8  0.00000E+00  0.00000E+00  5.00000E-01\n\
 -1         9  5.00000E-01  0.00000E+00  5.00000E-01\n\
 -1        10  0.00000E+00  5.00000E-01  5.00000E-01\n\
 -3\n\
    3C                                     1                                     1\n\
 -1         1    6    0    1\n\
 -2         1         2         3         4         5         6         7         8         9        10\n\
 -3\n\
    1PSTEP                         1           1           1\n\
  100CL  101  1.00000000        10                     0    1           1\n\
 -4  DISP        4    1\n\
 -5  D1          1    2    1    0\n\
 -5  D2          1    2    2    0\n\
 -5  D3          1    2    3    0\n\
 -1         1  0.00000E+00  0.00000E+00  0.00000E+00\n\
 -1         2  1.00000E-03  0.00000E+00  0.00000E+00\n\
 -1         3  0.00000E+00  1.00000E-03  0.00000E+00\n\
 -1         4  0.00000E+00  0.00000E+00  1.00000E-03\n\
 -1         5  5.00000E-04  0.00000E+00  0.00000E+00\n\
 -1         6  5.00000E-04  5.00000E-04  0.00000E+00\n\
 -1         7  0.00000E+00  5.00000E-04  0.00000E+00\n\
 -1         8  0.00000E+00  0.00000E+00  5.00000E-04\n\
 -1         9  5.00000E-04  0.00000E+00  5.00000E-04\n\
 -1        10  0.00000E+00  5.00000E-04  5.00000E-04\n\
 -3\n\
 -4  STRESS      6    1\n\
 -5  SXX         1    4    1    1\n\
 -5  SYY         1    4    2    2\n\
 -5  SZZ         1    4    3    3\n\
 -5  SXY         1    4    1    2\n\
 -5  SYZ         1    4    2    3\n\
 -5  SZX         1    4    3    1\n\
 -1         1  1.00000E+00  2.00000E+00  3.00000E+00  4.00000E-01  5.00000E-01  6.00000E-01\n\
 -1         2  1.10000E+00  2.10000E+00  3.10000E+00  4.10000E-01  5.10000E-01  6.10000E-01\n\
 -1         3  1.20000E+00  2.20000E+00  3.20000E+00  4.20000E-01  5.20000E-01  6.20000E-01\n\
 -1         4  1.30000E+00  2.30000E+00  3.30000E+00  4.30000E-01  5.30000E-01  6.30000E-01\n\
 -1         5  1.40000E+00  2.40000E+00  3.40000E+00  4.40000E-01  5.40000E-01  6.40000E-01\n\
 -1         6  1.50000E+00  2.50000E+00  3.50000E+00  4.50000E-01  5.50000E-01  6.50000E-01\n\
 -1         7  1.60000E+00  2.60000E+00  3.60000E+00  4.60000E-01  5.60000E-01  6.60000E-01\n\
 -1         8  1.70000E+00  2.70000E+00  3.70000E+00  4.70000E-01  5.70000E-01  6.70000E-01\n\
 -1         9  1.80000E+00  2.80000E+00  3.80000E+00  4.80000E-01  5.80000E-01  6.80000E-01\n\
 -1        10  1.90000E+00  2.90000E+00  3.90000E+00  4.90000E-01  5.90000E-01  6.90000E-01\n\
 -3\n\
 -4  TOSTRAIN    6    1\n\
 -5  EXX         1    4    1    1\n\
 -5  EYY         1    4    2    2\n\
 -5  EZZ         1    4    3    3\n\
 -5  EXY         1    4    1    2\n\
 -5  EYZ         1    4    2    3\n\
 -5  EZX         1    4    3    1\n\
 -1         1  1.00000E-04  2.00000E-04  3.00000E-04  4.00000E-05  5.00000E-05  6.00000E-05\n\
 -1         2  1.10000E-04  2.10000E-04  3.10000E-04  4.10000E-05  5.10000E-05  6.10000E-05\n\
 -1         3  1.20000E-04  2.20000E-04  3.20000E-04  4.20000E-05  5.20000E-05  6.20000E-05\n\
 -1         4  1.30000E-04  2.30000E-04  3.30000E-04  4.30000E-05  5.30000E-05  6.30000E-05\n\
 -1         5  1.40000E-04  2.40000E-04  3.40000E-04  4.40000E-05  5.40000E-05  6.40000E-05\n\
 -1         6  1.50000E-04  2.50000E-04  3.50000E-04  4.50000E-05  5.50000E-05  6.50000E-05\n\
 -1         7  1.60000E-04  2.60000E-04  3.60000E-04  4.60000E-05  5.60000E-05  6.60000E-05\n\
 -1         8  1.70000E-04  2.70000E-04  3.70000E-04  4.70000E-05  5.70000E-05  6.70000E-05\n\
 -1         9  1.80000E-04  2.80000E-04  3.80000E-04  4.80000E-05  5.80000E-05  6.80000E-05\n\
 -1        10  1.90000E-04  2.90000E-04  3.90000E-04  4.90000E-05  5.90000E-05  6.90000E-05\n\
 -3\n\
 -4  ERROR       1    1\n\
 -5  STR(%)      1    1    1    0\n\
 -1         1  1.25000E+01\n\
 -1         2  1.26000E+01\n\
 -1         3  1.27000E+01\n\
 -1         4  1.28000E+01\n\
 -1         5  1.29000E+01\n\
 -1         6  1.30000E+01\n\
 -1         7  1.31000E+01\n\
 -1         8  1.32000E+01\n\
 -1         9  1.33000E+01\n\
 -1        10  1.34000E+01\n\
 -3\n\
 9999\n";

    fn decode_str(content: &str) -> (MeshDataset, FieldTable, DecodeStats) {
        decode(content.as_bytes()).unwrap()
    }

    #[test]
    fn test_decodes_complete_result_file() {
        let (dataset, fields, stats) = decode_str(RESULT_SAMPLE);

        assert_eq!(dataset.points.len(), 10);
        assert_eq!(dataset.points[1], [1.0, 0.0, 0.0]);
        assert_eq!(dataset.points[9], [0.0, 0.5, 0.5]);

        assert_eq!(dataset.cells.len(), 1);
        assert_eq!(dataset.cells[0].kind, CellKind::QuadraticTetra);
        assert_eq!(dataset.cells[0].nodes, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);

        assert_eq!(fields.displacement.len(), 10);
        assert_eq!(fields.stress.len(), 10);
        assert_eq!(fields.total_strain.len(), 10);
        assert_eq!(fields.estimation_error.len(), 10);
        assert_eq!(fields.von_mises.len(), 10);

        assert_relative_eq!(fields.displacement[1][0], 1.0e-3);
        assert_relative_eq!(fields.estimation_error[0], 12.5);

        assert_eq!(stats.skipped_records, 0);
        assert_eq!(stats.skipped_elements, 0);
        assert_eq!(stats.out_of_order_nodes, 0);
    }

    #[test]
    fn test_point_count_matches_node_records_across_blocks() {
        let sample = "    2C                                     2\n\
 -1         1  0.0  0.0  0.0\n\
 -1         2  1.0  0.0  0.0\n\
 -3\n\
    2C                                     1\n\
 -1         3  2.0  0.0  0.0\n\
 -3\n";

        let (dataset, _, stats) = decode_str(sample);
        assert_eq!(dataset.points.len(), 3);
        assert_eq!(stats.out_of_order_nodes, 0);
    }

    #[test]
    fn test_stress_scaled_and_von_mises_derived() {
        let (_, fields, _) = decode_str(RESULT_SAMPLE);

        assert_relative_eq!(fields.stress[0][0], 1.0e6);
        assert_relative_eq!(fields.stress[0][3], 0.4e6);
        assert_relative_eq!(fields.stress[9][5], 0.69e6, max_relative = 1e-12);

        // closed form on the scaled components
        for (stress, vm) in fields.stress.iter().zip(&fields.von_mises) {
            let expected = f64::sqrt(
                0.5 * (f64::powi(stress[0] - stress[1], 2)
                    + f64::powi(stress[1] - stress[2], 2)
                    + f64::powi(stress[2] - stress[0], 2)
                    + 6.0
                        * (f64::powi(stress[3], 2)
                            + f64::powi(stress[4], 2)
                            + f64::powi(stress[5], 2))),
            );
            assert_relative_eq!(*vm, expected, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_von_mises_rederivation_is_idempotent() {
        let (_, fields, _) = decode_str(RESULT_SAMPLE);

        for (stress, vm) in fields.stress.iter().zip(&fields.von_mises) {
            assert_eq!(von_mises(stress), *vm);
        }
    }

    #[test]
    fn test_strain_not_scaled() {
        let (_, fields, _) = decode_str(RESULT_SAMPLE);
        assert_relative_eq!(fields.total_strain[0][0], 1.0e-4);
        assert_relative_eq!(fields.total_strain[9][5], 6.9e-5, max_relative = 1e-12);
    }

    #[test]
    fn test_hydrostatic_stress_has_zero_von_mises() {
        assert_relative_eq!(von_mises(&[5.0, 5.0, 5.0, 0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_uniaxial_von_mises_equals_axial_stress() {
        assert_relative_eq!(von_mises(&[7.0, 0.0, 0.0, 0.0, 0.0, 0.0]), 7.0);
    }

    #[test]
    fn test_eight_node_connectivity_emits_no_cell() {
        let sample = "    3C\n\
 -1         1    1    0    1\n\
 -2         1         2         3         4         5         6         7         8\n\
 -3\n";

        let (dataset, _, stats) = decode_str(sample);
        assert_eq!(dataset.cells.len(), 0);
        assert_eq!(stats.skipped_elements, 1);
        assert_eq!(stats.skipped_records, 0);
    }

    #[test]
    fn test_connectivity_ids_shifted_to_zero_based() {
        let sample = "    3C\n\
 -1         1    6    0    1\n\
 -2        11        12        13        14        15        16        17        18        19        20\n";

        let (dataset, _, _) = decode_str(sample);
        assert_eq!(dataset.cells.len(), 1);
        assert_eq!(
            dataset.cells[0].nodes,
            vec![10, 11, 12, 13, 14, 15, 16, 17, 18, 19]
        );
    }

    #[test]
    fn test_malformed_record_skipped_and_counted() {
        let sample = "    2C\n\
 -1         1  0.0  0.0  0.0\n\
 -1         2  oops  0.0  0.0\n\
 -1         3  2.0  0.0  0.0\n\
 -3\n";

        let (dataset, _, stats) = decode_str(sample);
        assert_eq!(dataset.points.len(), 2);
        assert_eq!(dataset.points[0], [0.0, 0.0, 0.0]);
        assert_eq!(dataset.points[1], [2.0, 0.0, 0.0]);
        assert_eq!(stats.skipped_records, 1);
        // the dropped record shifts every later node off its position
        assert_eq!(stats.out_of_order_nodes, 1);
    }

    #[test]
    fn test_unrecognized_field_block_ignored() {
        let sample = " -4  HFLUX       1    1\n\
 -1         1  3.00000E+00\n\
 -3\n";

        let (dataset, fields, stats) = decode_str(sample);
        assert_eq!(dataset.points.len(), 0);
        assert_eq!(fields.estimation_error.len(), 0);
        assert_eq!(fields.displacement.len(), 0);
        assert_eq!(stats.skipped_records, 0);
    }

    #[test]
    fn test_end_markers_reset_state() {
        let sample = "    2C\n\
 -1         1  0.0  0.0  0.0\n\
 -3\n\
 -1         2  1.0  0.0  0.0\n\
 9999\n\
 -1         3  2.0  0.0  0.0\n";

        let (dataset, _, stats) = decode_str(sample);
        assert_eq!(dataset.points.len(), 1);
        assert_eq!(stats.skipped_records, 0);
    }

    #[test]
    fn test_out_of_order_node_ids_counted() {
        let sample = "    2C\n\
 -1         1  0.0  0.0  0.0\n\
 -1         3  1.0  0.0  0.0\n\
 -1         2  2.0  0.0  0.0\n\
 -3\n";

        let (dataset, _, stats) = decode_str(sample);
        assert_eq!(dataset.points.len(), 3);
        assert_eq!(stats.out_of_order_nodes, 2);
    }

    #[test]
    fn test_element_record_at_end_of_input() {
        let sample = "    3C\n\
 -1         1    6    0    1\n";

        let (dataset, _, stats) = decode_str(sample);
        assert_eq!(dataset.cells.len(), 0);
        assert_eq!(stats.skipped_records, 1);
    }

    #[test]
    fn test_decode_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(RESULT_SAMPLE.as_bytes()).unwrap();

        let (dataset, fields, stats) = decode_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(dataset.points.len(), 10);
        assert_eq!(fields.von_mises.len(), 10);
        assert_eq!(stats.skipped_records, 0);
    }

    #[test]
    fn test_decode_file_missing_path_is_io_error() {
        let err = decode_file("does_not_exist.frd").unwrap_err();
        assert!(matches!(err, GraniteError::Io(_)));
    }
}
