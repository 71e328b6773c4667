use std::io::Write;

use log::{info, warn};

use crate::{
    datatypes::{AppliedLoad, Material, SimulationJob},
    error::GraniteError,
    loads::{self, DistributedLoad, FORCE_EPSILON},
    mesher::Mesh,
};

const BANNER: &str = "***********************************************************\n";

/// Appends element sets, material data, and boundary conditions to the
/// solver deck that Gmsh wrote
///
/// The deck from Gmsh ends after the element definitions. This adds
/// everything CalculiX needs for a static analysis: element sets, the
/// material, the fixed constraints, and one distributed force block per
/// applied load. Loads that cannot be distributed are skipped with a
/// warning so the remaining boundary conditions still solve.
///
/// # Arguments
/// * `inp_file` - The solver deck to append to
/// * `job` - The simulation job holding material and boundary conditions
/// * `mesh` - The parsed surface mesh
pub fn append_boundary_conditions(
    inp_file: &str,
    job: &SimulationJob,
    mesh: &Mesh,
) -> Result<(), GraniteError> {
    let mut deck = String::new();

    write_element_sets(&mut deck, &job.material);

    for face in &job.fixed_faces {
        let node_tags = mesh.surface_nodes(face.surface_id)?;
        info!(
            "surface {} ({}): {} constrained nodes",
            face.surface_id,
            face.name,
            node_tags.len()
        );
        write_constraint_node_set(&mut deck, &node_tags);
    }

    write_material(&mut deck, &job.material);
    write_step_header(&mut deck);
    write_fixed_constraints(&mut deck);

    for load in &job.applied_loads {
        let elements = mesh.surface_elements(load.surface_id)?;
        match loads::distribute(&elements, load.magnitude, load.direction) {
            Ok(distributed) => {
                info!(
                    "surface {} ({}): {} N distributed across {} nodes",
                    load.surface_id,
                    load.name,
                    load.magnitude,
                    distributed.nodal_forces.len()
                );
                write_force_boundary_condition(&mut deck, load, &distributed);
            }
            Err(err @ (GraniteError::ZeroArea | GraniteError::ZeroDirection)) => {
                warn!(
                    "skipping load on surface {} ({}): {err}",
                    load.surface_id, load.name
                );
            }
            Err(err) => return Err(err),
        }
    }

    write_outputs(&mut deck);
    write_end_step(&mut deck);

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(inp_file)
        .map_err(|err| GraniteError::Mesher(format!("Unable to open mesh deck {inp_file}: {err}")))?;
    file.write_all(deck.as_bytes())
        .map_err(|err| GraniteError::Mesher(format!("Failed to write to {inp_file}: {err}")))?;

    info!("appended boundary conditions to {inp_file}");

    Ok(())
}

fn write_element_sets(deck: &mut String, material: &Material) {
    deck.push_str(BANNER);
    deck.push_str("** Define element set Eall\n");
    deck.push_str("*ELSET, ELSET=Eall\n");
    deck.push_str("volume1\n");
    deck.push_str(BANNER);
    deck.push_str("** Element sets for materials and FEM element type (solid, shell, beam, fluid)\n");
    deck.push_str(&format!("*ELSET, ELSET={}Solid\n", material.name));
    deck.push_str("volume1\n");
}

fn write_constraint_node_set(deck: &mut String, node_tags: &[usize]) {
    deck.push_str(BANNER);
    deck.push_str("** constraints fixed node sets\n");
    deck.push_str("** ConstraintFixed\n");
    deck.push_str("*NSET,NSET=ConstraintFixed\n");
    for tag in node_tags {
        deck.push_str(&format!("{tag},\n"));
    }
}

fn write_material(deck: &mut String, material: &Material) {
    deck.push_str("** Physical constants for SI(mm) unit system with Kelvins\n");
    deck.push_str("*PHYSICAL CONSTANTS, ABSOLUTE ZERO=0, STEFAN BOLTZMANN=5.670374419e-11\n");
    deck.push_str(BANNER);
    deck.push_str("** Materials\n");
    deck.push_str("** see information about units at file end\n");
    deck.push_str(&format!("** {}\n", material.name));
    deck.push_str(&format!("*MATERIAL, NAME={}\n", material.name));
    deck.push_str("*ELASTIC\n");
    deck.push_str(&format!(
        "{},{}\n",
        material.youngs_modulus, material.poisson_ratio
    ));
    deck.push_str(BANNER);
    deck.push_str("** Sections\n");
    deck.push_str(&format!(
        "*SOLID SECTION, ELSET={name}Solid, MATERIAL={name}\n",
        name = material.name
    ));
}

fn write_step_header(deck: &mut String) {
    deck.push_str(BANNER);
    deck.push_str("** At least one step is needed to run a CalculiX analysis\n");
    deck.push_str("*STEP, INC=2000\n");
    deck.push_str("*STATIC\n");
}

fn write_fixed_constraints(deck: &mut String) {
    deck.push_str(BANNER);
    deck.push_str("** Fixed Constraints\n");
    deck.push_str("** ConstraintFixed\n");
    deck.push_str("*BOUNDARY\n");
    deck.push_str("ConstraintFixed,1\n");
    deck.push_str("ConstraintFixed,2\n");
    deck.push_str("ConstraintFixed,3\n");
}

fn write_force_boundary_condition(
    deck: &mut String,
    load: &AppliedLoad,
    distributed: &DistributedLoad,
) {
    deck.push_str(BANNER);
    deck.push_str("** constraints force node loads\n");
    deck.push_str("*CLOAD\n");
    deck.push_str("** ConstraintForce\n");
    deck.push_str(&format!("** node loads on surface {}\n", load.surface_id));
    deck.push_str(&format!(
        "** Total force: {} N, Direction: [{}, {}, {}]\n",
        load.magnitude, load.direction[0], load.direction[1], load.direction[2]
    ));
    deck.push_str(&format!(
        "** Total surface area: {:.6}\n",
        distributed.total_area
    ));
    deck.push_str(&format!(
        "** Pressure: {:.6} N/unit_area\n",
        distributed.pressure
    ));

    for (node_tag, force) in &distributed.nodal_forces {
        for (index, component) in force.iter().enumerate() {
            if component.abs() > FORCE_EPSILON {
                deck.push_str(&format!("{},{},{:.6}\n", node_tag, index + 1, component));
            }
        }
    }
}

fn write_outputs(deck: &mut String) {
    deck.push_str(BANNER);
    deck.push_str("** Outputs --> frd file\n");
    deck.push_str("*NODE FILE\n");
    deck.push_str("U\n");
    deck.push_str("*EL FILE\n");
    deck.push_str("S, E\n");
    deck.push_str("** outputs --> dat file\n");
    deck.push_str("** reaction forces for fixed constraints\n");
    deck.push_str("*NODE PRINT, NSET=ConstraintFixed, TOTALS=ONLY\n");
    deck.push_str("RF\n");
}

fn write_end_step(deck: &mut String) {
    deck.push_str("*OUTPUT, FREQUENCY=1\n");
    deck.push_str(BANNER);
    deck.push_str("*END STEP\n");
}
