use json::JsonValue;

use crate::{
    datatypes::{AppliedLoad, FixedFace, Material, MeshSettings, SimulationJob},
    error::GraniteError,
};

/// Loads and validates a simulation config file
///
/// # Arguments
/// * `config_file` - The path to the config json
///
/// # Returns
/// A validated SimulationJob
pub fn load_simulation_job(config_file: &str) -> Result<SimulationJob, GraniteError> {
    let file_string = match std::fs::read_to_string(config_file) {
        Ok(f) => f,
        Err(err) => {
            return Err(GraniteError::Config(format!(
                "Unable to open config file {config_file}: {err}"
            )))
        }
    };

    let config_json = match json::parse(&file_string) {
        Ok(j) => j,
        Err(err) => return Err(GraniteError::Config(format!("Error in config json: {err}"))),
    };

    parse_simulation_job(&config_json)
}

/// Parses a SimulationJob from the config json
///
/// A job without any fixed face or applied load is rejected; the solver
/// would have nothing to do with it.
///
/// # Arguments
/// * `config_json` - The config file as a JsonValue object
///
/// # Returns
/// A SimulationJob instance
pub fn parse_simulation_job(config_json: &JsonValue) -> Result<SimulationJob, GraniteError> {
    if !config_json.has_key("step_file") {
        return Err(GraniteError::Config(
            "Config json missing step_file field".to_string(),
        ));
    }
    let step_file = match config_json["step_file"].as_str() {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => {
            return Err(GraniteError::Config(
                "Config json has a non-string or empty step_file field".to_string(),
            ))
        }
    };

    if !config_json.has_key("mesh") {
        return Err(GraniteError::Config(
            "Config json missing mesh section".to_string(),
        ));
    }
    let mesh = parse_mesh_settings(&config_json["mesh"])?;

    let material = if config_json.has_key("material") {
        parse_material(&config_json["material"])?
    } else {
        // PLA-Generic defaults
        Material {
            name: "MaterialSolid".to_string(),
            youngs_modulus: 3640.0,
            poisson_ratio: 0.36,
        }
    };

    let fixed_faces = parse_fixed_faces(config_json)?;
    let applied_loads = parse_applied_loads(config_json)?;

    if fixed_faces.is_empty() && applied_loads.is_empty() {
        return Err(GraniteError::Config(
            "Config json has no boundary conditions; at least one fixed face or applied load is required"
                .to_string(),
        ));
    }

    Ok(SimulationJob {
        step_file,
        mesh,
        material,
        fixed_faces,
        applied_loads,
    })
}

fn parse_mesh_settings(mesh_json: &JsonValue) -> Result<MeshSettings, GraniteError> {
    if !mesh_json.has_key("min_element_size") {
        return Err(GraniteError::Config(
            "Config json missing min_element_size field in mesh section".to_string(),
        ));
    }
    if !mesh_json.has_key("max_element_size") {
        return Err(GraniteError::Config(
            "Config json missing max_element_size field in mesh section".to_string(),
        ));
    }

    let min_element_size = mesh_json["min_element_size"].as_f64();
    let max_element_size = mesh_json["max_element_size"].as_f64();

    match (min_element_size, max_element_size) {
        (Some(min), Some(max)) => Ok(MeshSettings {
            min_element_size: min,
            max_element_size: max,
        }),
        _ => Err(GraniteError::Config(
            "Config json has non-numeric element sizes in mesh section".to_string(),
        )),
    }
}

fn parse_material(material_json: &JsonValue) -> Result<Material, GraniteError> {
    let name = match material_json["name"].as_str() {
        Some(n) => n.to_string(),
        None => {
            return Err(GraniteError::Config(
                "Config json missing name field in material section".to_string(),
            ))
        }
    };
    let youngs_modulus = match material_json["youngs_modulus"].as_f64() {
        Some(e) => e,
        None => {
            return Err(GraniteError::Config(
                "Config json missing youngs_modulus field in material section".to_string(),
            ))
        }
    };
    let poisson_ratio = match material_json["poisson_ratio"].as_f64() {
        Some(nu) => nu,
        None => {
            return Err(GraniteError::Config(
                "Config json missing poisson_ratio field in material section".to_string(),
            ))
        }
    };

    Ok(Material {
        name,
        youngs_modulus,
        poisson_ratio,
    })
}

fn parse_fixed_faces(config_json: &JsonValue) -> Result<Vec<FixedFace>, GraniteError> {
    let mut fixed_faces = Vec::new();

    if !config_json.has_key("constraints") {
        return Ok(fixed_faces);
    }

    for face_json in config_json["constraints"]["fixed_faces"].members() {
        let surface_id = match face_json["surface_id"].as_i32() {
            Some(id) => id,
            None => {
                return Err(GraniteError::Config(
                    "Fixed face is missing an integer surface_id field".to_string(),
                ))
            }
        };
        let name = match face_json["name"].as_str() {
            Some(n) => n.to_string(),
            None => {
                return Err(GraniteError::Config(format!(
                    "Fixed face on surface {surface_id} is missing a name field"
                )))
            }
        };

        fixed_faces.push(FixedFace { surface_id, name });
    }

    Ok(fixed_faces)
}

fn parse_applied_loads(config_json: &JsonValue) -> Result<Vec<AppliedLoad>, GraniteError> {
    let mut applied_loads = Vec::new();

    if !config_json.has_key("loads") {
        return Ok(applied_loads);
    }

    for load_json in config_json["loads"]["applied_loads"].members() {
        let surface_id = match load_json["surface_id"].as_i32() {
            Some(id) => id,
            None => {
                return Err(GraniteError::Config(
                    "Applied load is missing an integer surface_id field".to_string(),
                ))
            }
        };
        let name = match load_json["name"].as_str() {
            Some(n) => n.to_string(),
            None => {
                return Err(GraniteError::Config(format!(
                    "Applied load on surface {surface_id} is missing a name field"
                )))
            }
        };
        let magnitude = match load_json["magnitude"].as_f64() {
            Some(m) => m,
            None => {
                return Err(GraniteError::Config(format!(
                    "Load '{name}' is missing a numeric magnitude field"
                )))
            }
        };

        let direction_json = &load_json["direction"];
        let x = direction_json["x"].as_f64();
        let y = direction_json["y"].as_f64();
        let z = direction_json["z"].as_f64();
        let direction = match (x, y, z) {
            (Some(x), Some(y), Some(z)) => [x, y, z],
            _ => {
                return Err(GraniteError::Config(format!(
                    "Load '{name}' needs a direction with numeric x, y, and z fields"
                )))
            }
        };

        applied_loads.push(AppliedLoad {
            surface_id,
            name,
            magnitude,
            direction,
        });
    }

    Ok(applied_loads)
}
