use std::path::Path;
use std::time::Instant;

use clap::Parser;
use log::{error, info};

mod config;
mod datatypes;
mod error;
mod frd;
mod inp;
mod loads;
mod mesher;
mod post_processor;
mod solver;

use error::GraniteError;

/// Static structural analysis pipeline around Gmsh and CalculiX
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to the simulation config json
    #[arg(default_value = "resources/simulation_config.json")]
    config: String,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if let Err(err) = run(&args.config) {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run(config_file: &str) -> Result<(), GraniteError> {
    let start = Instant::now();

    let job = config::load_simulation_job(config_file)?;
    info!("loaded simulation job from {config_file}");

    let base_name = job_base_name(&job.step_file)?;
    let inp_file = format!("{base_name}.inp");
    let frd_file = format!("{base_name}.frd");
    let vtu_file = format!("{base_name}.vtu");

    let mesh = mesher::run(&job, &base_name)?;
    inp::append_boundary_conditions(&inp_file, &job, &mesh)?;
    solver::run(&base_name)?;

    // decode warnings are logged as they are counted
    let (dataset, fields, _stats) = frd::decode_file(&frd_file)?;
    post_processor::write_vtu(&dataset, &fields, &vtu_file)?;

    let elapsed = start.elapsed().as_secs_f32();
    info!("analysis pipeline completed in {elapsed:.1} seconds");
    info!("generated files:");
    for file in [&inp_file, &frd_file, &vtu_file] {
        info!("  - {file}");
    }

    Ok(())
}

/// Derives the job name from the stem of the step file, e.g.
/// `models/bracket.step` becomes `bracket`
fn job_base_name(step_file: &str) -> Result<String, GraniteError> {
    Path::new(step_file)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.to_string())
        .ok_or_else(|| {
            GraniteError::Config(format!(
                "Cannot derive a job name from step file {step_file}"
            ))
        })
}
