use std::path::Path;
use std::process::Command;
use std::time::Duration;

use indicatif::ProgressBar;
use log::{error, info};

use crate::error::GraniteError;

/// Runs CalculiX on the prepared solver deck
///
/// Invokes `ccx`, or the binary named by the CALCULIX_PATH environment
/// variable, with the job name. CalculiX reads `{base_name}.inp` and is
/// expected to leave `{base_name}.frd` behind.
///
/// # Arguments
/// * `base_name` - The job name shared by the solver deck and result file
pub fn run(base_name: &str) -> Result<(), GraniteError> {
    let ccx_path = std::env::var("CALCULIX_PATH").unwrap_or_else(|_| "ccx".to_string());

    info!("running {ccx_path} {base_name}");
    let spinner = ProgressBar::new_spinner();
    spinner.set_message("waiting on CalculiX");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = Command::new(&ccx_path).arg(base_name).output();

    spinner.finish_and_clear();

    let output = match result {
        Ok(out) => out,
        Err(err) => {
            return Err(GraniteError::Solver(format!(
                "Failed to start {ccx_path}: {err}"
            )));
        }
    };

    if !output.status.success() {
        error!(
            "CalculiX output:\n{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        return Err(GraniteError::Solver(format!(
            "CalculiX exited with status {}",
            output.status
        )));
    }

    let frd_file = format!("{base_name}.frd");
    if !Path::new(&frd_file).exists() {
        return Err(GraniteError::Solver(format!(
            "CalculiX did not produce {frd_file}"
        )));
    }

    info!("CalculiX run complete");

    Ok(())
}
