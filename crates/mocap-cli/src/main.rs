use std::{error::Error, fs, path::Path};

use clap::Parser;
use serde::{Deserialize, Serialize};

use mocap_core::{CalibrationSample, CameraIntrinsics};
use mocap_pipeline::{CalibrationRunner, PoseCalibrationReport, SharedContext};

/// Camera pose calibration from synchronized wand captures.
#[derive(Debug, Parser)]
#[command(author, version, about = "Estimate and refine camera poses from a JSON capture file")]
struct Args {
    /// Path to a JSON file containing a PoseCalibrationInput.
    #[arg(long)]
    input: String,

    /// Skip the essential-matrix chain and only refine the identity poses.
    #[arg(long, default_value_t = false)]
    refine_only: bool,
}

/// On-disk input: per-camera intrinsics plus aligned observation rows.
#[derive(Debug, Serialize, Deserialize)]
struct PoseCalibrationInput {
    cameras: Vec<CameraIntrinsics>,
    samples: Vec<CalibrationSample>,
}

fn load_input(path: &Path) -> Result<PoseCalibrationInput, Box<dyn Error>> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn run(input_path: &str, refine_only: bool) -> Result<String, Box<dyn Error>> {
    let input = load_input(Path::new(input_path))?;
    let intrinsics = input.cameras.iter().map(|c| c.to_matrix()).collect();

    let context = SharedContext::new(intrinsics);
    let runner = CalibrationRunner::new(context);
    let report: PoseCalibrationReport = if refine_only {
        runner.refine_poses(&input.samples)?
    } else {
        runner.calibrate_poses(&input.samples)?
    };

    log::info!(
        "calibrated {} cameras, mean reprojection error {:.6}",
        report.poses.len(),
        report.mean_reproj_error
    );
    Ok(serde_json::to_string_pretty(&report)?)
}

fn main() {
    env_logger::init();
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let json = run(&args.input, args.refine_only)?;
    println!("{json}");
    Ok(())
}
