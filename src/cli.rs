use crate::config::settings::SolverConfig;
use crate::config::types::{ErrorKind, ScaleUnits, SolveOptions, SolveResult};
use crate::exec::executor::resolve_all;
use crate::exec::{Executor, SolveContext};
use crate::extract::camera::{
    analyse_image, CameraAnalysis, DetectionSource, FieldOfView, RECOMMENDED_UNITS,
};
use crate::safety::workspace::ScratchArea;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plate-solve an image and print the result as JSON
    Solve {
        /// Image to solve (jpg, jpeg, png, fits, fit)
        #[arg(long)]
        image: PathBuf,
        /// Lower bound of the image scale
        #[arg(long)]
        scale_low: Option<f64>,
        /// Upper bound of the image scale
        #[arg(long)]
        scale_high: Option<f64>,
        /// Units for the scale bounds (degwidth, arcminwidth, arcsecperpix)
        #[arg(long, value_parser = parse_scale_units, default_value = "arcminwidth")]
        scale_units: ScaleUnits,
        /// Downsample factor
        #[arg(long, default_value_t = 2)]
        downsample: u32,
        /// First index depth to try
        #[arg(long, default_value_t = 10)]
        depth_low: u32,
        /// Last index depth to try
        #[arg(long, default_value_t = 20)]
        depth_high: u32,
        /// Right ascension hint in degrees
        #[arg(long, allow_hyphen_values = true)]
        ra: Option<f64>,
        /// Declination hint in degrees
        #[arg(long, allow_hyphen_values = true)]
        dec: Option<f64>,
        /// Search radius around the hint in degrees
        #[arg(long)]
        radius: Option<f64>,
        /// Keep staged input and solver byproducts after the run
        #[arg(long)]
        keep_temp_files: bool,
        /// Wall clock limit in seconds (capped at 300)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Read camera EXIF data and suggest scale bounds for a solve
    Analyse {
        /// Image to analyse (jpg, jpeg, png)
        #[arg(long)]
        image: PathBuf,
    },
    /// Run an allowlisted companion tool and print its output
    Exec {
        /// Tool name (solve-field, image2xy, fit-wcs, wcs-xy2rd, wcs-rd2xy)
        binary: String,
        /// Arguments passed through unchanged
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Check which solver binaries are installed
    CheckDeps {
        /// Also print `solve-field --version`
        #[arg(long)]
        verbose: bool,
    },
    /// Remove staged files left behind by retained or interrupted runs
    Sweep {
        /// Minimum age in seconds of files to remove
        #[arg(long, default_value_t = 3600)]
        max_age: u64,
    },
}

fn parse_scale_units(value: &str) -> std::result::Result<ScaleUnits, String> {
    ScaleUnits::parse(value).ok_or_else(|| format!("unknown scale units: {}", value))
}

/// JSON shape printed by `solve`
#[derive(Debug, Serialize)]
pub struct SolveResponse {
    pub solved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ra: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixel_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wcs_header: Option<IndexMap<String, String>>,
    pub solve_time: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub raw_output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<SolveResult> for SolveResponse {
    fn from(result: SolveResult) -> Self {
        Self {
            solved: result.solved,
            ra: result.ra,
            dec: result.dec,
            pixel_scale: result.pixel_scale,
            rotation: result.rotation,
            field_width: result.field_width,
            field_height: result.field_height,
            wcs_header: result.wcs_header,
            solve_time: result.solve_time,
            raw_output: result.raw_output,
            error_kind: result.error_kind,
            error: result.error_message,
        }
    }
}

/// JSON shape printed by `analyse`
#[derive(Debug, Serialize)]
pub struct AnalyseResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_name: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_from: Option<DetectionSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fov: Option<FieldOfView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_low: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_units: Option<ScaleUnits>,
    pub has_exif: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalyseResponse {
    pub fn failure(message: String) -> Self {
        Self {
            success: false,
            make: None,
            model: None,
            focal_length: None,
            sensor_name: None,
            detected_from: None,
            fov: None,
            scale_low: None,
            scale_high: None,
            scale_units: None,
            has_exif: false,
            error: Some(message),
        }
    }
}

impl From<CameraAnalysis> for AnalyseResponse {
    fn from(analysis: CameraAnalysis) -> Self {
        let bounds = analysis.scale_bounds();
        Self {
            success: true,
            make: analysis.make,
            model: analysis.model,
            focal_length: analysis.focal_length,
            sensor_name: analysis.sensor.map(|s| s.name),
            detected_from: analysis.detected_from,
            fov: analysis.fov,
            scale_low: bounds.map(|(low, _)| low),
            scale_high: bounds.map(|(_, high)| high),
            scale_units: Some(RECOMMENDED_UNITS),
            has_exif: analysis.has_exif,
            error: None,
        }
    }
}

pub fn run() -> Result<()> {
    env_logger::init();

    if !cfg!(unix) {
        eprintln!("Error: platesolve requires a Unix-like system (process groups, signals)");
        std::process::exit(1);
    }

    let cli = Cli::parse();
    let config = SolverConfig::from_env().context("loading ASTROMETRY_* configuration")?;
    let executor = Executor::new(config);

    match cli.command {
        Commands::Solve {
            image,
            scale_low,
            scale_high,
            scale_units,
            downsample,
            depth_low,
            depth_high,
            ra,
            dec,
            radius,
            keep_temp_files,
            timeout,
        } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let filename = image
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();

            let options = SolveOptions {
                scale_low,
                scale_high,
                scale_units,
                downsample: Some(downsample),
                depth_low: Some(depth_low),
                depth_high: Some(depth_high),
                ra,
                dec,
                radius,
                keep_temp_files,
            };
            let ctx = match timeout {
                Some(secs) => SolveContext::with_timeout(Duration::from_secs(secs)),
                None => SolveContext::background(),
            };

            let result = executor.solve_upload(&ctx, &bytes, &filename, &options)?;
            let response = SolveResponse::from(result);
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Commands::Analyse { image } => {
            let (response, ok) = match analyse_image(&image, executor.config()) {
                Ok(analysis) => (AnalyseResponse::from(analysis), true),
                Err(e) => {
                    log::warn!("Analysis failed: {}", e);
                    (AnalyseResponse::failure(format!("failed to analyse image: {}", e)), false)
                }
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Exec { binary, args } => {
            let output = executor.execute_named(&binary, &args, &SolveContext::background())?;
            println!("{}", output);
            Ok(())
        }
        Commands::CheckDeps { verbose } => check_dependencies(&executor, verbose),
        Commands::Sweep { max_age } => {
            let scratch = ScratchArea::new(&executor.config().scratch_dir);
            let removed = scratch.sweep_stale(Duration::from_secs(max_age))?;
            let json_result = serde_json::json!({
                "scratch_dir": scratch.root(),
                "removed": removed,
            });
            println!("{}", serde_json::to_string_pretty(&json_result)?);
            Ok(())
        }
    }
}

fn check_dependencies(executor: &Executor, verbose: bool) -> Result<()> {
    let config = executor.config();
    let mut missing = Vec::new();

    println!("Checking solver binaries...");
    for (binary, path) in resolve_all(config.binary_dir.as_deref()) {
        match path {
            Some(path) => println!("  {:<12} {}", binary.name(), path.display()),
            None => {
                println!("  {:<12} NOT FOUND", binary.name());
                missing.push(binary.name());
            }
        }
    }

    match &config.index_path {
        Some(index) if index.is_dir() => println!("  {:<12} {}", "indexes", index.display()),
        Some(index) => println!("  {:<12} {} (missing)", "indexes", index.display()),
        None => println!("  {:<12} not configured", "indexes"),
    }

    if verbose {
        match executor.execute_named("solve-field", &["--version"], &SolveContext::background()) {
            Ok(version) => println!("solve-field version: {}", version),
            Err(e) => println!("solve-field version: unavailable ({})", e),
        }
    }

    if missing.is_empty() {
        println!("All solver binaries available");
        Ok(())
    } else {
        eprintln!("Missing: {}", missing.join(", "));
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_arguments_parse() {
        let cli = Cli::try_parse_from([
            "platesolve",
            "solve",
            "--image",
            "m31.jpg",
            "--scale-units",
            "degwidth",
            "--dec",
            "-5.4",
            "--keep-temp-files",
        ])
        .unwrap();

        match cli.command {
            Commands::Solve {
                image,
                scale_units,
                dec,
                downsample,
                keep_temp_files,
                ..
            } => {
                assert_eq!(image, PathBuf::from("m31.jpg"));
                assert_eq!(scale_units, ScaleUnits::DegreesWidth);
                assert_eq!(dec, Some(-5.4));
                assert_eq!(downsample, 2);
                assert!(keep_temp_files);
            }
            _ => panic!("expected solve"),
        }
    }

    #[test]
    fn test_bad_scale_units_rejected() {
        assert!(Cli::try_parse_from([
            "platesolve",
            "solve",
            "--image",
            "x.png",
            "--scale-units",
            "furlongs",
        ])
        .is_err());
    }

    #[test]
    fn test_exec_passes_hyphenated_args() {
        let cli =
            Cli::try_parse_from(["platesolve", "exec", "wcs-xy2rd", "-w", "f.wcs", "-x", "1"])
                .unwrap();
        match cli.command {
            Commands::Exec { binary, args } => {
                assert_eq!(binary, "wcs-xy2rd");
                assert_eq!(args, vec!["-w", "f.wcs", "-x", "1"]);
            }
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn test_analyse_arguments_parse() {
        let cli = Cli::try_parse_from(["platesolve", "analyse", "--image", "m42.jpg"]).unwrap();
        match cli.command {
            Commands::Analyse { image } => assert_eq!(image, PathBuf::from("m42.jpg")),
            _ => panic!("expected analyse"),
        }
    }

    #[test]
    fn test_analyse_response_carries_recommendation() {
        let analysis = CameraAnalysis::from_metadata(
            Some("Canon".to_string()),
            Some("Canon EOS 6D".to_string()),
            Some(135.0),
            None,
        );
        let json = serde_json::to_value(AnalyseResponse::from(analysis)).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["has_exif"], true);
        assert_eq!(json["sensor_name"], "Canon EOS 6D");
        assert_eq!(json["detected_from"], "sensor_database");
        assert_eq!(json["scale_units"], "arcminwidth");
        let width = json["fov"]["width_arcmin"].as_f64().unwrap();
        assert!(json["scale_low"].as_f64().unwrap() < width);
        assert!(json["scale_high"].as_f64().unwrap() > width);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_analyse_failure_response() {
        let json =
            serde_json::to_value(AnalyseResponse::failure("no EXIF".to_string())).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["has_exif"], false);
        assert_eq!(json["error"], "no EXIF");
        assert!(json.get("fov").is_none());
        assert!(json.get("scale_units").is_none());
    }

    #[test]
    fn test_response_omits_absent_fields() {
        let response = SolveResponse::from(SolveResult::unsolved(1.5, String::new()));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["solved"], false);
        assert_eq!(json["solve_time"], 1.5);
        assert!(json.get("ra").is_none());
        assert!(json.get("error").is_none());
    }
}
