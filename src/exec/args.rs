//! Translation of [`SolveOptions`] into a `solve-field` argument vector.
//!
//! Pure and total: every field maps to zero or one flag/value pair, and only
//! populated fields are emitted so the solver applies its own defaults for the
//! rest.

use crate::config::types::SolveOptions;
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

pub const FLAG_SCALE_LOW: &str = "--scale-low";
pub const FLAG_SCALE_HIGH: &str = "--scale-high";
pub const FLAG_SCALE_UNITS: &str = "--scale-units";
pub const FLAG_DOWNSAMPLE: &str = "--downsample";
pub const FLAG_DEPTH: &str = "--depth";
pub const FLAG_RA: &str = "--ra";
pub const FLAG_DEC: &str = "--dec";
pub const FLAG_RADIUS: &str = "--radius";
pub const FLAG_BACKEND_CONFIG: &str = "--backend-config";
pub const FLAG_CPULIMIT: &str = "--cpulimit";

/// Inputs to one argument vector
#[derive(Debug, Clone, Copy)]
pub struct SolveInvocation<'a> {
    pub options: &'a SolveOptions,
    pub input: &'a Path,
    pub backend_config: Option<&'a Path>,
    pub time_limit: Duration,
}

/// Flags derived from the options alone, in a fixed order
pub fn option_flags(options: &SolveOptions) -> Vec<(&'static str, String)> {
    let mut flags = Vec::new();

    if let Some(low) = options.scale_low {
        flags.push((FLAG_SCALE_LOW, low.to_string()));
    }
    if let Some(high) = options.scale_high {
        flags.push((FLAG_SCALE_HIGH, high.to_string()));
    }
    if options.scale_low.is_some() || options.scale_high.is_some() {
        flags.push((FLAG_SCALE_UNITS, options.scale_units.as_solver_arg().to_string()));
    }
    if let Some(downsample) = options.downsample {
        flags.push((FLAG_DOWNSAMPLE, downsample.to_string()));
    }
    if let Some(depth) = depth_range(options.depth_low, options.depth_high) {
        flags.push((FLAG_DEPTH, depth));
    }
    // Position hint passes through even when incomplete; the solver ignores
    // a partial hint on its own.
    if let Some(ra) = options.ra {
        flags.push((FLAG_RA, ra.to_string()));
    }
    if let Some(dec) = options.dec {
        flags.push((FLAG_DEC, dec.to_string()));
    }
    if let Some(radius) = options.radius {
        flags.push((FLAG_RADIUS, radius.to_string()));
    }

    flags
}

fn depth_range(low: Option<u32>, high: Option<u32>) -> Option<String> {
    match (low, high) {
        (Some(low), Some(high)) => Some(format!("{}-{}", low, high)),
        (Some(low), None) => Some(low.to_string()),
        (None, Some(high)) => Some(format!("1-{}", high)),
        (None, None) => None,
    }
}

/// Full argument vector, input path last
pub fn build_solve_args(invocation: &SolveInvocation<'_>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--overwrite".into(), "--no-plots".into()];

    let cpu_secs = invocation.time_limit.as_secs().max(1);
    args.push(FLAG_CPULIMIT.into());
    args.push(cpu_secs.to_string().into());

    for (flag, value) in option_flags(invocation.options) {
        args.push(flag.into());
        args.push(value.into());
    }

    if let Some(config) = invocation.backend_config {
        args.push(FLAG_BACKEND_CONFIG.into());
        args.push(config.as_os_str().to_os_string());
    }

    args.push(invocation.input.as_os_str().to_os_string());
    args
}
