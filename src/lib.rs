//! platesolve: bounded execution of an astrometric plate solver
//!
//! Stages an uploaded image, runs `solve-field` against it under a hard
//! wall-clock budget, and turns the coordinate header it writes into a typed
//! result. Staged files are released on every exit path.
//!
//! # Architecture
//!
//! ## Execution Control ([`exec`])
//! - [`exec::executor`]: Spawn, supervise and classify solver runs
//! - [`exec::args`]: Option-to-flag translation
//! - [`exec::context`]: Caller deadline and cancellation
//!
//! ## Result Extraction ([`extract`])
//! - [`extract::header`]: Header parsing (text lines or FITS cards)
//! - [`extract::wcs`]: Scale, rotation and field size derivation
//! - [`extract::probe`]: Image dimension probing
//! - [`extract::camera`]: EXIF camera metadata and field-of-view estimates
//!
//! ## Safety & Cleanup ([`safety`])
//! - [`safety::workspace`]: Collision-free staging with RAII release
//!
//! ## Runtime Guards ([`runtime`])
//! - [`runtime::security`]: Executable allowlist
//!
//! ## Observability ([`observability`])
//! - [`observability::audit`]: Structured audit events
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: Options, results and the error taxonomy
//! - [`config::settings`]: Environment-driven configuration
//! - [`config::validator`]: Upload and option checks
//!
//! ## Utilities ([`utils`])
//! - [`utils::output`]: Bounded output collection

// Execution Control
pub mod exec;

// Result Extraction
pub mod extract;

// Safety & Cleanup
pub mod safety;

// Runtime Guards
pub mod runtime;

// Observability
pub mod observability;

// Configuration
pub mod config;

// Utilities
pub mod utils;

// CLI entrypoint wiring for the platesolve binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::settings::SolverConfig;
pub use config::types::*;
pub use exec::{Executor, SolveContext};
pub use runtime::security::SolverBinary;
