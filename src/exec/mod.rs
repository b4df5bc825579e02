//! Execution control
//!
//! Argument translation, deadlines, and supervised invocation of the solver.

pub mod args;
pub mod context;
pub mod executor;

pub use context::SolveContext;
pub use executor::{Executor, ProcessOutcome};
