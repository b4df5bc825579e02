//! Safety and cleanup
//!
//! Run-scoped staging of solver inputs with guaranteed release.

pub mod workspace;
