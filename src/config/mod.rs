//! Configuration
//!
//! - [`types`]: options, results and the error taxonomy
//! - [`settings`]: service configuration loaded from the environment
//! - [`validator`]: upload and option checks

pub mod settings;
pub mod types;
pub mod validator;
