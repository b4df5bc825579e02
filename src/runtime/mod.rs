//! Runtime guards
//!
//! The closed set of executables this crate will ever spawn.

pub mod security;
