//! Observability
//!
//! Structured audit events emitted through `log`.

pub mod audit;
