//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the sync engine:
//! - Logging and tracing infrastructure
//! - Configuration management
//!
//! Every other core crate depends on the conventions established here:
//! `tracing` for diagnostics and a validated [`config::CoreConfig`] for
//! settings.

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
