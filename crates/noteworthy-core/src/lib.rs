//! Noteworthy Core Library
//!
//! This crate provides the domain models, error taxonomy, and configuration
//! shared across all Noteworthy components. It performs no I/O.

pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::Config;
pub use error::{LogLevel, PipelineError};
