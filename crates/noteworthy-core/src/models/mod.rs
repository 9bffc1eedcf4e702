//! Data models for the application
//!
//! Wire shapes and in-memory job state shared by the pipeline, the service
//! adapters, and the API surface.

mod file;
mod progress;
mod request;

// Re-export all models for convenient imports
pub use file::*;
pub use progress::*;
pub use request::*;
