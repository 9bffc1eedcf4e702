//! Noteworthy Pipeline
//!
//! The generation-and-compilation pipeline: file classification and
//! pre-processing, prompt assembly, the streaming job runner and its state
//! machine, output sanitization, and document composition. All external
//! collaborators are reached through the traits in [`traits`], so the whole
//! pipeline is testable against in-memory fakes.

pub mod classifier;
pub mod compose;
pub mod progress;
pub mod prompt;
pub mod runner;
pub mod sanitize;
pub mod traits;

pub use progress::{ChannelSink, NoopSink};
pub use prompt::{assemble_prompt, StructuredPrompt};
pub use runner::{JobOutput, Runner, RunnerConfig};
pub use sanitize::sanitize;
pub use traits::{GenerationService, LatexCompiler, ProgressSink, TextChunkStream};
