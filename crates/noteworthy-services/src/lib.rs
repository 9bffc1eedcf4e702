//! Noteworthy Services
//!
//! Real clients behind the pipeline's service traits: the Gemini
//! generation/files backend and the texlive.net compilation service.

pub mod gemini;
pub mod texlive;

pub use gemini::GeminiClient;
pub use texlive::TexliveCompiler;
