//! Application state shared by all handlers.

use std::sync::Arc;

use noteworthy_core::Config;
use noteworthy_pipeline::{LatexCompiler, Runner};

pub struct AppState {
    pub config: Config,
    /// The full generation pipeline (upload, generate, sanitize, compile).
    pub runner: Arc<Runner>,
    /// Direct compiler access for the compile-only endpoint.
    pub compiler: Arc<dyn LatexCompiler>,
    /// Full-document template with one `<content>` substitution point.
    pub template: String,
}
