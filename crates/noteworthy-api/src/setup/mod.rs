//! Application setup and initialization
//!
//! All initialization logic lives here rather than in main.rs: telemetry,
//! service clients, the pipeline runner, and the router.

pub mod routes;
pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};

use noteworthy_core::Config;
use noteworthy_pipeline::{LatexCompiler, Runner, RunnerConfig};
use noteworthy_services::{GeminiClient, TexliveCompiler};

use crate::state::AppState;

const EMBEDDED_TEMPLATE: &str = include_str!("../../templates/main.tex");
const CONTENT_PLACEHOLDER: &str = "<content>";

/// Initialize the entire application
pub fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    crate::telemetry::init_telemetry();
    tracing::info!(environment = %config.environment, "Configuration loaded");

    let template = load_template(&config)?;

    let generation = Arc::new(GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_api_base.clone(),
    ));
    let compiler: Arc<dyn LatexCompiler> = Arc::new(TexliveCompiler::new(
        config.compile_url.clone(),
        config.compile_engine.clone(),
    ));

    let runner_config = RunnerConfig {
        poll_interval: config.poll_interval,
        max_poll_attempts: config.max_poll_attempts,
        generation_timeout: config.generation_timeout,
        compile_timeout: config.compile_timeout,
        model_tiers: config.model_tiers.clone(),
        ..RunnerConfig::default()
    };
    let runner = Arc::new(Runner::new(
        generation,
        compiler.clone(),
        template.clone(),
        runner_config,
    ));

    let state = Arc::new(AppState {
        config: config.clone(),
        runner,
        compiler,
        template,
    });

    let router = routes::setup_routes(&config, state.clone())?;
    Ok((state, router))
}

/// Load the document template, from the configured path when set, otherwise
/// the embedded default. The template must carry a substitution point.
fn load_template(config: &Config) -> Result<String> {
    let template = match &config.template_path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read template from {}", path))?,
        None => EMBEDDED_TEMPLATE.to_string(),
    };
    if !template.contains(CONTENT_PLACEHOLDER) {
        anyhow::bail!("document template has no '{}' placeholder", CONTENT_PLACEHOLDER);
    }
    Ok(template)
}
