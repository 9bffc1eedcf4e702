//! Configuration module
//!
//! Environment-driven configuration for the API server and the generation
//! pipeline. Model tiers are opaque strings mapped to backend model
//! identifiers; the mapping can be overridden with `MODEL_TIER_MAP`
//! (`tier=model,tier=model,...`). An unknown tier at request time fails the
//! request fast rather than silently falling back.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

const SERVER_PORT: u16 = 4000;
const POLL_INTERVAL_SECS: u64 = 5;
const MAX_POLL_ATTEMPTS: u32 = 60;
const MAX_WS_MESSAGE_BYTES: usize = 50 * 1024 * 1024;
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
const COMPILE_URL: &str = "https://texlive.net/cgi-bin/latexcgi";
const COMPILE_ENGINE: &str = "xelatex";

/// Full application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub environment: String,
    // Generation service
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub model_tiers: HashMap<String, String>,
    // Compilation service
    pub compile_url: String,
    pub compile_engine: String,
    // Pipeline knobs
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub generation_timeout: Option<Duration>,
    pub compile_timeout: Option<Duration>,
    // Transport
    pub max_ws_message_bytes: usize,
    // Document template override (embedded default when unset)
    pub template_path: Option<String>,
}

fn default_model_tiers() -> HashMap<String, String> {
    HashMap::from([
        ("standard".to_string(), "gemini-2.0-flash".to_string()),
        ("pro".to_string(), "gemini-2.0-pro-exp-02-05".to_string()),
        (
            "thinking".to_string(),
            "gemini-2.0-flash-thinking-exp-01-21".to_string(),
        ),
    ])
}

fn parse_model_tiers(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (tier, model) = pair.split_once('=')?;
            let tier = tier.trim();
            let model = model.trim();
            if tier.is_empty() || model.is_empty() {
                return None;
            }
            Some((tier.to_string(), model.to_string()))
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let is_production =
            environment.to_lowercase() == "production" || environment.to_lowercase() == "prod";
        if is_production && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }
        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let gemini_api_key = env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY must be set"))?;

        let model_tiers = env::var("MODEL_TIER_MAP")
            .map(|raw| parse_model_tiers(&raw))
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(default_model_tiers);

        Ok(Self {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            environment,
            gemini_api_key,
            gemini_api_base: env::var("GEMINI_API_BASE")
                .unwrap_or_else(|_| GEMINI_API_BASE.to_string()),
            model_tiers,
            compile_url: env::var("LATEX_COMPILE_URL").unwrap_or_else(|_| COMPILE_URL.to_string()),
            compile_engine: env::var("LATEX_COMPILE_ENGINE")
                .unwrap_or_else(|_| COMPILE_ENGINE.to_string()),
            poll_interval: Duration::from_secs(
                env::var("FILE_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(POLL_INTERVAL_SECS),
            ),
            max_poll_attempts: env::var("FILE_MAX_POLL_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_POLL_ATTEMPTS),
            generation_timeout: env::var("GENERATION_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
            compile_timeout: env::var("COMPILE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
            max_ws_message_bytes: env::var("MAX_WS_MESSAGE_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_WS_MESSAGE_BYTES),
            template_path: env::var("LATEX_TEMPLATE_PATH").ok(),
        })
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    /// Resolve an opaque model tier to a backend model identifier.
    pub fn resolve_model_tier(&self, tier: &str) -> Option<&str> {
        self.model_tiers.get(tier).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tier_map_covers_known_tiers() {
        let tiers = default_model_tiers();
        assert_eq!(tiers.get("standard").map(String::as_str), Some("gemini-2.0-flash"));
        assert!(tiers.contains_key("pro"));
        assert!(tiers.contains_key("thinking"));
        assert!(!tiers.contains_key("turbo"));
    }

    #[test]
    fn test_parse_model_tiers() {
        let tiers = parse_model_tiers("fast=gemini-2.0-flash, best = gemini-2.0-pro-exp-02-05");
        assert_eq!(tiers.len(), 2);
        assert_eq!(
            tiers.get("best").map(String::as_str),
            Some("gemini-2.0-pro-exp-02-05")
        );
    }

    #[test]
    fn test_parse_model_tiers_skips_malformed_pairs() {
        let tiers = parse_model_tiers("fast=m1,broken,=m2,empty=");
        assert_eq!(tiers.len(), 1);
        assert!(tiers.contains_key("fast"));
    }
}
