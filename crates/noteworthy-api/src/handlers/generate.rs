//! Synchronous HTTP fallback: run the pipeline through sanitization and
//! return the cleaned LaTeX fragment, without compiling it.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;

use noteworthy_core::models::{GenerationRequest, InputFile, ProcessingMode};
use noteworthy_core::PipelineError;
use noteworthy_pipeline::NoopSink;

use crate::error::HttpAppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub cleaned_latex: String,
}

/// `POST /api/latex/generate`
///
/// Multipart form: repeated `noteImage` file parts plus `processType`,
/// `modelType` and `customPrompt` text fields. No progress reporting; the
/// caller gets the final fragment or an error.
pub async fn generate_latex(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<GenerateResponse>, HttpAppError> {
    let mut files: Vec<InputFile> = Vec::new();
    let mut process_type = ProcessingMode::Transcription;
    let mut model_type = "standard".to_string();
    let mut custom_prompt: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        PipelineError::InvalidRequest(format!("malformed multipart body: {}", err))
    })? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "noteImage" => {
                let name = field.file_name().unwrap_or("upload").to_string();
                let declared_mime_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|err| {
                    PipelineError::InvalidRequest(format!(
                        "failed to read file '{}': {}",
                        name, err
                    ))
                })?;
                files.push(InputFile {
                    name,
                    bytes: bytes.to_vec(),
                    declared_mime_type,
                });
            }
            "processType" => {
                process_type = read_text(field, "processType")
                    .await?
                    .parse()
                    .map_err(PipelineError::InvalidRequest)?;
            }
            "modelType" => {
                model_type = read_text(field, "modelType").await?;
            }
            "customPrompt" => {
                let text = read_text(field, "customPrompt").await?;
                if !text.is_empty() {
                    custom_prompt = Some(text);
                }
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    let request = GenerationRequest {
        files,
        processing_mode: process_type,
        model_tier: model_type,
        custom_instruction: custom_prompt,
    };
    let cleaned_latex = state.runner.generate_fragment(request, &NoopSink).await?;
    Ok(Json(GenerateResponse { cleaned_latex }))
}

async fn read_text(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<String, PipelineError> {
    field.text().await.map_err(|err| {
        PipelineError::InvalidRequest(format!("failed to read field '{}': {}", name, err))
    })
}
