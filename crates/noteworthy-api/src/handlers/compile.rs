//! Compile-only endpoint: sanitize submitted LaTeX, compose it into the
//! document template and return the compiled PDF.

use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use noteworthy_core::PipelineError;
use noteworthy_pipeline::compose::substitute_fragment;
use noteworthy_pipeline::sanitize;

use crate::error::HttpAppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    pub latex_code: String,
}

/// `POST /api/generate-pdf`
///
/// On success the body is the PDF itself; compiler rejections surface as 422
/// with the engine's diagnostic in `details`.
pub async fn generate_pdf(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CompileRequest>,
) -> Result<Response, HttpAppError> {
    let fragment = sanitize(&body.latex_code);
    if fragment.is_empty() {
        return Err(PipelineError::InvalidRequest(
            "latexCode is empty after sanitization".to_string(),
        )
        .into());
    }

    let document = substitute_fragment(&state.template, &fragment);
    let pdf = state.compiler.compile(&document).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (
                header::CONTENT_DISPOSITION,
                "inline; filename=\"document.pdf\"",
            ),
        ],
        pdf,
    )
        .into_response())
}
