//! texlive.net latexcgi client.
//!
//! Submits a complete document as a multipart form and expects a PDF back.
//! Any non-PDF response body is the engine's log output and is surfaced
//! verbatim as the compilation diagnostic.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::Form;
use std::time::Duration;

use noteworthy_core::PipelineError;
use noteworthy_pipeline::LatexCompiler;

pub const TEXLIVE_COMPILE_URL: &str = "https://texlive.net/cgi-bin/latexcgi";

const DOCUMENT_FILENAME: &str = "document.tex";
const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Clone)]
pub struct TexliveCompiler {
    compile_url: String,
    engine: String,
    client: reqwest::Client,
}

impl TexliveCompiler {
    pub fn new(compile_url: String, engine: String) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            compile_url,
            engine,
            client,
        }
    }

    fn form(&self, document_source: &str) -> Form {
        Form::new()
            .text("filecontents[]", document_source.to_string())
            .text("filename[]", DOCUMENT_FILENAME)
            .text("engine", self.engine.clone())
            .text("return", "pdf")
    }
}

#[async_trait]
impl LatexCompiler for TexliveCompiler {
    async fn compile(&self, document_source: &str) -> Result<Bytes, PipelineError> {
        let response = self
            .client
            .post(&self.compile_url)
            .multipart(self.form(document_source))
            .send()
            .await
            .map_err(|err| PipelineError::Compilation {
                diagnostic: format!("compile request failed: {}", err),
            })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        // The service reports failures as a 200 with a text/html log body, so
        // the content type is the real success signal.
        if status.is_success() && content_type.starts_with(PDF_CONTENT_TYPE) {
            let pdf = response
                .bytes()
                .await
                .map_err(|err| PipelineError::Compilation {
                    diagnostic: format!("failed to read compiled PDF: {}", err),
                })?;
            tracing::info!(bytes = pdf.len(), "Compilation succeeded");
            return Ok(pdf);
        }

        let diagnostic = response.text().await.unwrap_or_default();
        tracing::warn!(%status, %content_type, "Compilation rejected");
        Err(PipelineError::Compilation { diagnostic })
    }
}

