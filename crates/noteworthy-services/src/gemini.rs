//! Gemini API client: Files API (resumable upload, poll, delete) and
//! streaming content generation over SSE.
//!
//! Implements [`GenerationService`]. All transport and protocol failures are
//! mapped to the pipeline error taxonomy at this boundary; nothing above it
//! sees reqwest types.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use noteworthy_core::models::RemoteFileRef;
use noteworthy_core::PipelineError;
use noteworthy_pipeline::prompt::PromptMessage;
use noteworthy_pipeline::{GenerationService, StructuredPrompt, TextChunkStream};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    api_base: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct UploadStartRequest<'a> {
    file: UploadStartFile<'a>,
}

#[derive(Debug, Serialize)]
struct UploadStartFile<'a> {
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFileRef,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [PromptMessage],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 64,
            max_output_tokens: 65536,
            response_mime_type: "text/plain",
        }
    }
}

// Streaming response chunk. Everything is optional: the final chunk often
// carries usage metadata and no candidate text.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: String, api_base: String) -> Self {
        // No total request timeout here: generation streams are long-lived
        // and bounded by the runner's own limits instead.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            api_key,
            api_base,
            client,
        }
    }

    fn upload_start_url(&self) -> String {
        format!(
            "{}/upload/v1beta/files?key={}",
            self.api_base, self.api_key
        )
    }

    fn file_url(&self, remote_name: &str) -> String {
        // `remote_name` is the full resource name, `files/<id>`.
        format!("{}/v1beta/{}?key={}", self.api_base, remote_name, self.api_key)
    }

    fn stream_generate_url(&self, model_id: &str) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.api_base, model_id, self.api_key
        )
    }
}

#[async_trait]
impl GenerationService for GeminiClient {
    async fn upload_file(
        &self,
        bytes: Bytes,
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFileRef, PipelineError> {
        // Resumable upload protocol, start then upload+finalize in one shot.
        let start = self
            .client
            .post(self.upload_start_url())
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&UploadStartRequest {
                file: UploadStartFile { display_name },
            })
            .send()
            .await
            .map_err(|err| PipelineError::FileUpload(format!("upload start failed: {}", err)))?;

        if !start.status().is_success() {
            let status = start.status();
            let body = start.text().await.unwrap_or_default();
            return Err(PipelineError::FileUpload(format!(
                "upload start rejected with status {}: {}",
                status, body
            )));
        }

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                PipelineError::FileUpload("upload start response missing upload url".to_string())
            })?;

        let response = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header("X-Goog-Upload-Offset", "0")
            .body(bytes)
            .send()
            .await
            .map_err(|err| PipelineError::FileUpload(format!("upload failed: {}", err)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::FileUpload(format!(
                "upload rejected with status {}: {}",
                status, body
            )));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|err| PipelineError::FileUpload(format!("invalid upload response: {}", err)))?;
        Ok(uploaded.file)
    }

    async fn get_file(&self, remote_name: &str) -> Result<RemoteFileRef, PipelineError> {
        let response = self
            .client
            .get(self.file_url(remote_name))
            .send()
            .await
            .map_err(|err| {
                PipelineError::FileProcessingFailed(format!("file status request failed: {}", err))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::FileProcessingFailed(format!(
                "file status request rejected with status {}: {}",
                status, body
            )));
        }

        response.json().await.map_err(|err| {
            PipelineError::FileProcessingFailed(format!("invalid file status response: {}", err))
        })
    }

    async fn stream_generate(
        &self,
        prompt: &StructuredPrompt,
        model_id: &str,
    ) -> Result<TextChunkStream, PipelineError> {
        let body = GenerateContentRequest {
            contents: &prompt.messages,
            generation_config: GenerationConfig::default(),
        };
        let response = self
            .client
            .post(self.stream_generate_url(model_id))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|err| PipelineError::GenerationApi(format!("generation request failed: {}", err)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::GenerationApi(format!(
                "generation rejected with status {}: {}",
                status, text
            )));
        }

        let bytes = Box::pin(response.bytes_stream());
        let stream = futures::stream::unfold(
            (bytes, SseLineBuffer::default(), VecDeque::new()),
            |(mut bytes, mut buffer, mut pending)| async move {
                loop {
                    if let Some(item) = pending.pop_front() {
                        return Some((item, (bytes, buffer, pending)));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            for line in buffer.push(&chunk) {
                                match parse_sse_line(&line) {
                                    Ok(Some(text)) => pending.push_back(Ok(text)),
                                    Ok(None) => {}
                                    Err(err) => pending.push_back(Err(err)),
                                }
                            }
                        }
                        Some(Err(err)) => {
                            pending.push_back(Err(PipelineError::GenerationStream(format!(
                                "stream transport error: {}",
                                err
                            ))));
                        }
                        None => {
                            if let Some(line) = buffer.flush() {
                                match parse_sse_line(&line) {
                                    Ok(Some(text)) => pending.push_back(Ok(text)),
                                    Ok(None) => {}
                                    Err(err) => pending.push_back(Err(err)),
                                }
                            }
                            return pending
                                .pop_front()
                                .map(|item| (item, (bytes, buffer, pending)));
                        }
                    }
                }
            },
        );
        Ok(Box::pin(stream))
    }

    async fn delete_file(&self, remote_name: &str) -> Result<(), PipelineError> {
        let response = self
            .client
            .delete(self.file_url(remote_name))
            .send()
            .await
            .map_err(|err| delete_error(format!("request failed: {}", err)))?;

        if !response.status().is_success() {
            return Err(delete_error(format!(
                "rejected with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Deletes are cleanup, not generation work; their failures are classified
/// as internal so cleanup logs never read as generation errors.
fn delete_error(detail: String) -> PipelineError {
    PipelineError::Internal(format!("file delete {}", detail))
}

/// Splits an SSE byte stream into complete lines across arbitrary chunk
/// boundaries. Non-UTF8 bytes are replaced rather than rejected.
#[derive(Default)]
struct SseLineBuffer {
    buf: String,
}

impl SseLineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
        let mut lines = Vec::new();
        while let Some(at) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=at).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    /// Hands back the trailing unterminated line, if any.
    fn flush(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

/// One SSE line → the candidate text it carries, if any. Blank lines and
/// comments yield nothing; a data line that fails to parse is a stream error.
fn parse_sse_line(line: &str) -> Result<Option<String>, PipelineError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }

    let chunk: StreamChunk = serde_json::from_str(data).map_err(|err| {
        PipelineError::GenerationStream(format!("malformed stream chunk: {}", err))
    })?;

    let text: String = chunk
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .filter_map(|part| part.text)
        .collect();
    if text.is_empty() {
        Ok(None)
    } else {
        Ok(Some(text))
    }
}
