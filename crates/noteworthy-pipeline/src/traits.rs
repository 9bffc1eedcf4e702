//! Service abstractions consumed by the job runner.
//!
//! The API wires these to the real Gemini and texlive.net clients in
//! `noteworthy-services`; tests substitute in-memory fakes. Clients are
//! constructed once at process start and injected at job creation, never
//! held as process-wide mutable state.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use noteworthy_core::models::{ProgressEvent, RemoteFileRef};
use noteworthy_core::PipelineError;

use crate::prompt::StructuredPrompt;

/// Lazily produced, finite, non-restartable sequence of generated text
/// chunks. The producer is remote and paced by network arrival; consuming it
/// is the runner's only blocking operation while generating.
pub type TextChunkStream = Pin<Box<dyn Stream<Item = Result<String, PipelineError>> + Send>>;

/// The multimodal content-generation service (upload / poll / stream / delete).
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Upload one file. Single call, never retried here; retry policy, if
    /// any, belongs to the caller.
    async fn upload_file(
        &self,
        bytes: Bytes,
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFileRef, PipelineError>;

    /// Fetch the current remote file resource, including its post-upload
    /// processing state and the uri/mime to reference it with.
    async fn get_file(&self, remote_name: &str) -> Result<RemoteFileRef, PipelineError>;

    /// Start a streaming generation call for the given prompt and backend
    /// model identifier.
    async fn stream_generate(
        &self,
        prompt: &StructuredPrompt,
        model_id: &str,
    ) -> Result<TextChunkStream, PipelineError>;

    /// Best-effort deletion of a remote file. Callers log failures and move on.
    async fn delete_file(&self, remote_name: &str) -> Result<(), PipelineError>;
}

/// The external typesetting/compilation service.
#[async_trait]
pub trait LatexCompiler: Send + Sync {
    /// Compile a complete source document. On rejection the error carries the
    /// remote service's diagnostic text verbatim; it is never parsed here.
    async fn compile(&self, document_source: &str) -> Result<Bytes, PipelineError>;
}

/// Receives progress events for one job. Delivery is at-most-once and
/// backpressure-free; implementations must not block the runner on a slow
/// subscriber.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn send(&self, event: ProgressEvent);
}
