//! Generation job runner: the job lifecycle state machine.
//!
//! One runner is shared by all jobs; each call to [`Runner::run`] owns one
//! `GenerationJob` and drives it through
//! `Created → PreparingFiles → Generating → Sanitizing → Compiling →
//! Complete`, with `Failed` absorbing from every non-terminal state.
//! Exactly one terminal progress event is emitted per job, and cleanup of
//! local and remote resources runs after it regardless of outcome.
//!
//! Progress percentages are a heuristic: document pre-processing and text
//! generation occupy disjoint bands of the scale, and every emission is
//! clamped so the reported value never regresses within a job.

use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use async_trait::async_trait;
use bytes::Bytes;

use noteworthy_core::models::{
    GenerationRequest, ProgressEvent, UploadedFileHandle,
};
use noteworthy_core::{LogLevel, PipelineError};

use crate::classifier::{preprocess_file, FileKind, PollSettings};
use crate::compose::substitute_fragment;
use crate::prompt::assemble_prompt;
use crate::sanitize::sanitize;
use crate::traits::{GenerationService, LatexCompiler, ProgressSink};

// Progress bands. Generation starts at 5% for image-only requests, or
// resumes at 65% when document pre-processing already walked the 10-50%
// band, so the two stages never overlap.
const GENERATING_START: u8 = 5;
const GENERATING_START_AFTER_DOCUMENT: u8 = 65;
const GENERATING_CEILING: u8 = 95;
const COMPILING_PROGRESS: u8 = 97;

const ASSUMED_STREAM_CHUNKS: u32 = 120;

#[derive(Clone)]
pub struct RunnerConfig {
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    /// Optional ceiling on the whole generation stream. `None` preserves the
    /// reference behavior of relying on the remote service's own limits.
    pub generation_timeout: Option<Duration>,
    /// Optional ceiling on the compile call.
    pub compile_timeout: Option<Duration>,
    /// Assumed chunk-count total used for the streaming progress estimate.
    pub assumed_stream_chunks: u32,
    /// Base directory for per-job spool directories.
    pub spool_root: PathBuf,
    /// Opaque tier string → backend model identifier.
    pub model_tiers: HashMap<String, String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_poll_attempts: 60,
            generation_timeout: None,
            compile_timeout: None,
            assumed_stream_chunks: ASSUMED_STREAM_CHUNKS,
            spool_root: std::env::temp_dir(),
            model_tiers: HashMap::new(),
        }
    }
}

/// Result of one successful pipeline run. The sanitized fragment also rides
/// in the terminal `complete` event; the binary artifact only here.
#[derive(Debug)]
pub struct JobOutput {
    pub fragment: String,
    pub pdf: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Created,
    PreparingFiles,
    Generating,
    Sanitizing,
    Compiling,
    Complete,
    Failed,
}

/// Live state of one in-flight run. Exclusively owned by the control flow
/// that created it; never persisted.
struct GenerationJob {
    id: Uuid,
    state: JobState,
    accumulated_text: String,
    pending_cleanup: Vec<UploadedFileHandle>,
    spool_dir: Option<PathBuf>,
}

impl GenerationJob {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: JobState::Created,
            accumulated_text: String::new(),
            pending_cleanup: Vec::new(),
            spool_dir: None,
        }
    }

    fn transition(&mut self, next: JobState) {
        tracing::debug!(job_id = %self.id, from = ?self.state, to = ?next, "Job state transition");
        self.state = next;
    }
}

/// Clamps `progress` so it never decreases across the events of one job.
struct MonotonicSink<'a> {
    inner: &'a dyn ProgressSink,
    high: AtomicU8,
}

impl<'a> MonotonicSink<'a> {
    fn new(inner: &'a dyn ProgressSink) -> Self {
        Self {
            inner,
            high: AtomicU8::new(0),
        }
    }
}

#[async_trait]
impl ProgressSink for MonotonicSink<'_> {
    async fn send(&self, mut event: ProgressEvent) {
        if let Some(p) = event.progress {
            let clamped = p.max(self.high.fetch_max(p, Ordering::Relaxed));
            event.progress = Some(clamped);
        }
        self.inner.send(event).await;
    }
}

pub struct Runner {
    generation: Arc<dyn GenerationService>,
    compiler: Arc<dyn LatexCompiler>,
    /// Full-document template with one `<content>` substitution point.
    template: String,
    config: RunnerConfig,
}

impl Runner {
    pub fn new(
        generation: Arc<dyn GenerationService>,
        compiler: Arc<dyn LatexCompiler>,
        template: String,
        config: RunnerConfig,
    ) -> Self {
        Self {
            generation,
            compiler,
            template,
            config,
        }
    }

    /// Run one job to its terminal event.
    ///
    /// Emits exactly one `complete` or `error` event on `sink`, then cleans
    /// up the job's spool directory and remote document handles (best
    /// effort, logged, never escalated) before returning.
    pub async fn run(
        &self,
        request: GenerationRequest,
        sink: &dyn ProgressSink,
    ) -> Result<JobOutput, PipelineError> {
        let mut job = GenerationJob::new();
        tracing::info!(
            job_id = %job.id,
            files = request.files.len(),
            mode = request.processing_mode.as_str(),
            tier = %request.model_tier,
            "Starting generation job"
        );

        let sink = MonotonicSink::new(sink);
        let result = self.run_to_completion(&request, &mut job, &sink).await;

        match &result {
            Ok(output) => {
                job.transition(JobState::Complete);
                tracing::info!(job_id = %job.id, fragment_len = output.fragment.len(), "Job complete");
                sink.send(ProgressEvent::complete(output.fragment.clone()))
                    .await;
            }
            Err(err) => {
                job.transition(JobState::Failed);
                match err.log_level() {
                    LogLevel::Debug => tracing::debug!(job_id = %job.id, error = %err, kind = err.kind(), "Job failed"),
                    LogLevel::Warn => tracing::warn!(job_id = %job.id, error = %err, kind = err.kind(), "Job failed"),
                    LogLevel::Error => tracing::error!(job_id = %job.id, error = %err, kind = err.kind(), "Job failed"),
                }
                sink.send(ProgressEvent::error(err)).await;
            }
        }

        // After the terminal event, never before it.
        self.cleanup(&mut job).await;
        result
    }

    /// Run the pipeline through sanitization only, skipping composition and
    /// compilation. Used by the synchronous HTTP fallback; emits no terminal
    /// event but still performs full cleanup.
    pub async fn generate_fragment(
        &self,
        request: GenerationRequest,
        sink: &dyn ProgressSink,
    ) -> Result<String, PipelineError> {
        let mut job = GenerationJob::new();
        tracing::info!(
            job_id = %job.id,
            files = request.files.len(),
            mode = request.processing_mode.as_str(),
            "Starting generate-only job"
        );
        let sink = MonotonicSink::new(sink);
        let result = self.produce_fragment(&request, &mut job, &sink).await;
        match &result {
            Ok(fragment) => {
                job.transition(JobState::Complete);
                tracing::info!(job_id = %job.id, fragment_len = fragment.len(), "Generate-only job complete");
            }
            Err(err) => {
                job.transition(JobState::Failed);
                tracing::warn!(job_id = %job.id, error = %err, kind = err.kind(), "Generate-only job failed");
            }
        }
        self.cleanup(&mut job).await;
        result
    }

    async fn run_to_completion(
        &self,
        request: &GenerationRequest,
        job: &mut GenerationJob,
        sink: &dyn ProgressSink,
    ) -> Result<JobOutput, PipelineError> {
        let fragment = self.produce_fragment(request, job, sink).await?;

        job.transition(JobState::Compiling);
        sink.send(ProgressEvent::compiling(
            "Compiling your document...",
            COMPILING_PROGRESS,
        ))
        .await;
        let document = substitute_fragment(&self.template, &fragment);
        let compile = self.compiler.compile(&document);
        let pdf = match self.config.compile_timeout {
            Some(limit) => tokio::time::timeout(limit, compile)
                .await
                .map_err(|_| PipelineError::Compilation {
                    diagnostic: "compilation timed out".to_string(),
                })??,
            None => compile.await?,
        };

        Ok(JobOutput { fragment, pdf })
    }

    /// Pre-process files, stream generation, sanitize. Common to both the
    /// full run and the generate-only path.
    async fn produce_fragment(
        &self,
        request: &GenerationRequest,
        job: &mut GenerationJob,
        sink: &dyn ProgressSink,
    ) -> Result<String, PipelineError> {
        if request.files.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "no files provided".to_string(),
            ));
        }
        // Fail fast on an undefined tier before any remote work.
        let model_id = self
            .config
            .model_tiers
            .get(&request.model_tier)
            .cloned()
            .ok_or_else(|| {
                PipelineError::InvalidRequest(format!(
                    "unknown model tier '{}'",
                    request.model_tier
                ))
            })?;

        job.transition(JobState::PreparingFiles);
        sink.send(ProgressEvent::thinking("Preparing to process your notes..."))
            .await;

        let spooled = self.spool_request(request, job).await?;

        let poll = PollSettings {
            interval: self.config.poll_interval,
            max_attempts: self.config.max_poll_attempts,
        };
        let mut handles = Vec::with_capacity(request.files.len());
        let mut had_document = false;
        for (file, spooled_path) in request.files.iter().zip(&spooled) {
            if crate::classifier::classify(&file.name, &file.declared_mime_type)
                == FileKind::Document
            {
                had_document = true;
            }
            let handle = preprocess_file(
                self.generation.as_ref(),
                file,
                spooled_path,
                &poll,
                sink,
                &mut job.pending_cleanup,
            )
            .await?;
            handles.push(handle);
        }

        job.transition(JobState::Generating);
        let start = if had_document {
            GENERATING_START_AFTER_DOCUMENT
        } else {
            GENERATING_START
        };
        sink.send(ProgressEvent::processing("Starting the AI model...", start))
            .await;

        let prompt = assemble_prompt(
            request.processing_mode,
            request.custom_instruction.as_deref(),
            &handles,
        );
        let mut stream = self
            .generation
            .stream_generate(&prompt, &model_id)
            .await?;

        let assumed_chunks = self.config.assumed_stream_chunks.max(1);
        let accumulated = &mut job.accumulated_text;
        let consume = async {
            let mut chunks: u32 = 0;
            while let Some(chunk) = stream.next().await {
                let text = chunk?;
                accumulated.push_str(&text);
                chunks += 1;
                let estimate = estimate_progress(start, chunks, assumed_chunks);
                // Full replacement text, not a delta.
                sink.send(ProgressEvent::processing(accumulated.clone(), estimate))
                    .await;
            }
            Ok::<(), PipelineError>(())
        };
        match self.config.generation_timeout {
            Some(limit) => tokio::time::timeout(limit, consume)
                .await
                .map_err(|_| {
                    PipelineError::GenerationStream("generation timed out".to_string())
                })??,
            None => consume.await?,
        }

        job.transition(JobState::Sanitizing);
        Ok(sanitize(&job.accumulated_text))
    }

    /// Write the submitted files into a per-job spool directory and return
    /// their paths in request order; uploads read from these paths. Filenames
    /// are namespaced with a random id so concurrent jobs never collide.
    async fn spool_request(
        &self,
        request: &GenerationRequest,
        job: &mut GenerationJob,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let dir = self.config.spool_root.join(format!("noteworthy-{}", job.id));
        tokio::fs::create_dir_all(&dir).await?;
        let mut paths = Vec::with_capacity(request.files.len());
        for file in &request.files {
            let path = dir.join(format!("{}-{}", Uuid::new_v4(), safe_file_name(&file.name)));
            tokio::fs::write(&path, &file.bytes).await?;
            paths.push(path);
        }
        tracing::debug!(job_id = %job.id, dir = %dir.display(), "Spooled request files");
        job.spool_dir = Some(dir);
        Ok(paths)
    }

    /// Best-effort terminal cleanup: spool directory, then each remote
    /// document handle exactly once. Failures are logged and never change
    /// the job's already-determined outcome.
    async fn cleanup(&self, job: &mut GenerationJob) {
        if let Some(dir) = job.spool_dir.take() {
            if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
                tracing::warn!(job_id = %job.id, error = %err, dir = %dir.display(), "Failed to remove spool directory");
            }
        }
        for handle in job.pending_cleanup.drain(..) {
            match self.generation.delete_file(&handle.remote_name).await {
                Ok(()) => {
                    tracing::debug!(job_id = %job.id, remote_name = %handle.remote_name, "Deleted remote file")
                }
                Err(err) => {
                    tracing::warn!(job_id = %job.id, error = %err, remote_name = %handle.remote_name, "Failed to delete remote file")
                }
            }
        }
    }
}

/// Streaming progress estimate: chunk count against an assumed total,
/// scaled into the band between `start` and the generation ceiling. An
/// approximation, monotone but deliberately inexact.
fn estimate_progress(start: u8, chunks: u32, assumed_total: u32) -> u8 {
    let span = (GENERATING_CEILING - start) as u32;
    let gained = (chunks * span / assumed_total).min(span);
    start + gained as u8
}

/// Strip path components and shell-hostile characters from a client-supplied
/// filename before it touches the filesystem.
fn safe_file_name(filename: &str) -> String {
    let base = std::path::Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    if base.contains("..") {
        return "file".to_string();
    }
    let cleaned: String = base
        .chars()
        .take(255)
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}
