//! End-to-end runner tests against in-memory fake services.
//!
//! These cover the job lifecycle guarantees: exactly one terminal event,
//! monotone progress, all-or-nothing pre-processing, handle order
//! preservation, cleanup on failure, and the polling timeout.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use noteworthy_core::models::{
    GenerationRequest, InputFile, ProcessingMode, ProgressEvent, ProgressStatus, RemoteFileRef,
    RemoteFileState,
};
use noteworthy_core::PipelineError;
use noteworthy_pipeline::prompt::PromptPart;
use noteworthy_pipeline::{
    GenerationService, LatexCompiler, ProgressSink, Runner, RunnerConfig, StructuredPrompt,
    TextChunkStream,
};

#[derive(Default)]
struct MockGeneration {
    /// Display names whose upload call fails.
    upload_failures: HashSet<String>,
    /// Initial remote state per display name (default: Active).
    initial_states: HashMap<String, RemoteFileState>,
    /// Poll responses per remote name, consumed in order (then Active).
    poll_states: Mutex<HashMap<String, VecDeque<RemoteFileState>>>,
    /// Chunks yielded by the generation stream; Err(s) becomes a stream error.
    chunks: Vec<Result<String, String>>,
    /// Uploaded (display name, payload) pairs in call order.
    uploads: Mutex<Vec<(String, Bytes)>>,
    deletes: Mutex<Vec<String>>,
    streamed_prompts: Mutex<Vec<StructuredPrompt>>,
    stream_calls: AtomicU32,
}

impl MockGeneration {
    fn with_chunks(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| Ok(c.to_string())).collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl GenerationService for MockGeneration {
    async fn upload_file(
        &self,
        bytes: Bytes,
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFileRef, PipelineError> {
        if self.upload_failures.contains(display_name) {
            return Err(PipelineError::FileUpload(format!(
                "upload rejected for {}",
                display_name
            )));
        }
        self.uploads
            .lock()
            .unwrap()
            .push((display_name.to_string(), bytes));
        Ok(RemoteFileRef {
            name: format!("files/{}", display_name),
            uri: format!("uri://{}", display_name),
            mime_type: mime_type.to_string(),
            state: self
                .initial_states
                .get(display_name)
                .copied()
                .unwrap_or(RemoteFileState::Active),
        })
    }

    async fn get_file(&self, remote_name: &str) -> Result<RemoteFileRef, PipelineError> {
        let state = self
            .poll_states
            .lock()
            .unwrap()
            .get_mut(remote_name)
            .and_then(VecDeque::pop_front)
            .unwrap_or(RemoteFileState::Active);
        let display_name = remote_name.strip_prefix("files/").unwrap_or(remote_name);
        Ok(RemoteFileRef {
            name: remote_name.to_string(),
            uri: format!("uri://{}", display_name),
            mime_type: "application/pdf".to_string(),
            state,
        })
    }

    async fn stream_generate(
        &self,
        prompt: &StructuredPrompt,
        _model_id: &str,
    ) -> Result<TextChunkStream, PipelineError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.streamed_prompts.lock().unwrap().push(prompt.clone());
        let items: Vec<Result<String, PipelineError>> = self
            .chunks
            .iter()
            .map(|chunk| match chunk {
                Ok(text) => Ok(text.clone()),
                Err(message) => Err(PipelineError::GenerationStream(message.clone())),
            })
            .collect();
        Ok(Box::pin(stream::iter(items)))
    }

    async fn delete_file(&self, remote_name: &str) -> Result<(), PipelineError> {
        self.deletes.lock().unwrap().push(remote_name.to_string());
        Ok(())
    }
}

struct MockCompiler {
    result: Result<Vec<u8>, String>,
    compiled: Mutex<Vec<String>>,
}

impl MockCompiler {
    fn ok() -> Self {
        Self {
            result: Ok(b"%PDF-1.5 fake".to_vec()),
            compiled: Mutex::new(Vec::new()),
        }
    }

    fn failing(diagnostic: &str) -> Self {
        Self {
            result: Err(diagnostic.to_string()),
            compiled: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LatexCompiler for MockCompiler {
    async fn compile(&self, document_source: &str) -> Result<Bytes, PipelineError> {
        self.compiled
            .lock()
            .unwrap()
            .push(document_source.to_string());
        match &self.result {
            Ok(bytes) => Ok(Bytes::from(bytes.clone())),
            Err(diagnostic) => Err(PipelineError::Compilation {
                diagnostic: diagnostic.clone(),
            }),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn send(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn test_config(spool_root: &std::path::Path) -> RunnerConfig {
    RunnerConfig {
        poll_interval: Duration::ZERO,
        max_poll_attempts: 3,
        spool_root: spool_root.to_path_buf(),
        model_tiers: HashMap::from([("standard".to_string(), "test-model".to_string())]),
        ..RunnerConfig::default()
    }
}

fn make_runner(
    generation: Arc<MockGeneration>,
    compiler: Arc<MockCompiler>,
    spool_root: &std::path::Path,
) -> Runner {
    Runner::new(
        generation,
        compiler,
        "HEADER\n<content>\nFOOTER".to_string(),
        test_config(spool_root),
    )
}

fn image(name: &str) -> InputFile {
    InputFile {
        name: name.to_string(),
        bytes: vec![1, 2, 3],
        declared_mime_type: "image/png".to_string(),
    }
}

fn pdf(name: &str) -> InputFile {
    InputFile {
        name: name.to_string(),
        bytes: vec![4, 5, 6],
        declared_mime_type: "application/pdf".to_string(),
    }
}

fn request(files: Vec<InputFile>) -> GenerationRequest {
    GenerationRequest {
        files,
        processing_mode: ProcessingMode::Transcription,
        model_tier: "standard".to_string(),
        custom_instruction: None,
    }
}

fn assert_single_terminal(events: &[ProgressEvent]) {
    let terminal_positions: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.status.is_terminal())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(
        terminal_positions.len(),
        1,
        "expected exactly one terminal event, got {:?}",
        events.iter().map(|e| e.status).collect::<Vec<_>>()
    );
    assert_eq!(
        terminal_positions[0],
        events.len() - 1,
        "terminal event must be the last event"
    );
}

fn assert_monotone_progress(events: &[ProgressEvent]) {
    let mut last = 0u8;
    for event in events {
        if event.status == ProgressStatus::Error {
            continue;
        }
        if let Some(p) = event.progress {
            assert!(p >= last, "progress regressed: {} after {}", p, last);
            last = p;
        }
    }
}

#[tokio::test]
async fn test_successful_image_job() {
    let spool = tempfile::tempdir().unwrap();
    let generation = Arc::new(MockGeneration::with_chunks(&[
        "```latex\n\\section*{A}\n",
        "content\n```",
    ]));
    let compiler = Arc::new(MockCompiler::ok());
    let runner = make_runner(generation.clone(), compiler.clone(), spool.path());
    let sink = RecordingSink::default();

    let output = runner
        .run(request(vec![image("notes.png")]), &sink)
        .await
        .unwrap();

    assert_eq!(output.fragment, "\\section*{A}\ncontent");
    assert_eq!(&output.pdf[..], b"%PDF-1.5 fake");

    let events = sink.events();
    assert_eq!(events[0].status, ProgressStatus::Thinking);
    assert_single_terminal(&events);
    assert_monotone_progress(&events);
    let last = events.last().unwrap();
    assert_eq!(last.status, ProgressStatus::Complete);
    assert_eq!(last.content.as_deref(), Some("\\section*{A}\ncontent"));
    assert_eq!(last.progress, Some(100));

    // The compiled document is the composed template, not the bare fragment.
    let compiled = compiler.compiled.lock().unwrap();
    assert_eq!(compiled.len(), 1);
    assert!(compiled[0].starts_with("HEADER\n"));
    assert!(compiled[0].contains("\\section*{A}"));

    // The uploaded payload is the spooled copy of the submitted bytes.
    {
        let uploads = generation.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "notes.png");
        assert_eq!(&uploads[0].1[..], &[1, 2, 3]);
    }

    // Image-kind remote objects are not explicitly deleted.
    assert!(generation.deletes.lock().unwrap().is_empty());
    // Spool directory is gone.
    assert_eq!(std::fs::read_dir(spool.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_streaming_events_carry_full_accumulated_text() {
    let spool = tempfile::tempdir().unwrap();
    let generation = Arc::new(MockGeneration::with_chunks(&["alpha ", "beta ", "gamma"]));
    let compiler = Arc::new(MockCompiler::ok());
    let runner = make_runner(generation, compiler, spool.path());
    let sink = RecordingSink::default();

    runner
        .run(request(vec![image("n.png")]), &sink)
        .await
        .unwrap();

    let streaming: Vec<String> = sink
        .events()
        .iter()
        .filter(|e| e.status == ProgressStatus::Processing)
        .filter_map(|e| e.content.clone())
        .filter(|c| c != "Starting the AI model...")
        .collect();
    assert_eq!(streaming, vec!["alpha ", "alpha beta ", "alpha beta gamma"]);
    // Replacement semantics: each event's text extends the previous one.
    for pair in streaming.windows(2) {
        assert!(pair[1].starts_with(&pair[0]));
    }
}

#[tokio::test]
async fn test_all_or_nothing_preprocessing() {
    let spool = tempfile::tempdir().unwrap();
    let generation = Arc::new(MockGeneration {
        upload_failures: HashSet::from(["b.png".to_string()]),
        chunks: vec![Ok("never streamed".to_string())],
        ..Default::default()
    });
    let compiler = Arc::new(MockCompiler::ok());
    let runner = make_runner(generation.clone(), compiler.clone(), spool.path());
    let sink = RecordingSink::default();

    let err = runner
        .run(
            request(vec![image("a.png"), image("b.png"), image("c.png")]),
            &sink,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::FileUpload(_)));

    // The generation stage is never entered.
    assert_eq!(generation.stream_calls.load(Ordering::SeqCst), 0);
    assert!(compiler.compiled.lock().unwrap().is_empty());
    // c.png is never uploaded either: the failure aborts the sequence.
    let uploaded: Vec<String> = generation
        .uploads
        .lock()
        .unwrap()
        .iter()
        .map(|(name, _)| name.clone())
        .collect();
    assert_eq!(uploaded, vec!["a.png"]);

    let events = sink.events();
    assert_single_terminal(&events);
    let last = events.last().unwrap();
    assert_eq!(last.status, ProgressStatus::Error);
    assert!(last
        .error
        .as_deref()
        .unwrap()
        .starts_with("GEMINI_UPLOAD_ERROR: "));
}

#[tokio::test]
async fn test_handle_order_preserved_with_mixed_kinds() {
    let spool = tempfile::tempdir().unwrap();
    let generation = Arc::new(MockGeneration {
        initial_states: HashMap::from([("b.pdf".to_string(), RemoteFileState::Processing)]),
        poll_states: Mutex::new(HashMap::from([(
            "files/b.pdf".to_string(),
            VecDeque::from([RemoteFileState::Processing, RemoteFileState::Active]),
        )])),
        chunks: vec![Ok("body".to_string())],
        ..Default::default()
    });
    let compiler = Arc::new(MockCompiler::ok());
    let runner = make_runner(generation.clone(), compiler, spool.path());
    let sink = RecordingSink::default();

    runner
        .run(
            request(vec![image("a.png"), pdf("b.pdf"), image("c.png")]),
            &sink,
        )
        .await
        .unwrap();

    let prompts = generation.streamed_prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    let uris: Vec<&str> = prompts[0].messages[0]
        .parts
        .iter()
        .filter_map(|part| match part {
            PromptPart::FileData(fd) => Some(fd.file_uri.as_str()),
            PromptPart::Text(_) => None,
        })
        .collect();
    assert_eq!(uris, vec!["uri://a.png", "uri://b.pdf", "uri://c.png"]);
}

#[tokio::test]
async fn test_progress_monotone_across_document_and_generation() {
    let spool = tempfile::tempdir().unwrap();
    let generation = Arc::new(MockGeneration {
        initial_states: HashMap::from([("b.pdf".to_string(), RemoteFileState::Processing)]),
        poll_states: Mutex::new(HashMap::from([(
            "files/b.pdf".to_string(),
            VecDeque::from([RemoteFileState::Processing, RemoteFileState::Active]),
        )])),
        chunks: vec![Ok("x".to_string()), Ok("y".to_string())],
        ..Default::default()
    });
    let compiler = Arc::new(MockCompiler::ok());
    let runner = make_runner(generation, compiler, spool.path());
    let sink = RecordingSink::default();

    runner.run(request(vec![pdf("b.pdf")]), &sink).await.unwrap();

    let events = sink.events();
    assert!(events
        .iter()
        .any(|e| e.status == ProgressStatus::ProcessingPdf));
    assert_monotone_progress(&events);
    assert_single_terminal(&events);

    // Generation resumes above the document band.
    let model_start = events
        .iter()
        .find(|e| e.content.as_deref() == Some("Starting the AI model..."))
        .unwrap();
    assert!(model_start.progress.unwrap() >= 65);
}

#[tokio::test]
async fn test_cleanup_on_compile_failure() {
    let spool = tempfile::tempdir().unwrap();
    let generation = Arc::new(MockGeneration {
        initial_states: HashMap::from([("b.pdf".to_string(), RemoteFileState::Processing)]),
        poll_states: Mutex::new(HashMap::from([(
            "files/b.pdf".to_string(),
            VecDeque::from([RemoteFileState::Active]),
        )])),
        chunks: vec![Ok("body".to_string())],
        ..Default::default()
    });
    let compiler = Arc::new(MockCompiler::failing("! Undefined control sequence."));
    let runner = make_runner(generation.clone(), compiler, spool.path());
    let sink = RecordingSink::default();

    let err = runner
        .run(request(vec![image("a.png"), pdf("b.pdf")]), &sink)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Compilation { .. }));

    // The document handle is deleted exactly once despite the failure;
    // the image handle is left alone.
    assert_eq!(*generation.deletes.lock().unwrap(), vec!["files/b.pdf"]);
    // The spool directory is removed too.
    assert_eq!(std::fs::read_dir(spool.path()).unwrap().count(), 0);

    let events = sink.events();
    assert_single_terminal(&events);
    let last = events.last().unwrap();
    assert!(last
        .error
        .as_deref()
        .unwrap()
        .contains("! Undefined control sequence."));
}

#[tokio::test]
async fn test_poll_timeout_yields_processing_timeout() {
    let spool = tempfile::tempdir().unwrap();
    let generation = Arc::new(MockGeneration {
        initial_states: HashMap::from([("b.pdf".to_string(), RemoteFileState::Processing)]),
        poll_states: Mutex::new(HashMap::from([(
            "files/b.pdf".to_string(),
            VecDeque::from(vec![RemoteFileState::Processing; 10]),
        )])),
        chunks: vec![Ok("never".to_string())],
        ..Default::default()
    });
    let compiler = Arc::new(MockCompiler::ok());
    let runner = make_runner(generation.clone(), compiler, spool.path());
    let sink = RecordingSink::default();

    let err = runner
        .run(request(vec![pdf("b.pdf")]), &sink)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::FileProcessingTimeout { .. }));
    assert_eq!(err.kind(), "PDF_PROCESSING_TIMEOUT");

    // The stuck remote file is still cleaned up.
    assert_eq!(*generation.deletes.lock().unwrap(), vec!["files/b.pdf"]);
    assert_single_terminal(&sink.events());
}

#[tokio::test]
async fn test_processing_failed_remotely() {
    let spool = tempfile::tempdir().unwrap();
    let generation = Arc::new(MockGeneration {
        initial_states: HashMap::from([("b.pdf".to_string(), RemoteFileState::Processing)]),
        poll_states: Mutex::new(HashMap::from([(
            "files/b.pdf".to_string(),
            VecDeque::from([RemoteFileState::Failed]),
        )])),
        ..Default::default()
    });
    let compiler = Arc::new(MockCompiler::ok());
    let runner = make_runner(generation, compiler, spool.path());
    let sink = RecordingSink::default();

    let err = runner
        .run(request(vec![pdf("b.pdf")]), &sink)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "PDF_PROCESSING_FAILED");
}

#[tokio::test]
async fn test_mid_stream_error_discards_partial_output() {
    let spool = tempfile::tempdir().unwrap();
    let generation = Arc::new(MockGeneration {
        chunks: vec![
            Ok("some partial ".to_string()),
            Ok("output ".to_string()),
            Err("connection reset".to_string()),
        ],
        ..Default::default()
    });
    let compiler = Arc::new(MockCompiler::ok());
    let runner = make_runner(generation, compiler.clone(), spool.path());
    let sink = RecordingSink::default();

    let err = runner
        .run(request(vec![image("n.png")]), &sink)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "GEMINI_STREAM_ERROR");

    // Partial output is never upgraded to success: no complete event, no
    // compile attempt.
    assert!(compiler.compiled.lock().unwrap().is_empty());
    let events = sink.events();
    assert_single_terminal(&events);
    assert_eq!(events.last().unwrap().status, ProgressStatus::Error);
}

#[tokio::test]
async fn test_unknown_model_tier_fails_fast() {
    let spool = tempfile::tempdir().unwrap();
    let generation = Arc::new(MockGeneration::with_chunks(&["x"]));
    let compiler = Arc::new(MockCompiler::ok());
    let runner = make_runner(generation.clone(), compiler, spool.path());
    let sink = RecordingSink::default();

    let mut req = request(vec![image("n.png")]);
    req.model_tier = "turbo".to_string();
    let err = runner.run(req, &sink).await.unwrap_err();
    assert_eq!(err.kind(), "INVALID_REQUEST");

    // Nothing was uploaded before the tier check.
    assert!(generation.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_file_list_is_rejected() {
    let spool = tempfile::tempdir().unwrap();
    let generation = Arc::new(MockGeneration::with_chunks(&["x"]));
    let compiler = Arc::new(MockCompiler::ok());
    let runner = make_runner(generation, compiler, spool.path());
    let sink = RecordingSink::default();

    let err = runner.run(request(vec![]), &sink).await.unwrap_err();
    assert_eq!(err.kind(), "INVALID_REQUEST");
    let events = sink.events();
    assert_single_terminal(&events);
}
