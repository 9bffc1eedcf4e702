//! File classifier and pre-processor.
//!
//! Decides whether a submitted file is document-kind (needs the remote
//! upload-then-poll sub-protocol before it can be referenced in a prompt)
//! or image-kind (usable immediately after upload), infers image MIME types
//! from filename extensions, and drives the polling wait for document-kind
//! files while reporting interpolated progress.

use bytes::Bytes;
use std::path::Path;
use std::time::Duration;

use noteworthy_core::models::{
    InputFile, ProgressEvent, RemoteFileRef, RemoteFileState, UploadedFileHandle,
};
use noteworthy_core::PipelineError;

use crate::traits::{GenerationService, ProgressSink};

const PDF_MIME: &str = "application/pdf";

// Document pre-processing occupies the 10-50% band of the progress scale.
const POLL_PROGRESS_FLOOR: u32 = 10;
const POLL_PROGRESS_SPAN: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Document,
}

/// Document-kind decision: explicit PDF mime match, with a filename
/// extension fallback for absent/generic mime types.
pub fn classify(name: &str, declared_mime_type: &str) -> FileKind {
    if declared_mime_type == PDF_MIME || name.to_lowercase().ends_with(".pdf") {
        FileKind::Document
    } else {
        FileKind::Image
    }
}

/// Fixed extension→mime table for image-kind files. The `image/jpeg`
/// default is a deliberate permissive fallback, not a validation error.
pub fn infer_image_mime(name: &str) -> &'static str {
    let extension = name.rsplit('.').next().unwrap_or("").to_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

/// Effective MIME type submitted to the generation service.
pub fn effective_mime(name: &str, declared_mime_type: &str) -> String {
    match classify(name, declared_mime_type) {
        FileKind::Document => PDF_MIME.to_string(),
        FileKind::Image => infer_image_mime(name).to_string(),
    }
}

pub(crate) struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

/// Upload one file and, for document-kind inputs, wait until the remote side
/// reports it ready. Emits a `processing_pdf` event per poll iteration that
/// still reports processing.
///
/// The returned handle's remote object is owned by the calling job until it
/// is deleted. Document-kind uploads are registered in `cleanup` as soon as
/// the remote object exists, so a later polling failure still leaves the
/// job able to delete it.
pub(crate) async fn preprocess_file(
    service: &dyn GenerationService,
    file: &InputFile,
    spooled_path: &Path,
    poll: &PollSettings,
    sink: &dyn ProgressSink,
    cleanup: &mut Vec<UploadedFileHandle>,
) -> Result<UploadedFileHandle, PipelineError> {
    let kind = classify(&file.name, &file.declared_mime_type);
    let mime = effective_mime(&file.name, &file.declared_mime_type);

    // The spooled copy is the job's canonical local file; upload from it.
    let bytes = tokio::fs::read(spooled_path).await?;
    let remote = service
        .upload_file(Bytes::from(bytes), &mime, &file.name)
        .await?;
    tracing::info!(name = %file.name, remote_name = %remote.name, mime = %mime, "Uploaded file");

    if kind == FileKind::Document {
        cleanup.push(UploadedFileHandle {
            remote_uri: remote.uri.clone(),
            remote_mime_type: remote.mime_type.clone(),
            remote_name: remote.name.clone(),
            is_document_kind: true,
        });
    }

    let ready = if kind == FileKind::Document {
        wait_for_processing(service, remote, poll, sink).await?
    } else {
        remote
    };

    Ok(UploadedFileHandle {
        remote_uri: ready.uri,
        remote_mime_type: ready.mime_type,
        remote_name: ready.name,
        is_document_kind: kind == FileKind::Document,
    })
}

async fn wait_for_processing(
    service: &dyn GenerationService,
    uploaded: RemoteFileRef,
    poll: &PollSettings,
    sink: &dyn ProgressSink,
) -> Result<RemoteFileRef, PipelineError> {
    let max_attempts = poll.max_attempts.max(1);
    let mut file = uploaded;
    let mut attempts: u32 = 0;

    while file.state == RemoteFileState::Processing && attempts < max_attempts {
        let percent = attempts * 100 / max_attempts;
        let progress =
            (POLL_PROGRESS_FLOOR + attempts * POLL_PROGRESS_SPAN / max_attempts)
                .min(POLL_PROGRESS_FLOOR + POLL_PROGRESS_SPAN) as u8;
        sink.send(ProgressEvent::processing_pdf(
            format!("PDF is being processed... ({}%)", percent),
            progress,
        ))
        .await;
        tracing::debug!(remote_name = %file.name, attempt = attempts + 1, "PDF still processing");

        tokio::time::sleep(poll.interval).await;
        file = service.get_file(&file.name).await?;
        attempts += 1;
    }

    match file.state {
        RemoteFileState::Failed => Err(PipelineError::FileProcessingFailed(
            "file processing failed on the generation service".to_string(),
        )),
        RemoteFileState::Processing => Err(PipelineError::FileProcessingTimeout { attempts }),
        // Active, or a state this version does not know about; treat as
        // ready and let generation surface any real problem.
        _ => Ok(file),
    }
}
