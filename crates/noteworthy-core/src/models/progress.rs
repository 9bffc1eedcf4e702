//! Progress event models: the wire contract for job status reporting.
//!
//! For any job the server emits zero or more non-terminal events followed by
//! exactly one terminal event (`complete` or `error`); nothing follows a
//! terminal event. `progress` is a heuristic estimate, monotonically
//! non-decreasing across the non-error events of a job, never a measured
//! quantity.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Thinking,
    Processing,
    ProcessingPdf,
    Compiling,
    Complete,
    Error,
}

impl ProgressStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressStatus::Complete | ProgressStatus::Error)
    }
}

/// One unit of information sent to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    /// Status line, or the accumulated/final generated text while streaming.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// 0-100, present only for phases that report incremental progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Present only when `status` is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn thinking(content: impl Into<String>) -> Self {
        Self {
            status: ProgressStatus::Thinking,
            content: Some(content.into()),
            progress: None,
            error: None,
        }
    }

    pub fn processing(content: impl Into<String>, progress: u8) -> Self {
        Self {
            status: ProgressStatus::Processing,
            content: Some(content.into()),
            progress: Some(progress),
            error: None,
        }
    }

    pub fn processing_pdf(content: impl Into<String>, progress: u8) -> Self {
        Self {
            status: ProgressStatus::ProcessingPdf,
            content: Some(content.into()),
            progress: Some(progress),
            error: None,
        }
    }

    pub fn compiling(content: impl Into<String>, progress: u8) -> Self {
        Self {
            status: ProgressStatus::Compiling,
            content: Some(content.into()),
            progress: Some(progress),
            error: None,
        }
    }

    pub fn complete(content: impl Into<String>) -> Self {
        Self {
            status: ProgressStatus::Complete,
            content: Some(content.into()),
            progress: Some(100),
            error: None,
        }
    }

    pub fn error(err: &PipelineError) -> Self {
        Self {
            status: ProgressStatus::Error,
            content: None,
            progress: None,
            error: Some(err.client_message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_values() {
        assert_eq!(
            serde_json::to_string(&ProgressStatus::ProcessingPdf).unwrap(),
            "\"processing_pdf\""
        );
        assert_eq!(
            serde_json::to_string(&ProgressStatus::Thinking).unwrap(),
            "\"thinking\""
        );
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let event = ProgressEvent::thinking("Preparing to process your notes...");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "thinking");
        assert!(json.get("progress").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_error_event_shape() {
        let err = PipelineError::FileUpload("quota exceeded".into());
        let event = ProgressEvent::error(&err);
        assert!(event.status.is_terminal());
        let json = serde_json::to_value(&event).unwrap();
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("GEMINI_UPLOAD_ERROR: "));
        assert!(json.get("content").is_none());
    }

    #[test]
    fn test_complete_is_terminal_at_100() {
        let event = ProgressEvent::complete("\\section*{Notes}");
        assert!(event.status.is_terminal());
        assert_eq!(event.progress, Some(100));
    }
}
