//! Error types module
//!
//! All pipeline failures are unified under the `PipelineError` enum. Each
//! variant carries a stable machine-readable kind tag that is surfaced to
//! clients in terminal `error` progress events and in HTTP error bodies, so
//! callers can distinguish failure classes without parsing prose.
//!
//! Cleanup failures are deliberately absent: deleting temp files or remote
//! handles is best effort, logged where it happens, and never allowed to
//! mask an already-determined job outcome.

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like remote service rejections
    Warn,
    /// Error level - for unexpected failures
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("File upload failed: {0}")]
    FileUpload(String),

    #[error("File processing failed: {0}")]
    FileProcessingFailed(String),

    #[error("File processing timed out after {attempts} polls")]
    FileProcessingTimeout { attempts: u32 },

    #[error("Generation request failed: {0}")]
    GenerationApi(String),

    #[error("Generation stream failed: {0}")]
    GenerationStream(String),

    #[error("LaTeX compilation failed")]
    Compilation { diagnostic: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable kind tag, never renamed once shipped. These values predate this
    /// implementation and are relied on by clients.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::FileUpload(_) => "GEMINI_UPLOAD_ERROR",
            PipelineError::FileProcessingFailed(_) => "PDF_PROCESSING_FAILED",
            PipelineError::FileProcessingTimeout { .. } => "PDF_PROCESSING_TIMEOUT",
            PipelineError::GenerationApi(_) => "GEMINI_GENERATION_ERROR",
            PipelineError::GenerationStream(_) => "GEMINI_STREAM_ERROR",
            PipelineError::Compilation { .. } => "LATEX_TO_PDF_COMPILATION_ERROR",
            PipelineError::InvalidRequest(_) => "INVALID_REQUEST",
            PipelineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Human-readable detail without the kind tag.
    pub fn detail(&self) -> String {
        match self {
            PipelineError::Compilation { diagnostic } => diagnostic.clone(),
            other => other.to_string(),
        }
    }

    /// Message shape used in terminal error events: `<KIND>: <detail>`.
    pub fn client_message(&self) -> String {
        format!("{}: {}", self.kind(), self.detail())
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PipelineError::InvalidRequest(_) => 400,
            // Compiler rejections are a property of the submitted document,
            // not of the server.
            PipelineError::Compilation { .. } => 422,
            PipelineError::FileUpload(_)
            | PipelineError::FileProcessingFailed(_)
            | PipelineError::GenerationApi(_)
            | PipelineError::GenerationStream(_) => 502,
            PipelineError::FileProcessingTimeout { .. } => 504,
            PipelineError::Internal(_) => 500,
        }
    }

    pub fn log_level(&self) -> LogLevel {
        match self {
            PipelineError::InvalidRequest(_) => LogLevel::Debug,
            PipelineError::Compilation { .. } => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Internal(format!("JSON error: {}", err))
    }
}
