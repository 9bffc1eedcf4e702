//! Remote file models for the generation service's Files API.

use serde::{Deserialize, Serialize};

/// Post-upload processing state reported by the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteFileState {
    Processing,
    Active,
    Failed,
    /// Forward compatibility: states this version does not know about.
    #[serde(other)]
    Unknown,
}

/// A file accepted by the generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFileRef {
    /// Resource name (`files/<id>`), used for polling and deletion.
    pub name: String,
    /// URI referenced in generation prompts.
    pub uri: String,
    pub mime_type: String,
    #[serde(default = "default_state")]
    pub state: RemoteFileState,
}

fn default_state() -> RemoteFileState {
    RemoteFileState::Active
}

/// Remote representation of one input file after pre-processing, owned by
/// the job that created it for the duration of one request.
#[derive(Debug, Clone)]
pub struct UploadedFileHandle {
    pub remote_uri: String,
    pub remote_mime_type: String,
    /// Resource name, kept for cleanup of document-kind files.
    pub remote_name: String,
    /// Document-kind remote objects must be deleted at job end; image-kind
    /// objects are ephemeral on the remote side and are left alone.
    pub is_document_kind: bool,
}
