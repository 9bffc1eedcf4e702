//! Generation request models.

use serde::{Deserialize, Serialize};

/// One submitted source file, immutable once accepted.
#[derive(Clone)]
pub struct InputFile {
    pub name: String,
    pub bytes: Vec<u8>,
    /// MIME type as declared by the client; may be empty or generic.
    pub declared_mime_type: String,
}

impl std::fmt::Debug for InputFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputFile")
            .field("name", &self.name)
            .field("bytes", &format_args!("{} bytes", self.bytes.len()))
            .field("declared_mime_type", &self.declared_mime_type)
            .finish()
    }
}

/// What the model is asked to do with the notes. Determines both the
/// transcription instruction and the LaTeX conversion instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Concise revision-sheet summary.
    Summary,
    /// Full transcription, including diagram descriptions.
    Transcription,
    /// Expanded study notes with extra detail.
    Expansion,
}

impl ProcessingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMode::Summary => "summary",
            ProcessingMode::Transcription => "transcription",
            ProcessingMode::Expansion => "expansion",
        }
    }
}

impl std::str::FromStr for ProcessingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(ProcessingMode::Summary),
            "transcription" => Ok(ProcessingMode::Transcription),
            "expansion" => Ok(ProcessingMode::Expansion),
            other => Err(format!("unknown processing mode '{}'", other)),
        }
    }
}

/// Input to one pipeline run. Constructed at request ingress, consumed once
/// by the runner, never mutated.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Ordered, non-empty sequence of source files.
    pub files: Vec<InputFile>,
    pub processing_mode: ProcessingMode,
    /// Opaque tier string; resolved to a backend model id by config.
    pub model_tier: String,
    /// Free text appended verbatim at the end of the assembled prompt.
    pub custom_instruction: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_mode_wire_values() {
        assert_eq!(
            serde_json::to_string(&ProcessingMode::Summary).unwrap(),
            "\"summary\""
        );
        let mode: ProcessingMode = serde_json::from_str("\"expansion\"").unwrap();
        assert_eq!(mode, ProcessingMode::Expansion);
    }

    #[test]
    fn test_input_file_debug_hides_bytes() {
        let file = InputFile {
            name: "notes.png".into(),
            bytes: vec![0u8; 1024],
            declared_mime_type: "image/png".into(),
        };
        let rendered = format!("{:?}", file);
        assert!(rendered.contains("1024 bytes"));
        assert!(!rendered.contains("[0,"));
    }
}
