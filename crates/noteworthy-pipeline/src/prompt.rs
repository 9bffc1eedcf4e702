//! Prompt assembler: processing mode + custom instruction + file handles →
//! the structured chat prompt sent to the generation backend.
//!
//! Pure functions only. The instruction ordering is significant: the mode
//! instruction and the fixed formatting rules come first, the user's custom
//! instruction is appended last so it cannot override the structural rules
//! placed earlier. This is a soft convention, not a sandboxing guarantee.

use serde::Serialize;

use noteworthy_core::models::{ProcessingMode, UploadedFileHandle};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PromptPart {
    FileData(FileData),
    Text(String),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: String,
    pub parts: Vec<PromptPart>,
}

/// A complete multi-turn generation request body, ready for the backend.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StructuredPrompt {
    pub messages: Vec<PromptMessage>,
}

/// What the model is asked to produce in the transcription turn.
fn transcription_instruction(mode: ProcessingMode) -> &'static str {
    match mode {
        ProcessingMode::Summary => {
            "make a summarised, revision sheet like transcription of these notes that is \
             extremely concise and has only core concepts"
        }
        ProcessingMode::Transcription => {
            "make a full and extended transcription of these notes, including a description \
             of all graphs/diagrams that are present"
        }
        ProcessingMode::Expansion => {
            "expand on all the details in the given notes in order for the user to be able \
             to deeply study this content from the output"
        }
    }
}

/// What the model is asked to produce in the LaTeX conversion turn.
fn latex_instruction(mode: ProcessingMode) -> &'static str {
    match mode {
        ProcessingMode::Summary => {
            "make a summarised, revision sheet like latex of these notes that is extremely \
             concise and has only core concepts and definitions"
        }
        ProcessingMode::Transcription => {
            "make a full transcription of these notes, including all graphs/diagrams that \
             are present"
        }
        ProcessingMode::Expansion => {
            "expand on all the details in the given notes in order for the user to be able \
             to deeply study this content from the output, including all graphs/diagrams \
             that are present and extra ones you deem necessary"
        }
    }
}

/// Fixed formatting directives appended after the mode instruction. The
/// custom environments are provided by the document template; the output is
/// compiled unattended on a constrained engine, hence the package and float
/// restrictions.
const FORMATTING_DIRECTIVES: &str = "\nuse this formatting\n\
for definitions\n\\dfn{Definition Title}{\ncontent\n}\n\
for notes\n\\nt{\ncontent\n}\n\
for theorems\n\\thm{theorem title}{\ncontent\n}\n\
question and answer\n\\qs{Question title}{\nquestion content\n}\n\\sol\nsolution\n\
examples\n\\ex{Question or example title}{\ncontent\n}\n\
algorithms use the algorithm environment with \\KwIn, \\KwOut, \\SetAlgoLined and a \\caption\n\
the commands are already implemented\n\
also, never use ** for bold, always use enumerate/itemize\n\
insert section and subsection where necessary, but ALWAYS use section*{} and subsection*{}\n\
create all graphs/diagrams with tikz or other packages and centre every figure, \
do not use float options such as \\begin{figure}[H] EVER\n\
it is to be compiled without checking, so use as little weird formatting and extra \
packages as possible (eg dont use tdplot_main_coords)\n\
since this code will be added to an existing document, return the body sections\n";

/// Priming turn attributed to the model, mirroring the recorded chat history
/// the backend was tuned against.
const MODEL_PRIMING: [&str; 2] = [
    "The user wants me to transcribe handwritten notes. I need to carefully read and \
     transcribe the notes, and describe all diagrams and graphs present.",
    "Here is the full transcription of the notes...",
];

/// Final user turn that triggers the streamed conversion.
const PROCEED: &str = "Proceed with conversion";

/// Assemble the structured prompt for one generation request.
///
/// File references appear first, in input order, followed by the
/// transcription instruction; the conversion turn carries the mode
/// instruction, the fixed formatting directives, and the verbatim custom
/// instruction last.
pub fn assemble_prompt(
    mode: ProcessingMode,
    custom_instruction: Option<&str>,
    handles: &[UploadedFileHandle],
) -> StructuredPrompt {
    let mut first_turn: Vec<PromptPart> = handles
        .iter()
        .map(|handle| {
            PromptPart::FileData(FileData {
                mime_type: handle.remote_mime_type.clone(),
                file_uri: handle.remote_uri.clone(),
            })
        })
        .collect();
    first_turn.push(PromptPart::Text(transcription_instruction(mode).to_string()));

    let mut conversion = format!(
        "now, take these notes and convert them to a latex code to be added to an existing \
         latex document {}.\n{}",
        latex_instruction(mode),
        FORMATTING_DIRECTIVES
    );
    if let Some(custom) = custom_instruction {
        if !custom.is_empty() {
            conversion.push('\n');
            conversion.push_str(custom);
        }
    }

    StructuredPrompt {
        messages: vec![
            PromptMessage {
                role: "user".to_string(),
                parts: first_turn,
            },
            PromptMessage {
                role: "model".to_string(),
                parts: MODEL_PRIMING
                    .iter()
                    .map(|text| PromptPart::Text(text.to_string()))
                    .collect(),
            },
            PromptMessage {
                role: "user".to_string(),
                parts: vec![PromptPart::Text(conversion)],
            },
            PromptMessage {
                role: "user".to_string(),
                parts: vec![PromptPart::Text(PROCEED.to_string())],
            },
        ],
    }
}
