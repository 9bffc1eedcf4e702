//! WebSocket endpoint: real-time generation with streamed progress events.
//!
//! One job at a time per connection. The job itself is spawned and owns a
//! channel-backed progress sink; this handler only forwards events to the
//! socket. A client disconnect stops forwarding but never cancels the job,
//! so cleanup always runs to completion.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use serde::Deserialize;
use tokio::sync::mpsc;

use noteworthy_core::models::{GenerationRequest, InputFile, ProcessingMode, ProgressEvent};
use noteworthy_core::PipelineError;
use noteworthy_pipeline::ChannelSink;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    StartGeneration(StartGeneration),
}

#[derive(Debug, Deserialize)]
struct StartGeneration {
    files: Vec<WsFile>,
    process_type: ProcessingMode,
    #[serde(default = "default_model_type")]
    model_type: String,
    #[serde(default)]
    custom_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WsFile {
    name: String,
    /// Base64 file content, with or without a `data:` URL prefix.
    data: String,
    #[serde(default)]
    mime_type: String,
}

fn default_model_type() -> String {
    "standard".to_string()
}

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    let max_message_bytes = state.config.max_ws_message_bytes;
    ws.max_message_size(max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    while let Some(message) = receiver.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(error = %err, "WebSocket receive error, closing connection");
                break;
            }
        };
        match message {
            Message::Text(text) => {
                let start = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::StartGeneration(start)) => start,
                    Err(err) => {
                        let invalid =
                            PipelineError::InvalidRequest(format!("malformed message: {}", err));
                        send_error(&mut sender, &invalid).await;
                        continue;
                    }
                };
                match build_request(start) {
                    Ok(request) => run_job(&state, &mut sender, request).await,
                    Err(err) => send_error(&mut sender, &err).await,
                }
            }
            Message::Close(_) => break,
            // Ping/pong handled by the protocol layer; binary frames ignored.
            _ => {}
        }
    }
}

/// Spawn one generation job and forward its progress events to the socket
/// until the job emits its terminal event.
async fn run_job(
    state: &Arc<AppState>,
    sender: &mut SplitSink<WebSocket, Message>,
    request: GenerationRequest,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let runner = state.runner.clone();
    let job = tokio::spawn(async move {
        let sink = ChannelSink::new(tx);
        let _ = runner.run(request, &sink).await;
    });

    while let Some(event) = rx.recv().await {
        let frame = match serde_json::to_string(&event) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize progress event");
                continue;
            }
        };
        if sender.send(Message::Text(frame.into())).await.is_err() {
            tracing::debug!("WebSocket client gone mid-job, dropping remaining events");
            break;
        }
    }

    if let Err(err) = job.await {
        tracing::error!(error = %err, "Generation task panicked");
    }
}

async fn send_error(sender: &mut SplitSink<WebSocket, Message>, err: &PipelineError) {
    let event = ProgressEvent::error(err);
    if let Ok(frame) = serde_json::to_string(&event) {
        let _ = sender.send(Message::Text(frame.into())).await;
    }
}

fn build_request(start: StartGeneration) -> Result<GenerationRequest, PipelineError> {
    let mut files = Vec::with_capacity(start.files.len());
    for file in start.files {
        let bytes = decode_file_data(&file.data).map_err(|err| {
            PipelineError::InvalidRequest(format!("invalid file data for '{}': {}", file.name, err))
        })?;
        if bytes.is_empty() {
            return Err(PipelineError::InvalidRequest(format!(
                "file '{}' is empty",
                file.name
            )));
        }
        files.push(InputFile {
            name: file.name,
            bytes,
            declared_mime_type: file.mime_type,
        });
    }
    Ok(GenerationRequest {
        files,
        processing_mode: start.process_type,
        model_tier: start.model_type,
        custom_instruction: start.custom_prompt,
    })
}

fn decode_file_data(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    // Tolerate a `data:<mime>;base64,` prefix from browser FileReader output.
    let payload = if data.starts_with("data:") {
        data.split_once(',').map(|(_, rest)| rest).unwrap_or(data)
    } else {
        data
    };
    STANDARD.decode(payload.trim())
}
