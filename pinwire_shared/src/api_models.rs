//! Shared data models for the observer channel, the status endpoint and the
//! build gateway.

use crate::pin_state::PinStateSnapshot;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Messages an observer may send to the engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Submit firmware source to be built and run.
    CompileRun { sketch: String },
    /// Stop the running session.
    StopCode,
    /// Force a pin to a level, as if external wiring drove it.
    InputChange { pin: i64, state: bool },
}

impl ClientMessage {
    /// Every `type` tag the engine accepts.
    pub const TYPES: [&'static str; 3] = ["compile-run", "stop-code", "input-change"];
}

/// Messages the engine sends to observers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Current program text, sent once per new connection.
    Code { code: String },
    /// Full pin snapshot.
    PinStates(PinStateSnapshot),
    /// Session state transition.
    Status { state: SessionState, generation: u64 },
    /// A failure surfaced to observers.
    Diagnostic { kind: DiagnosticKind, message: String },
}

/// Lifecycle state of the session manager.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    Idle,
    Compiling,
    Running,
    Stopping,
    Faulted,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Compiling => "compiling",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Faulted => "faulted",
        }
    }
}

/// Category of a diagnostic sent to observers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    BuildFailure,
    MalformedImage,
    InvalidOpcode,
    UnrecoverableFault,
    UnknownMessageType,
    MalformedMessage,
    /// The engine could not accept the request.
    ServiceUnavailable,
}

/// Request body accepted by the build gateway.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub sketch: String,
}

/// Build gateway response. An absent `hex` means the build failed.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildResponse {
    #[serde(default)]
    pub hex: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
}

/// Response for the /api/v1/status endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionStatusResponse {
    pub state: SessionState,
    pub generation: u64,
    /// CPU cycles executed by the current session (0 when none).
    pub cycles: u64,
    /// Instructions executed by the current session.
    pub steps: u64,
    /// Emulated time of the current session in milliseconds.
    pub emulated_ms: f64,
    pub pins: PinStateSnapshot,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message has no `type` field")]
    MissingType,
    #[error("unknown message type `{0}`")]
    UnknownMessageType(String),
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ProtocolError {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            ProtocolError::MissingType | ProtocolError::UnknownMessageType(_) => {
                DiagnosticKind::UnknownMessageType
            }
            ProtocolError::Malformed(_) => DiagnosticKind::MalformedMessage,
        }
    }
}

/// Parses one inbound text frame.
///
/// The tag is checked before the body so that an unrecognised `type` is
/// reported as such rather than as a generic decode error.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let tag = match value.get("type") {
        Some(serde_json::Value::String(tag)) => tag.clone(),
        Some(other) => return Err(ProtocolError::UnknownMessageType(other.to_string())),
        None => return Err(ProtocolError::MissingType),
    };
    if !ClientMessage::TYPES.contains(&tag.as_str()) {
        return Err(ProtocolError::UnknownMessageType(tag));
    }
    Ok(serde_json::from_value(value)?)
}
