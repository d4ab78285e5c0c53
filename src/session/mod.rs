//! Session lifecycle: build, run, stop, fault.
//!
//! One task, the [`SessionManager`], owns the emulated board and every piece
//! of session state. Everything else reaches it through a [`SessionHandle`].

mod handle;
mod manager;

pub use handle::SessionHandle;
pub use manager::{spawn_session_manager, SessionManager};

use crate::gateway::GatewayError;
use pinwire_mcu::{Board, CpuFault, ImageError};
use pinwire_shared::DiagnosticKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("build failed: {0}")]
    BuildFailure(String),
    #[error("build service unavailable: {0}")]
    TransportUnavailable(#[from] GatewayError),
    #[error("malformed image: {0}")]
    MalformedImage(#[from] ImageError),
    #[error("CPU fault: {0}")]
    Fault(#[from] CpuFault),
    #[error("pin {0} is not an observed input pin")]
    InvalidPinReference(i64),
    #[error("session manager is not running")]
    ManagerUnavailable,
}

impl SessionError {
    /// Diagnostic category shown to observers, if this error is reported.
    pub fn diagnostic_kind(&self) -> Option<DiagnosticKind> {
        match self {
            SessionError::BuildFailure(_) | SessionError::TransportUnavailable(_) => {
                Some(DiagnosticKind::BuildFailure)
            }
            SessionError::MalformedImage(_) => Some(DiagnosticKind::MalformedImage),
            SessionError::Fault(CpuFault::InvalidOpcode { .. }) => Some(DiagnosticKind::InvalidOpcode),
            SessionError::Fault(_) => Some(DiagnosticKind::UnrecoverableFault),
            SessionError::ManagerUnavailable => Some(DiagnosticKind::ServiceUnavailable),
            SessionError::InvalidPinReference(_) => None,
        }
    }
}

/// A running program: the board plus bookkeeping. Dropped on stop or fault.
#[derive(Debug)]
pub struct Session {
    pub generation: u64,
    pub board: Board,
    /// Cleared by a stop request; the manager tears the session down at the
    /// next yield point.
    pub run_flag: bool,
    pub steps: u64,
}

impl Session {
    pub fn new(generation: u64, board: Board) -> Self {
        Self {
            generation,
            board,
            run_flag: true,
            steps: 0,
        }
    }
}
