//! Messages between observer connections / HTTP handlers and the session
//! manager task.

use crate::communication::broadcast::BroadcastEvent;
use pinwire_shared::{PinStateSnapshot, ServerMessage, SessionStatusResponse};
use tokio::sync::{broadcast, oneshot};

/// What a newly connected observer is sent before live updates.
///
/// `events` is subscribed in the same manager step that took `snapshot`, so
/// its first pin-state event is the first change after the greeting.
#[derive(Debug)]
pub struct ObserverGreeting {
    pub code: String,
    pub snapshot: PinStateSnapshot,
    pub events: broadcast::Receiver<BroadcastEvent>,
}

impl ObserverGreeting {
    /// The program text first, then the current pin levels.
    pub fn messages(&self) -> [ServerMessage; 2] {
        [
            ServerMessage::Code {
                code: self.code.clone(),
            },
            ServerMessage::PinStates(self.snapshot.clone()),
        ]
    }
}

/// A request handled by the session manager, in arrival order.
#[derive(Debug)]
pub enum SessionRequest {
    /// Build `sketch` and run it, replacing any current session.
    CompileRun { sketch: String },
    /// Stop the current session or abandon a pending build.
    Stop,
    /// Force an Arduino pin to a level.
    InputChange { pin: i64, state: bool },
    /// Subscribe a new observer and fetch its greeting.
    Connect {
        respond_to: oneshot::Sender<ObserverGreeting>,
    },
    GetStatus {
        respond_to: oneshot::Sender<SessionStatusResponse>,
    },
}
