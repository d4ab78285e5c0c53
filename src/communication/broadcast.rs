//! State broadcast channel.
//!
//! Every event carries the generation of the session that produced it. The
//! broadcaster remembers the current generation and silently drops pin
//! snapshots from older ones, so a session that has been stopped or replaced
//! can never publish again. Burst snapshots equal to the last published one
//! are skipped when deduplication is on; snapshots caused by input injection
//! are always published.

use pinwire_shared::{DiagnosticKind, PinStateSnapshot, ServerMessage, SessionState};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

/// What caused a pin snapshot to be published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    Burst,
    Injection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastEvent {
    PinStates {
        generation: u64,
        origin: SnapshotOrigin,
        snapshot: PinStateSnapshot,
    },
    Status {
        generation: u64,
        state: SessionState,
    },
    Diagnostic {
        generation: u64,
        kind: DiagnosticKind,
        message: String,
    },
}

impl BroadcastEvent {
    pub fn generation(&self) -> u64 {
        match self {
            BroadcastEvent::PinStates { generation, .. }
            | BroadcastEvent::Status { generation, .. }
            | BroadcastEvent::Diagnostic { generation, .. } => *generation,
        }
    }

    /// Wire form sent to observers. The generation stays internal.
    pub fn to_message(&self) -> ServerMessage {
        match self {
            BroadcastEvent::PinStates { snapshot, .. } => ServerMessage::PinStates(snapshot.clone()),
            BroadcastEvent::Status { generation, state } => ServerMessage::Status {
                state: *state,
                generation: *generation,
            },
            BroadcastEvent::Diagnostic { kind, message, .. } => ServerMessage::Diagnostic {
                kind: *kind,
                message: message.clone(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct Published {
    generation: u64,
    last_snapshot: Option<PinStateSnapshot>,
}

#[derive(Debug, Clone)]
pub struct StateBroadcaster {
    tx: broadcast::Sender<BroadcastEvent>,
    published: Arc<Mutex<Published>>,
    dedupe_bursts: bool,
}

impl StateBroadcaster {
    pub fn new(capacity: usize, dedupe_bursts: bool) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            published: Arc::new(Mutex::new(Published::default())),
            dedupe_bursts,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Makes `generation` current. Snapshots tagged with any other generation
    /// are dropped from now on, and the next burst snapshot is always sent.
    pub fn begin_generation(&self, generation: u64) {
        let mut published = self.lock();
        published.generation = generation;
        published.last_snapshot = None;
    }

    pub fn current_generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn last_snapshot(&self) -> Option<PinStateSnapshot> {
        self.lock().last_snapshot.clone()
    }

    /// Publishes the snapshot taken after a burst. Returns whether it was sent.
    pub fn publish_burst(&self, generation: u64, snapshot: PinStateSnapshot) -> bool {
        self.publish_snapshot(generation, snapshot, SnapshotOrigin::Burst)
    }

    /// Publishes the snapshot taken right after an input injection.
    pub fn publish_injected(&self, generation: u64, snapshot: PinStateSnapshot) -> bool {
        self.publish_snapshot(generation, snapshot, SnapshotOrigin::Injection)
    }

    fn publish_snapshot(&self, generation: u64, snapshot: PinStateSnapshot, origin: SnapshotOrigin) -> bool {
        let mut published = self.lock();
        if generation != published.generation {
            tracing::debug!(generation, current = published.generation, "Dropping stale snapshot");
            return false;
        }
        if origin == SnapshotOrigin::Burst
            && self.dedupe_bursts
            && published.last_snapshot.as_ref() == Some(&snapshot)
        {
            return false;
        }
        published.last_snapshot = Some(snapshot.clone());
        // Sending under the lock keeps event order equal to acceptance order.
        self.send(BroadcastEvent::PinStates {
            generation,
            origin,
            snapshot,
        });
        true
    }

    pub fn publish_status(&self, generation: u64, state: SessionState) {
        let _published = self.lock();
        self.send(BroadcastEvent::Status { generation, state });
    }

    pub fn publish_diagnostic(&self, generation: u64, kind: DiagnosticKind, message: impl Into<String>) {
        let _published = self.lock();
        self.send(BroadcastEvent::Diagnostic {
            generation,
            kind,
            message: message.into(),
        });
    }

    fn send(&self, event: BroadcastEvent) {
        // No observers is not an error.
        let _ = self.tx.send(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Published> {
        self.published.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
