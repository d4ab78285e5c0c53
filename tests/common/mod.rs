//! Shared fixtures: a scripted build gateway and hand-assembled firmware.
#![allow(dead_code)]

use async_trait::async_trait;
use pinwire::config::SimulationConfig;
use pinwire::gateway::{BuildGateway, GatewayError};
use pinwire::{spawn_session_manager, BroadcastEvent, SessionHandle, StateBroadcaster};
use pinwire_mcu::encoding::*;
use pinwire_shared::{BuildRequest, BuildResponse, SessionState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Clock used by tests so that a one second delay loop stays short.
pub const TEST_CLOCK_HZ: u32 = 100_000;

/// Canned build service answers.
#[derive(Clone)]
pub enum Reply {
    Hex(String),
    Stderr(String),
    Unreachable,
}

/// Build gateway answering from a table keyed by sketch text.
#[derive(Default)]
pub struct ScriptedGateway {
    replies: HashMap<String, (Duration, Reply)>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, sketch: &str, reply: Reply) -> Self {
        self.with_delay(sketch, Duration::ZERO, reply)
    }

    pub fn with_delay(mut self, sketch: &str, delay: Duration, reply: Reply) -> Self {
        self.replies.insert(sketch.to_string(), (delay, reply));
        self
    }

    pub fn with_program(self, sketch: &str, words: &[u16]) -> Self {
        self.with(sketch, Reply::Hex(words_to_hex(words)))
    }
}

#[async_trait]
impl BuildGateway for ScriptedGateway {
    async fn build(&self, request: BuildRequest) -> Result<BuildResponse, GatewayError> {
        let (delay, reply) = self
            .replies
            .get(&request.sketch)
            .cloned()
            .unwrap_or_else(|| (Duration::ZERO, Reply::Stderr(format!("no such sketch: {}", request.sketch))));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match reply {
            Reply::Hex(hex) => Ok(BuildResponse { hex: Some(hex), stderr: None }),
            Reply::Stderr(stderr) => Ok(BuildResponse { hex: None, stderr: Some(stderr) }),
            Reply::Unreachable => Err(GatewayError::Transport("connection refused".into())),
        }
    }
}

pub struct Engine {
    pub session: SessionHandle,
    pub broadcaster: StateBroadcaster,
    pub events: broadcast::Receiver<BroadcastEvent>,
}

pub fn settings(burst: u64, dedupe: bool) -> SimulationConfig {
    SimulationConfig {
        burst_instructions: burst,
        clock_hz: TEST_CLOCK_HZ,
        dedupe_bursts: dedupe,
        ..SimulationConfig::default()
    }
}

pub fn start_engine(gateway: ScriptedGateway, settings: SimulationConfig) -> Engine {
    let broadcaster = StateBroadcaster::new(4096, settings.dedupe_bursts);
    let events = broadcaster.subscribe();
    let (session, _task) = spawn_session_manager(
        settings,
        Arc::new(gateway),
        broadcaster.clone(),
        "// placeholder".to_string(),
    );
    Engine { session, broadcaster, events }
}

impl Engine {
    pub async fn next_event(&mut self) -> BroadcastEvent {
        loop {
            match tokio::time::timeout(Duration::from_secs(10), self.events.recv()).await {
                Ok(Ok(event)) => return event,
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(e)) => panic!("broadcast closed: {e}"),
                Err(_) => panic!("timed out waiting for an event"),
            }
        }
    }

    /// Everything published within `window`.
    pub async fn collect_for(&mut self, window: Duration) -> Vec<BroadcastEvent> {
        let deadline = tokio::time::Instant::now() + window;
        let mut events = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Ok(Ok(event)) => events.push(event),
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(e)) => panic!("broadcast closed: {e}"),
                Err(_) => return events,
            }
        }
    }

    /// Events already queued for this receiver.
    pub fn drain(&mut self) -> Vec<BroadcastEvent> {
        let mut events = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => events.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return events,
            }
        }
    }

    /// Waits for a status event with `state`, returning its generation.
    pub async fn wait_for_state(&mut self, state: SessionState) -> u64 {
        loop {
            if let BroadcastEvent::Status { generation, state: s } = self.next_event().await {
                if s == state {
                    return generation;
                }
            }
        }
    }
}

/// Drives PB5 (pin 13) high, waits about one second at `TEST_CLOCK_HZ`,
/// drives it low, waits again, forever.
pub fn blink_program() -> Vec<u16> {
    let delay_loops: u16 = 25_000;
    let [lo, hi] = delay_loops.to_le_bytes();
    vec![
        ldi(16, 0x20),
        out(0x04, 16), // DDRB5 output
        out(0x05, 16), // loop: PB5 high
        rcall(3),      // delay
        out(0x05, 1),  // PB5 low (r1 = 0)
        rcall(1),      // delay
        rjmp(-5),      // loop
        ldi(24, lo),   // delay:
        ldi(25, hi),
        sbiw(24, 1),
        brne(-2),
        ret(),
    ]
}

/// Copies pin 2 (PD2, input) onto pin 13 (PB5, output) forever.
pub fn echo_program() -> Vec<u16> {
    vec![
        ldi(16, 0x20),
        out(0x04, 16), // DDRB5 output
        sbis(0x09, 2), // loop: skip if PIND2 high
        rjmp(2),       // -> low
        sbi(0x05, 5),
        rjmp(-4),      // -> loop
        cbi(0x05, 5),  // low:
        rjmp(-6),      // -> loop
    ]
}

/// Flips pin 13 (PB5) every other instruction.
pub fn toggle_program() -> Vec<u16> {
    vec![
        ldi(16, 0x20),
        out(0x04, 16), // DDRB5 output
        out(0x03, 16), // loop: PINB write toggles PB5
        rjmp(-2),      // -> loop
    ]
}

/// Spins without touching any pin.
pub fn idle_loop_program() -> Vec<u16> {
    vec![rjmp(-1)]
}

/// Executes one instruction, then hits an unimplemented opcode.
pub fn invalid_opcode_program() -> Vec<u16> {
    vec![nop(), 0xFFFF]
}
