use super::{Session, SessionError, SessionHandle};
use crate::communication::broadcast::StateBroadcaster;
use crate::config::SimulationConfig;
use crate::gateway::BuildGateway;
use crate::web::session_channel::{ObserverGreeting, SessionRequest};
use pinwire_mcu::{parse_intel_hex, pin_location, Board, ExecutableImage, FLASH_BYTES};
use pinwire_shared::{BuildRequest, PinStateSnapshot, SessionState, SessionStatusResponse};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;

/// Result of a build task, tagged with the generation that requested it.
#[derive(Debug)]
struct BuildOutcome {
    generation: u64,
    result: Result<ExecutableImage, SessionError>,
}

/// Owns the session state machine and the emulated board.
///
/// While a session runs, the manager alternates between executing one burst
/// of instructions and yielding to the scheduler. Requests are only handled
/// between bursts, so a stop or status query never observes a half-executed
/// burst. Builds run as separate tasks and report back through an internal
/// channel; a result whose generation is no longer pending is discarded.
pub struct SessionManager {
    settings: SimulationConfig,
    gateway: Arc<dyn BuildGateway>,
    broadcaster: StateBroadcaster,
    requests: mpsc::Receiver<SessionRequest>,
    builds_tx: mpsc::UnboundedSender<BuildOutcome>,
    builds_rx: mpsc::UnboundedReceiver<BuildOutcome>,
    state: SessionState,
    generation: u64,
    pending_build: Option<u64>,
    session: Option<Session>,
    sketch: String,
    /// Levels forced by observers; reapplied to every new board.
    external_inputs: BTreeMap<u8, bool>,
}

/// Creates a manager and runs it on its own task.
pub fn spawn_session_manager(
    settings: SimulationConfig,
    gateway: Arc<dyn BuildGateway>,
    broadcaster: StateBroadcaster,
    sketch: String,
) -> (SessionHandle, JoinHandle<()>) {
    let (manager, handle) = SessionManager::new(settings, gateway, broadcaster, sketch);
    (handle, tokio::spawn(manager.run()))
}

impl SessionManager {
    pub fn new(
        settings: SimulationConfig,
        gateway: Arc<dyn BuildGateway>,
        broadcaster: StateBroadcaster,
        sketch: String,
    ) -> (Self, SessionHandle) {
        let (tx, requests) = mpsc::channel(settings.request_queue.max(1));
        let (builds_tx, builds_rx) = mpsc::unbounded_channel();
        broadcaster.begin_generation(0);
        let manager = Self {
            settings,
            gateway,
            broadcaster,
            requests,
            builds_tx,
            builds_rx,
            state: SessionState::Idle,
            generation: 0,
            pending_build: None,
            session: None,
            sketch,
            external_inputs: BTreeMap::new(),
        };
        (manager, SessionHandle::new(tx))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs until every [`SessionHandle`] has been dropped.
    pub async fn run(mut self) {
        tracing::info!(
            burst = self.settings.burst_instructions,
            clock_hz = self.settings.clock_hz,
            "Session manager started"
        );
        loop {
            match self.state {
                SessionState::Running | SessionState::Stopping => {
                    if !self.drain_requests() {
                        break;
                    }
                    match self.state {
                        SessionState::Running => {
                            self.run_burst();
                            tokio::task::yield_now().await;
                        }
                        SessionState::Stopping => self.finish_stop(),
                        _ => {}
                    }
                }
                _ => {
                    tokio::select! {
                        request = self.requests.recv() => match request {
                            Some(request) => self.handle_request(request),
                            None => break,
                        },
                        Some(outcome) = self.builds_rx.recv() => self.handle_build(outcome),
                    }
                }
            }
        }
        if let Some(session) = self.session.take() {
            tracing::info!(generation = session.generation, "Discarding session on shutdown");
        }
        tracing::info!("Session manager stopped");
    }

    /// Handles everything queued since the last burst. Returns false once all
    /// handles are gone.
    fn drain_requests(&mut self) -> bool {
        loop {
            match self.requests.try_recv() {
                Ok(request) => self.handle_request(request),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
        while let Ok(outcome) = self.builds_rx.try_recv() {
            self.handle_build(outcome);
        }
        true
    }

    fn handle_request(&mut self, request: SessionRequest) {
        match request {
            SessionRequest::CompileRun { sketch } => self.compile_run(sketch),
            SessionRequest::Stop => self.stop(),
            SessionRequest::InputChange { pin, state } => {
                if let Err(e) = self.inject_input(pin, state) {
                    tracing::warn!("Ignoring input change: {}", e);
                }
            }
            SessionRequest::Connect { respond_to } => {
                let _ = respond_to.send(ObserverGreeting {
                    code: self.sketch.clone(),
                    snapshot: self.current_snapshot(),
                    events: self.broadcaster.subscribe(),
                });
            }
            SessionRequest::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status());
            }
        }
    }

    fn compile_run(&mut self, sketch: String) {
        if self.session.is_some() {
            if self.state != SessionState::Stopping {
                self.transition(SessionState::Stopping);
            }
            self.teardown("replaced by compile-run");
            self.transition(SessionState::Idle);
        }
        if let Some(abandoned) = self.pending_build.take() {
            tracing::info!(generation = abandoned, "Abandoning pending build");
        }

        let generation = self.advance_generation();
        self.pending_build = Some(generation);
        self.sketch = sketch.clone();
        self.transition(SessionState::Compiling);

        let gateway = Arc::clone(&self.gateway);
        let builds = self.builds_tx.clone();
        tokio::spawn(async move {
            let result = build_image(gateway.as_ref(), sketch).await;
            let _ = builds.send(BuildOutcome { generation, result });
        });
    }

    fn stop(&mut self) {
        match self.state {
            SessionState::Running => {
                if let Some(session) = self.session.as_mut() {
                    session.run_flag = false;
                }
                self.transition(SessionState::Stopping);
            }
            SessionState::Compiling => {
                if let Some(abandoned) = self.pending_build.take() {
                    tracing::info!(generation = abandoned, "Build cancelled by stop");
                }
                self.advance_generation();
                self.transition(SessionState::Idle);
            }
            SessionState::Idle | SessionState::Stopping | SessionState::Faulted => {
                tracing::debug!(state = self.state.as_str(), "Nothing to stop");
            }
        }
    }

    fn finish_stop(&mut self) {
        self.teardown("stop requested");
        self.transition(SessionState::Idle);
    }

    fn handle_build(&mut self, outcome: BuildOutcome) {
        if self.pending_build != Some(outcome.generation) {
            tracing::info!(generation = outcome.generation, "Discarding result of abandoned build");
            return;
        }
        self.pending_build = None;
        match outcome.result {
            Ok(image) => self.start_session(outcome.generation, image),
            Err(e) => {
                tracing::warn!(generation = outcome.generation, "Build rejected: {}", e);
                self.report(&e);
                self.advance_generation();
                self.transition(SessionState::Idle);
            }
        }
    }

    fn start_session(&mut self, generation: u64, image: ExecutableImage) {
        let mut board = Board::new(&image);
        for (&pin, &level) in &self.external_inputs {
            if let Err(e) = board.set_input(pin, level) {
                tracing::warn!("Could not restore input on pin {}: {}", pin, e);
            }
        }
        tracing::info!(generation, bytes = image.byte_len(), "Program loaded");
        // Snapshots published while compiling must not suppress the first burst.
        self.broadcaster.begin_generation(generation);
        self.session = Some(Session::new(generation, board));
        self.transition(SessionState::Running);
    }

    fn run_burst(&mut self) {
        let Some(session) = self.session.as_mut() else {
            tracing::warn!("Running state without a session");
            self.transition(SessionState::Idle);
            return;
        };
        if !session.run_flag {
            self.transition(SessionState::Stopping);
            return;
        }
        let report = session.board.run_burst(self.settings.burst_instructions);
        session.steps += report.steps;
        let generation = session.generation;
        let cycles = session.board.cycles();
        let snapshot = session.board.snapshot(&self.settings.observed_pins);
        let published = self.broadcaster.publish_burst(generation, snapshot);
        tracing::trace!(generation, steps = report.steps, cycles, published, "Burst complete");

        if let Some(fault) = report.fault {
            self.fail(SessionError::Fault(fault));
        }
    }

    fn fail(&mut self, error: SessionError) {
        tracing::error!(generation = self.generation, "Session faulted: {}", error);
        self.report(&error);
        self.teardown("fault");
        self.transition(SessionState::Faulted);
    }

    /// Forces an input level and publishes an injection snapshot. The snapshot
    /// goes out even when the program drives the pin as an output, in which
    /// case the reported level is unchanged.
    fn inject_input(&mut self, pin: i64, level: bool) -> Result<(), SessionError> {
        let pin = u8::try_from(pin)
            .ok()
            .filter(|p| self.settings.observed_pins.contains(p) && pin_location(*p).is_some())
            .ok_or(SessionError::InvalidPinReference(pin))?;
        self.external_inputs.insert(pin, level);
        if let Some(session) = self.session.as_mut() {
            session
                .board
                .set_input(pin, level)
                .map_err(|_| SessionError::InvalidPinReference(pin as i64))?;
        }
        let snapshot = self.current_snapshot();
        let applied = snapshot.get(pin) == Some(level);
        if applied {
            tracing::debug!(pin, level, "Input injected");
        } else {
            tracing::debug!(pin, level, "Input injected on a driven output, level unchanged");
        }
        self.broadcaster.publish_injected(self.generation, snapshot);
        Ok(())
    }

    /// Drops the board and retires its generation so nothing it produced can
    /// be published afterwards.
    fn teardown(&mut self, reason: &str) {
        if let Some(session) = self.session.take() {
            tracing::info!(
                generation = session.generation,
                steps = session.steps,
                cycles = session.board.cycles(),
                reason,
                "Session torn down"
            );
        }
        self.advance_generation();
    }

    fn advance_generation(&mut self) -> u64 {
        self.generation += 1;
        self.broadcaster.begin_generation(self.generation);
        self.generation
    }

    fn transition(&mut self, next: SessionState) {
        tracing::info!(
            from = self.state.as_str(),
            to = next.as_str(),
            generation = self.generation,
            "Session state change"
        );
        self.state = next;
        self.broadcaster.publish_status(self.generation, next);
    }

    fn report(&self, error: &SessionError) {
        if let Some(kind) = error.diagnostic_kind() {
            self.broadcaster
                .publish_diagnostic(self.generation, kind, error.to_string());
        }
    }

    /// Pin levels of the running board, or the externally forced levels when
    /// no program runs.
    fn current_snapshot(&self) -> PinStateSnapshot {
        match &self.session {
            Some(session) => session.board.snapshot(&self.settings.observed_pins),
            None => {
                let mut snapshot = PinStateSnapshot::all_low(&self.settings.observed_pins);
                for (&pin, &level) in &self.external_inputs {
                    snapshot.set(pin, level);
                }
                snapshot
            }
        }
    }

    fn status(&self) -> SessionStatusResponse {
        let (cycles, steps, emulated_ms) = match &self.session {
            Some(session) => (
                session.board.cycles(),
                session.steps,
                session.board.emulated_ms(self.settings.clock_hz),
            ),
            None => (0, 0, 0.0),
        };
        SessionStatusResponse {
            state: self.state,
            generation: self.generation,
            cycles,
            steps,
            emulated_ms,
            pins: self.current_snapshot(),
        }
    }
}

async fn build_image(gateway: &dyn BuildGateway, sketch: String) -> Result<ExecutableImage, SessionError> {
    let response = gateway.build(BuildRequest { sketch }).await?;
    let stderr = response.stderr.unwrap_or_default();
    let hex = match response.hex {
        Some(hex) if !hex.trim().is_empty() => hex,
        _ if stderr.trim().is_empty() => {
            return Err(SessionError::BuildFailure("build produced no image".to_string()));
        }
        _ => return Err(SessionError::BuildFailure(stderr)),
    };
    if !stderr.trim().is_empty() {
        tracing::debug!("Build succeeded with diagnostics: {}", stderr);
    }
    Ok(parse_intel_hex(&hex, FLASH_BYTES)?)
}
