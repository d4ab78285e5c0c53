use super::SessionError;
use crate::web::session_channel::{ObserverGreeting, SessionRequest};
use pinwire_shared::{ClientMessage, SessionStatusResponse};
use tokio::sync::{mpsc, oneshot};

/// Cloneable front end to the session manager task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionRequest>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::Sender<SessionRequest>) -> Self {
        Self { tx }
    }

    async fn send(&self, request: SessionRequest) -> Result<(), SessionError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| SessionError::ManagerUnavailable)
    }

    pub async fn compile_run(&self, sketch: impl Into<String>) -> Result<(), SessionError> {
        self.send(SessionRequest::CompileRun {
            sketch: sketch.into(),
        })
        .await
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        self.send(SessionRequest::Stop).await
    }

    pub async fn input_change(&self, pin: i64, state: bool) -> Result<(), SessionError> {
        self.send(SessionRequest::InputChange { pin, state }).await
    }

    /// Forwards an inbound observer message.
    pub async fn dispatch(&self, message: ClientMessage) -> Result<(), SessionError> {
        match message {
            ClientMessage::CompileRun { sketch } => self.compile_run(sketch).await,
            ClientMessage::StopCode => self.stop().await,
            ClientMessage::InputChange { pin, state } => self.input_change(pin, state).await,
        }
    }

    pub async fn connect(&self) -> Result<ObserverGreeting, SessionError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(SessionRequest::Connect { respond_to }).await?;
        rx.await.map_err(|_| SessionError::ManagerUnavailable)
    }

    pub async fn status(&self) -> Result<SessionStatusResponse, SessionError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(SessionRequest::GetStatus { respond_to }).await?;
        rx.await.map_err(|_| SessionError::ManagerUnavailable)
    }
}
