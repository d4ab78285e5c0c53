// pinwire_shared: wire types shared by the emulation core, the host and tests

pub mod api_models;
pub mod pin_state;

pub use api_models::{
    parse_client_message, BuildRequest, BuildResponse, ClientMessage, DiagnosticKind,
    ProtocolError, ServerMessage, SessionState, SessionStatusResponse,
};
pub use pin_state::PinStateSnapshot;
