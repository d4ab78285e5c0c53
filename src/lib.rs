//! pinwire: live emulation of an ATmega328P program with pin-state streaming
//! to connected observers.

pub mod communication;
pub mod config;
pub mod gateway;
pub mod session;
pub mod web;

pub use communication::broadcast::{BroadcastEvent, SnapshotOrigin, StateBroadcaster};
pub use config::{load_config, Config, ConfigError};
pub use gateway::{BuildGateway, GatewayError, HttpBuildGateway};
pub use session::{spawn_session_manager, SessionError, SessionHandle, SessionManager};
