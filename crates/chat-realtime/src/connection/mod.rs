//! Connection management
//!
//! - [`machine`]: sans-IO state machine for one room
//! - [`session`]: async driver and the consumer-facing handle
//! - [`manager`]: one session per room

pub mod machine;
pub mod manager;
pub mod session;

pub use machine::{
    AuthOutcome, SessionAction, SessionMachine, SessionPhase, SessionSnapshot, SessionTimer,
    CLIENT_CLOSE_CODE, ERROR_ESCALATION_THRESHOLD,
};
pub use manager::SessionManager;
pub use session::{ConnectionSession, SessionConfig, SessionDeps, AUTH_PRESET, CONNECT_PRESET};
