//! Sans-IO RakNet session core with a tokio UDP transport on top.
//!
//! [`session::Session`] owns all per-peer protocol state and never touches a
//! socket; [`transport`] owns the sockets and drives sessions from a single
//! task per endpoint.

pub mod protocol;
pub mod session;
pub mod transport;

mod error;

pub use error::RaknetError;
pub use protocol::reliability::Reliability;
pub use protocol::state::{DisconnectReason, SessionState};
pub use session::{Session, SessionConfig, SessionEvent, SessionTable};
