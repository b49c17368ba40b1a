//! Conversational sessions over the retrieval-augmented pipeline.
//!
//! A transport (terminal, websocket, ...) reports session lifecycle through
//! [`SessionManager`] hooks and receives [`OutboundEvent`]s back. All
//! sessions share one [`SharedResources`].

pub mod manager;
pub mod resources;
pub mod session;
pub mod transport;

pub use manager::SessionManager;
pub use resources::{Pipeline, SharedResources};
pub use session::SessionState;
pub use transport::{ChannelTransport, Envelope, OutboundEvent, SessionId, Transport, ERROR_PREFIX};
