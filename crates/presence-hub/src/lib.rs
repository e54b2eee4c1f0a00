//! In-process visitor presence hub.
//!
//! Tracks the WebSocket clients connected to the visitor endpoint and
//! pushes `{"count": N}` to every one of them whenever somebody joins or
//! leaves. All membership changes flow through a single hub task; each
//! client gets its own adapter task that only watches for disconnection
//! and writes the frames the hub queues for it.

pub mod connection;
pub mod hub;
pub mod protocol;
pub mod server;
pub mod set;

pub use connection::handle_connection;
pub use hub::{HubConfig, PresenceHub};
pub use protocol::CountUpdate;
pub use server::{bind, serve};
pub use set::{Connection, PresenceSet};
