pub mod errors;
pub mod id;

pub use errors::{ConfigError, PresenceError};
pub use id::ConnectionId;

pub type Result<T> = std::result::Result<T, PresenceError>;
