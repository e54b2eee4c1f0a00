//! Wire format of the visitor count frames.

use serde::Deserialize;

/// The only message the hub sends: the number of visitors online.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CountUpdate {
    pub count: usize,
}

impl CountUpdate {
    pub fn new(count: usize) -> Self {
        Self { count }
    }

    /// Encode as the JSON text sent in a WebSocket text frame.
    pub fn encode(&self) -> String {
        serde_json::json!({ "count": self.count }).to_string()
    }
}
