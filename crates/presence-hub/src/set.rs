//! The set of registered visitor connections.

use std::collections::HashMap;

use presence_common::ConnectionId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::protocol::CountUpdate;

/// Hub-side handle to one visitor.
///
/// Holds the sending half of the visitor's outbound queue. Dropping the
/// handle closes the queue, which the connection adapter observes as the
/// end of its session.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    outbound: mpsc::Sender<String>,
}

impl Connection {
    pub fn new(id: ConnectionId, outbound: mpsc::Sender<String>) -> Self {
        Self { id, outbound }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the adapter side is still listening.
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Queue a frame without waiting.
    fn try_deliver(&self, frame: &str) -> Result<(), TrySendError<String>> {
        self.outbound.try_send(frame.to_owned())
    }
}

/// Registered connections, keyed by id.
///
/// Owned by the hub task and never shared; every mutation goes through
/// `&mut self`.
#[derive(Debug, Default)]
pub struct PresenceSet {
    members: HashMap<ConnectionId, Connection>,
}

impl PresenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Returns `false` and leaves the set unchanged if a
    /// connection with the same id is already a member.
    pub fn insert(&mut self, conn: Connection) -> bool {
        if self.members.contains_key(&conn.id) {
            return false;
        }
        self.members.insert(conn.id, conn);
        true
    }

    /// Remove a connection, handing it back so the caller decides when it
    /// is closed (dropped).
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.members.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Remove every member whose adapter has already gone away, so the
    /// next count reflects only visitors that can still receive it.
    pub fn sweep_closed(&mut self) -> Vec<ConnectionId> {
        let closed: Vec<ConnectionId> = self
            .members
            .values()
            .filter(|conn| !conn.is_open())
            .map(Connection::id)
            .collect();

        for id in &closed {
            debug!(connection = %id, "Outbound queue closed, dropping visitor");
            self.members.remove(id);
        }
        closed
    }

    /// Send `update` to every member.
    ///
    /// Members whose queue is full or whose adapter has gone away are
    /// collected during the pass and removed afterwards; their handles are
    /// dropped, closing their queues. Returns the ids that were dropped.
    pub fn broadcast(&mut self, update: CountUpdate) -> Vec<ConnectionId> {
        self.deliver(update, Overflow::Drop)
    }

    /// Send a corrected count after an earlier pass dropped someone.
    ///
    /// Survivors accepted the previous frame moments ago and their adapters
    /// have had no chance to drain it, so a full queue here is not taken as
    /// a sign of a slow visitor. Only closed queues are removed.
    pub fn rebroadcast(&mut self, update: CountUpdate) -> Vec<ConnectionId> {
        self.deliver(update, Overflow::Skip)
    }

    fn deliver(&mut self, update: CountUpdate, overflow: Overflow) -> Vec<ConnectionId> {
        let frame = update.encode();

        let failed: Vec<ConnectionId> = self
            .members
            .values()
            .filter_map(|conn| match conn.try_deliver(&frame) {
                Ok(()) => None,
                Err(TrySendError::Full(_)) => match overflow {
                    Overflow::Drop => {
                        debug!(connection = %conn.id, "Outbound queue full, dropping visitor");
                        Some(conn.id)
                    }
                    Overflow::Skip => {
                        debug!(connection = %conn.id, "Outbound queue full, correction skipped");
                        None
                    }
                },
                Err(TrySendError::Closed(_)) => {
                    debug!(connection = %conn.id, "Outbound queue closed, dropping visitor");
                    Some(conn.id)
                }
            })
            .collect();

        for id in &failed {
            self.members.remove(id);
        }
        failed
    }
}

/// What a pass does with a member whose queue has no free slot.
#[derive(Debug, Clone, Copy)]
enum Overflow {
    Drop,
    Skip,
}
