//! Presence hub: one task owns the presence set and applies register and
//! unregister commands in arrival order.

use presence_common::{ConnectionId, PresenceError, Result};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::protocol::CountUpdate;
use crate::set::{Connection, PresenceSet};

/// Hub tuning.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Frames queued per visitor before the visitor is treated as gone.
    pub outbound_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 32,
        }
    }
}

enum HubCommand {
    Register(Connection),
    Unregister(ConnectionId),
}

/// Cloneable handle to the running hub.
///
/// Commands are queued without waiting, so callers never block on a
/// broadcast in progress. The hub task exits once every handle is dropped.
#[derive(Clone)]
pub struct PresenceHub {
    commands: mpsc::UnboundedSender<HubCommand>,
    count: watch::Receiver<usize>,
    outbound_buffer: usize,
}

impl PresenceHub {
    /// Spawn the hub task on the current tokio runtime.
    pub fn spawn(config: HubConfig) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (count_tx, count_rx) = watch::channel(0);

        tokio::spawn(run_hub(command_rx, count_tx));

        Self {
            commands: command_tx,
            count: count_rx,
            outbound_buffer: config.outbound_buffer.max(1),
        }
    }

    /// Allocate a fresh connection handle and the receiving end of its
    /// outbound queue. The handle is not a member until registered.
    pub fn connect(&self) -> (Connection, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        (Connection::new(ConnectionId::next(), tx), rx)
    }

    /// Queue a registration. The hub adds the connection and broadcasts
    /// the new count to every member, the new one included.
    pub fn register(&self, conn: Connection) -> Result<()> {
        self.commands
            .send(HubCommand::Register(conn))
            .map_err(|_| PresenceError::HubClosed)
    }

    /// Queue an unregistration. Unknown or already removed ids are ignored.
    pub fn unregister(&self, id: ConnectionId) {
        if self.commands.send(HubCommand::Unregister(id)).is_err() {
            debug!(connection = %id, "Hub stopped, nothing to unregister");
        }
    }

    /// Number of registered visitors as of the last processed command.
    pub fn current_count(&self) -> usize {
        *self.count.borrow()
    }

    /// Observe count changes without taking part in the hub protocol.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count.clone()
    }
}

async fn run_hub(mut commands: mpsc::UnboundedReceiver<HubCommand>, count: watch::Sender<usize>) {
    let mut set = PresenceSet::new();

    while let Some(command) = commands.recv().await {
        match command {
            HubCommand::Register(conn) => {
                let id = conn.id();
                if !set.insert(conn) {
                    warn!(connection = %id, "Duplicate registration ignored");
                    continue;
                }
                info!(connection = %id, total = set.len(), "Visitor connected");
            }
            HubCommand::Unregister(id) => {
                // Dropping the removed handle closes the visitor's queue.
                if set.remove(id).is_none() {
                    debug!(connection = %id, "Unregister for non-member ignored");
                    continue;
                }
                info!(connection = %id, total = set.len(), "Visitor disconnected");
            }
        }

        publish(&mut set, &count);
    }

    debug!("Presence hub stopped");
}

/// Bring every member up to date with the current count, then expose it to
/// readers.
///
/// Members that already went away are swept before the count is taken, so
/// the main pass carries the right value. A member the main pass drops
/// (full queue, or closed since the sweep) changes the count once more; the
/// correction that follows never treats a full queue as a failure.
fn publish(set: &mut PresenceSet, count: &watch::Sender<usize>) {
    let swept = set.sweep_closed();
    if !swept.is_empty() {
        info!(
            dropped = swept.len(),
            total = set.len(),
            "Dropped departed visitors"
        );
    }

    let mut dropped = set.broadcast(CountUpdate::new(set.len()));
    while !dropped.is_empty() {
        info!(
            dropped = dropped.len(),
            total = set.len(),
            "Dropped unresponsive visitors"
        );
        dropped = set.rebroadcast(CountUpdate::new(set.len()));
    }

    if set.is_empty() {
        debug!("No visitors online");
    }
    count.send_replace(set.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    async fn next_count(rx: &mut mpsc::Receiver<String>) -> usize {
        let frame = timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("outbound queue closed");
        serde_json::from_str::<CountUpdate>(&frame).unwrap().count
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<usize> {
        let mut counts = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            counts.push(serde_json::from_str::<CountUpdate>(&frame).unwrap().count);
        }
        counts
    }

    async fn settle(hub: &PresenceHub, expected: usize) {
        let mut rx = hub.subscribe();
        timeout(WAIT, rx.wait_for(|count| *count == expected))
            .await
            .expect("count never settled")
            .unwrap();
    }

    fn join(hub: &PresenceHub) -> (ConnectionId, mpsc::Receiver<String>) {
        let (conn, rx) = hub.connect();
        let id = conn.id();
        hub.register(conn).unwrap();
        (id, rx)
    }

    #[tokio::test]
    async fn no_visitors_count_is_zero() {
        let hub = PresenceHub::spawn(HubConfig::default());
        assert_eq!(hub.current_count(), 0);
    }

    #[tokio::test]
    async fn first_visitor_receives_one() {
        let hub = PresenceHub::spawn(HubConfig::default());
        let (_x, mut rx_x) = join(&hub);

        assert_eq!(next_count(&mut rx_x).await, 1);
        settle(&hub, 1).await;
        assert_eq!(hub.current_count(), 1);
    }

    #[tokio::test]
    async fn second_visitor_updates_first() {
        let hub = PresenceHub::spawn(HubConfig::default());
        let (_x, mut rx_x) = join(&hub);
        assert_eq!(next_count(&mut rx_x).await, 1);

        let (_y, mut rx_y) = join(&hub);
        assert_eq!(next_count(&mut rx_x).await, 2);
        assert_eq!(next_count(&mut rx_y).await, 2);
    }

    #[tokio::test]
    async fn disconnect_notifies_remaining_and_closes_queue() {
        let hub = PresenceHub::spawn(HubConfig::default());
        let (x, mut rx_x) = join(&hub);
        let (_y, mut rx_y) = join(&hub);
        assert_eq!(next_count(&mut rx_y).await, 2);

        hub.unregister(x);
        assert_eq!(next_count(&mut rx_y).await, 1);
        settle(&hub, 1).await;

        assert_eq!(drain(&mut rx_x), vec![1, 2]);
        assert!(rx_x.recv().await.is_none());
    }

    #[tokio::test]
    async fn stale_member_is_dropped_during_broadcast() {
        let hub = PresenceHub::spawn(HubConfig::default());
        let (_x, mut rx_x) = join(&hub);
        let (_y, mut rx_y) = join(&hub);
        settle(&hub, 2).await;

        let (z, rx_z) = hub.connect();
        drop(rx_z);
        hub.register(z).unwrap();

        // Z is swept before the count is taken, so nobody ever sees 3.
        for expected in [1, 2, 2] {
            assert_eq!(next_count(&mut rx_x).await, expected);
        }
        for expected in [2, 2] {
            assert_eq!(next_count(&mut rx_y).await, expected);
        }
        assert_eq!(hub.current_count(), 2);
    }

    #[tokio::test]
    async fn stale_member_does_not_evict_drained_visitors() {
        let hub = PresenceHub::spawn(HubConfig { outbound_buffer: 1 });
        let (_x, mut rx_x) = join(&hub);
        assert_eq!(next_count(&mut rx_x).await, 1);
        let (_y, mut rx_y) = join(&hub);
        assert_eq!(next_count(&mut rx_x).await, 2);
        assert_eq!(next_count(&mut rx_y).await, 2);

        let (z, rx_z) = hub.connect();
        drop(rx_z);
        hub.register(z).unwrap();

        assert_eq!(next_count(&mut rx_x).await, 2);
        assert_eq!(next_count(&mut rx_y).await, 2);
        settle(&hub, 2).await;
        assert_eq!(hub.current_count(), 2);

        // Both queues are still open and hold nothing more.
        for rx in [&mut rx_x, &mut rx_y] {
            assert!(matches!(
                rx.try_recv(),
                Err(mpsc::error::TryRecvError::Empty)
            ));
        }
    }

    #[tokio::test]
    async fn dropping_slow_visitor_keeps_busy_survivors() {
        let hub = PresenceHub::spawn(HubConfig { outbound_buffer: 1 });
        let (_x, mut rx_x) = join(&hub);
        assert_eq!(next_count(&mut rx_x).await, 1);

        // S never reads; its slot fills with "2".
        let (_s, mut rx_s) = join(&hub);
        assert_eq!(next_count(&mut rx_x).await, 2);

        // W's join overflows S. X accepts "3" and is full when the
        // corrected count follows, which must not cost X its membership.
        let (tx, mut rx_w) = mpsc::channel(8);
        hub.register(Connection::new(ConnectionId::next(), tx)).unwrap();
        assert_eq!(next_count(&mut rx_w).await, 3);
        assert_eq!(next_count(&mut rx_w).await, 2);
        settle(&hub, 2).await;

        assert_eq!(next_count(&mut rx_x).await, 3);
        assert!(matches!(
            rx_x.try_recv(),
            Err(mpsc::error::TryRecvError::Empty)
        ));

        assert_eq!(drain(&mut rx_s), vec![2]);
        assert!(rx_s.recv().await.is_none());
    }

    #[tokio::test]
    async fn duplicate_unregister_is_noop() {
        let hub = PresenceHub::spawn(HubConfig::default());
        let (x, _rx_x) = join(&hub);
        let (_y, mut rx_y) = join(&hub);
        settle(&hub, 2).await;

        hub.unregister(x);
        hub.unregister(x);

        // Commands are applied in order, so W's baseline reflects both
        // unregisters having been processed.
        let (_w, mut rx_w) = join(&hub);
        assert_eq!(next_count(&mut rx_w).await, 2);
        settle(&hub, 2).await;

        assert_eq!(drain(&mut rx_y), vec![2, 1, 2]);
    }

    #[tokio::test]
    async fn unregister_unknown_id_is_noop() {
        let hub = PresenceHub::spawn(HubConfig::default());
        let (_x, mut rx_x) = join(&hub);

        hub.unregister(ConnectionId::next());

        let (_y, mut rx_y) = join(&hub);
        assert_eq!(next_count(&mut rx_y).await, 2);
        assert_eq!(drain(&mut rx_x), vec![1, 2]);
    }

    #[tokio::test]
    async fn final_count_is_registers_minus_unregisters() {
        for (n, m) in [(0usize, 0usize), (1, 1), (3, 0), (5, 2), (4, 4)] {
            let hub = PresenceHub::spawn(HubConfig::default());
            let mut members: Vec<_> = (0..n).map(|_| join(&hub)).collect();
            settle(&hub, n).await;

            for (id, _) in members.iter().take(m) {
                hub.unregister(*id);
            }
            settle(&hub, n - m).await;
            assert_eq!(hub.current_count(), n - m);

            for (_, rx) in members.iter_mut().skip(m) {
                let counts = drain(rx);
                assert_eq!(counts.last().copied(), Some(n - m), "n={n} m={m}");
            }
        }
    }

    #[tokio::test]
    async fn counts_only_grow_while_visitors_join() {
        let hub = PresenceHub::spawn(HubConfig::default());
        let mut members: Vec<_> = (0..10).map(|_| join(&hub)).collect();
        settle(&hub, 10).await;

        for (k, (_, rx)) in members.iter_mut().enumerate() {
            let expected: Vec<usize> = (k + 1..=10).collect();
            assert_eq!(drain(rx), expected);
        }
    }

    #[tokio::test]
    async fn concurrent_registrations_are_all_counted() {
        let hub = PresenceHub::spawn(HubConfig::default());

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let hub = hub.clone();
                tokio::spawn(async move { join(&hub) })
            })
            .collect();

        let mut members = Vec::new();
        for task in tasks {
            members.push(task.await.unwrap());
        }
        settle(&hub, 16).await;

        for (_, rx) in members.iter_mut() {
            assert_eq!(drain(rx).last().copied(), Some(16));
        }
    }

    #[tokio::test]
    async fn slow_visitor_is_dropped_when_queue_fills() {
        let hub = PresenceHub::spawn(HubConfig { outbound_buffer: 1 });
        let (_slow, mut rx_slow) = join(&hub);
        settle(&hub, 1).await;

        // The slow visitor never reads: its single slot already holds "1".
        let (tx, mut rx_fast) = mpsc::channel(8);
        hub.register(Connection::new(ConnectionId::next(), tx)).unwrap();
        assert_eq!(next_count(&mut rx_fast).await, 2);
        assert_eq!(next_count(&mut rx_fast).await, 1);
        settle(&hub, 1).await;

        assert_eq!(drain(&mut rx_slow), vec![1]);
        assert!(rx_slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let hub = PresenceHub::spawn(HubConfig::default());
        let mut observer = hub.subscribe();

        let (x, _rx_x) = join(&hub);
        timeout(WAIT, observer.wait_for(|c| *c == 1))
            .await
            .unwrap()
            .unwrap();

        hub.unregister(x);
        timeout(WAIT, observer.wait_for(|c| *c == 0))
            .await
            .unwrap()
            .unwrap();
    }
}
