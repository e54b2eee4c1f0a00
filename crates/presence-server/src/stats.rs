//! Periodic visitor-count log line.

use std::time::Duration;

use presence_hub::PresenceHub;

/// Sample the visitor count every `interval`, starting immediately, and hand
/// each sample to `on_tick` along with whether it differs from the previous
/// one.
pub async fn report<F>(hub: PresenceHub, interval: Duration, mut on_tick: F)
where
    F: FnMut(usize, bool),
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last = None;

    loop {
        ticker.tick().await;
        let count = hub.current_count();
        on_tick(count, last != Some(count));
        last = Some(count);
    }
}

/// Info when the count changed since the last tick, debug otherwise.
pub fn log_count(count: usize, changed: bool) {
    if changed {
        tracing::info!(visitors = count, "Visitor count");
    } else {
        tracing::debug!(visitors = count, "Visitor count unchanged");
    }
}
