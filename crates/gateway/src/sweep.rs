//! Periodic eviction of sessions that stopped sending liveness probes.

use std::sync::Arc;

use {
    tokio::{task::JoinHandle, time::MissedTickBehavior},
    tracing::{debug, info},
};

use crate::state::RelayState;

/// Run one eviction pass. Returns how many sessions were closed.
pub async fn sweep_once(state: &RelayState) -> usize {
    let evicted = state
        .registry
        .evict_idle(state.settings.idle_timeout)
        .await;
    for session in &evicted {
        info!(
            name = %session.display_name,
            conn_id = %session.conn_id,
            idle_ms = session.last_activity.elapsed().as_millis() as u64,
            "evicted idle session"
        );
    }
    evicted.len()
}

/// Spawn the sweep loop on its own cadence. Abort the handle to stop it.
pub fn spawn_idle_sweep(state: Arc<RelayState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.settings.sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let evicted = sweep_once(&state).await;
            if evicted == 0 {
                debug!("idle sweep: nothing to evict");
            }
        }
    })
}
