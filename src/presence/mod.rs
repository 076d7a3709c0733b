use crate::directory::AgentDirectory;
use crate::fanout::{FanoutHub, PositionTick};
use crate::store::LocationStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};


/// Periodically demote stale ONLINE agents to OFFLINE.
///
/// Runs independently of ingest traffic. Each pass snapshots the ONLINE rows,
/// then demotes each stale row with a per-row compare-and-set — a location
/// update racing with the sweep always wins. The staleness threshold must be
/// strictly greater than the expected agent update interval.
pub async fn run_presence_sweeper(
    store: Arc<LocationStore>,
    hub: Arc<FanoutHub>,
    directory: Arc<dyn AgentDirectory>,
    sweep_interval: Duration,
    stale_after: chrono::Duration,
) {
    let mut ticker = interval(sweep_interval);

    // Skip missed ticks to prevent backlog under load
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        sweep_interval_secs = sweep_interval.as_secs(),
        stale_after_secs = stale_after.num_seconds(),
        "Presence sweeper started"
    );

    loop {
        ticker.tick().await;
        sweep_once(&store, &hub, directory.as_ref(), stale_after);
    }
}

/// One sweep pass. Returns the number of agents demoted.
///
/// Row failures are isolated: an error updating one agent's row never aborts
/// the scan for the others.
pub fn sweep_once(
    store: &LocationStore,
    hub: &FanoutHub,
    directory: &dyn AgentDirectory,
    stale_after: chrono::Duration,
) -> usize {
    let now = Utc::now();
    let mut demoted = 0;

    for (agent_id, observed_at) in store.online_snapshot() {
        if now - observed_at < stale_after {
            continue;
        }

        match store.demote_if_stale(&agent_id, observed_at) {
            Ok(Some(row)) => {
                info!(agent_id = %agent_id, "Demoted stale agent to OFFLINE");
                let profile = directory.profile(&agent_id);
                hub.publish_presence(PositionTick::merge(&row, profile.as_ref()));
                demoted += 1;
            }
            Ok(None) => {
                // A fresh update won the race; leave the row alone
                debug!(agent_id = %agent_id, "Skipped demotion, row changed since scan");
            }
            Err(e) => {
                error!(agent_id = %agent_id, error = %e, "Failed to demote stale agent");
            }
        }
    }

    demoted
}
