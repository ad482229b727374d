//! Background recovery sweeper.

use crate::Scheduler;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default sweep cadence.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Spawn the periodic sweep task: promotes expired-cooldown credentials back
/// to probing and garbage-collects idle records. Selection performs the same
/// promotion lazily, so the sweeper only bounds how stale `/stats` can get.
pub fn spawn_sweeper(scheduler: Arc<Scheduler>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so the first real
        // sweep happens one period in.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            scheduler.sweep();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HealthPolicy, SelectError};
    use relay_types::SelectionPolicy;

    #[tokio::test]
    async fn sweeper_recovers_a_tripped_credential() {
        let sched = Arc::new(Scheduler::new(
            HealthPolicy {
                failure_threshold: 1,
                cooldown: Duration::from_millis(50),
                probes_to_close: 1,
            },
            SelectionPolicy::RoundRobin,
        ));
        sched.register(["kA"]);
        sched.record_failure("kA");
        assert_eq!(sched.snapshot("kA").unwrap().health, "tripped");

        let handle = spawn_sweeper(Arc::clone(&sched), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(250)).await;
        handle.abort();

        assert_eq!(sched.snapshot("kA").unwrap().health, "probing");
        assert!(!matches!(
            sched.select(&["kA".to_string()]),
            Err(SelectError::NoCredentialAvailable)
        ));
    }
}
