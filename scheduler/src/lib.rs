//! Credential scheduling: registry, health state machine, selection, and
//! recovery sweeping.
//!
//! The registry is the gateway's only long-lived shared structure. A single
//! mutex serializes every mutation, which gives the per-credential event
//! ordering the state machine relies on. Selection is non-blocking and never
//! waits for capacity.

mod record;
mod selector;
mod sweeper;

pub use record::{CredentialRecord, CredentialSnapshot, HealthPolicy, HealthState};
pub use sweeper::{SWEEP_PERIOD, spawn_sweeper};

use relay_types::{SelectionPolicy, mask_credential};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Records idle for this long are garbage-collected by the sweeper.
const IDLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("no credential available")]
    NoCredentialAvailable,
}

struct Inner {
    /// Registration order; the round-robin policy depends on it being
    /// stable within a process run.
    records: Vec<CredentialRecord>,
    index: HashMap<String, usize>,
    cursor: u64,
}

/// Registry plus selection policy. Shared via [`Arc`].
pub struct Scheduler {
    policy: HealthPolicy,
    selection: SelectionPolicy,
    inner: Mutex<Inner>,
}

impl Scheduler {
    #[must_use]
    pub fn new(policy: HealthPolicy, selection: SelectionPolicy) -> Self {
        Self {
            policy,
            selection,
            inner: Mutex::new(Inner {
                records: Vec::new(),
                index: HashMap::new(),
                cursor: 0,
            }),
        }
    }

    #[must_use]
    pub fn selection_policy(&self) -> SelectionPolicy {
        self.selection
    }

    /// Idempotently register credentials, preserving first-seen order.
    pub fn register<I, S>(&self, credentials: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let now = Instant::now();
        let mut inner = self.lock();
        for credential in credentials {
            let credential = credential.as_ref();
            if !inner.index.contains_key(credential) {
                let idx = inner.records.len();
                inner
                    .records
                    .push(CredentialRecord::new(credential.to_string(), now));
                inner.index.insert(credential.to_string(), idx);
                tracing::debug!(key = %mask_credential(credential), "registered credential");
            }
        }
    }

    /// Select one credential per the configured policy from `candidates`
    /// (the inbound request's credential list, minus anything already tried
    /// — the orchestrator never repeats a credential within one request).
    /// Hands back an RAII [`Lease`]; dropping it without an outcome counts
    /// as a network failure, which covers client disconnects.
    pub fn select(self: &Arc<Self>, candidates: &[String]) -> Result<Lease, SelectError> {
        self.select_at(Instant::now(), candidates)
    }

    /// [`Scheduler::select`] with an explicit clock, for tests.
    pub fn select_at(
        self: &Arc<Self>,
        now: Instant,
        candidates: &[String],
    ) -> Result<Lease, SelectError> {
        let mut inner = self.lock();

        // Lazy promotion keeps the sweeper an optimization rather than a
        // correctness requirement.
        for rec in &mut inner.records {
            if rec.maybe_promote(now) {
                tracing::info!(key = %mask_credential(&rec.id), "cooldown elapsed, probing credential");
            }
        }

        let eligible: Vec<usize> = inner
            .records
            .iter()
            .enumerate()
            .filter(|(_, rec)| rec.is_selectable() && candidates.iter().any(|c| *c == rec.id))
            .map(|(idx, _)| idx)
            .collect();

        let Inner {
            records, cursor, ..
        } = &mut *inner;
        let Some(picked) = selector::pick(self.selection, &eligible, records, cursor) else {
            return Err(SelectError::NoCredentialAvailable);
        };

        let record = &mut records[picked];
        record.record_request(now);
        Ok(Lease {
            scheduler: Arc::clone(self),
            credential: record.id.clone(),
            settled: false,
        })
    }

    /// Record a success for a credential outside the lease flow.
    pub fn record_success(&self, credential: &str) {
        let now = Instant::now();
        let mut inner = self.lock();
        if let Some(&idx) = inner.index.get(credential) {
            inner.records[idx].record_success(now, &self.policy);
        }
    }

    /// Record a failure for a credential outside the lease flow.
    pub fn record_failure(&self, credential: &str) {
        let now = Instant::now();
        let mut inner = self.lock();
        if let Some(&idx) = inner.index.get(credential) {
            let policy = self.policy;
            let record = &mut inner.records[idx];
            record.record_failure(now, &policy);
            if record.health == HealthState::Tripped {
                tracing::warn!(
                    key = %mask_credential(credential),
                    failures = record.consecutive_failures,
                    "credential tripped, cooling down"
                );
            }
        }
    }

    /// Force a credential back to eligible, preserving cumulative totals.
    /// Returns whether the credential was known.
    pub fn reset(&self, credential: &str) -> bool {
        let mut inner = self.lock();
        if let Some(&idx) = inner.index.get(credential) {
            inner.records[idx].reset();
            true
        } else {
            false
        }
    }

    /// One sweep pass: promote expired cooldowns and collect idle records.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    /// [`Scheduler::sweep`] with an explicit clock, for tests.
    pub fn sweep_at(&self, now: Instant) {
        let mut inner = self.lock();
        for rec in &mut inner.records {
            if rec.maybe_promote(now) {
                tracing::info!(key = %mask_credential(&rec.id), "cooldown elapsed, probing credential");
            }
        }

        let before = inner.records.len();
        inner.records.retain(|rec| {
            let last_seen = rec.last_request_at.unwrap_or(rec.registered_at);
            rec.in_flight > 0 || now.saturating_duration_since(last_seen) < IDLE_TTL
        });
        if inner.records.len() != before {
            tracing::debug!(
                collected = before - inner.records.len(),
                "garbage-collected idle credentials"
            );
            inner.index = inner
                .records
                .iter()
                .enumerate()
                .map(|(idx, rec)| (rec.id.clone(), idx))
                .collect();
        }
    }

    /// Reporting snapshot. Counter reads may observe a transition in
    /// progress; that is acceptable for `/stats`.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let now = Instant::now();
        let inner = self.lock();
        let mut stats = SchedulerStats {
            policy: self.selection.as_str(),
            total: inner.records.len(),
            eligible: 0,
            tripped: 0,
            probing: 0,
            credentials: Vec::with_capacity(inner.records.len()),
        };
        for rec in &inner.records {
            match rec.health {
                HealthState::Eligible => stats.eligible += 1,
                HealthState::Tripped => stats.tripped += 1,
                HealthState::Probing => stats.probing += 1,
            }
            stats.credentials.push(rec.snapshot(now));
        }
        stats
    }

    /// Copy-out of one record for reporting.
    #[must_use]
    pub fn snapshot(&self, credential: &str) -> Option<CredentialSnapshot> {
        let now = Instant::now();
        let inner = self.lock();
        inner
            .index
            .get(credential)
            .map(|&idx| inner.records[idx].snapshot(now))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn finish(&self, credential: &str, outcome: Outcome) {
        let now = Instant::now();
        let mut inner = self.lock();
        let Some(&idx) = inner.index.get(credential) else {
            return;
        };
        let policy = self.policy;
        let record = &mut inner.records[idx];
        record.in_flight = record.in_flight.saturating_sub(1);
        match outcome {
            Outcome::Success => record.record_success(now, &policy),
            Outcome::Failure | Outcome::Abandoned => {
                record.record_failure(now, &policy);
                if record.health == HealthState::Tripped {
                    tracing::warn!(
                        key = %mask_credential(credential),
                        failures = record.consecutive_failures,
                        "credential tripped, cooling down"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("selection", &self.selection)
            .field("credentials", &self.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Success,
    Failure,
    /// Dropped without an outcome: the caller went away mid-request, so the
    /// dispatch is recorded as a network failure.
    Abandoned,
}

/// Registry-wide counters for `/stats`.
#[derive(Debug, Serialize)]
pub struct SchedulerStats {
    pub policy: &'static str,
    pub total: usize,
    pub eligible: usize,
    pub tripped: usize,
    pub probing: usize,
    pub credentials: Vec<CredentialSnapshot>,
}

/// A dispatched selection. Exactly one outcome is recorded per lease:
/// explicitly via [`Lease::succeed`] / [`Lease::fail`], or as an abandoned
/// dispatch when dropped unsettled.
pub struct Lease {
    scheduler: Arc<Scheduler>,
    credential: String,
    settled: bool,
}

impl Lease {
    #[must_use]
    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn succeed(mut self) {
        self.settle(Outcome::Success);
    }

    pub fn fail(mut self) {
        self.settle(Outcome::Failure);
    }

    fn settle(&mut self, outcome: Outcome) {
        if !self.settled {
            self.settled = true;
            self.scheduler.finish(&self.credential, outcome);
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(
                key = %mask_credential(&self.credential),
                "request abandoned before completion"
            );
            self.settle(Outcome::Abandoned);
        }
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("credential", &mask_credential(&self.credential))
            .field("settled", &self.settled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(selection: SelectionPolicy) -> Arc<Scheduler> {
        Arc::new(Scheduler::new(
            HealthPolicy {
                failure_threshold: 3,
                cooldown: Duration::from_millis(100),
                probes_to_close: 3,
            },
            selection,
        ))
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn round_robin_visits_each_credential_in_turn() {
        let sched = scheduler(SelectionPolicy::RoundRobin);
        sched.register(["k1", "k2", "k3"]);
        let pool = ids(&["k1", "k2", "k3"]);

        let mut order = Vec::new();
        for _ in 0..6 {
            let lease = sched.select(&pool).unwrap();
            order.push(lease.credential().to_string());
            lease.succeed();
        }
        assert_eq!(order, vec!["k1", "k2", "k3", "k1", "k2", "k3"]);

        let stats = sched.stats();
        assert_eq!(stats.eligible, 3);
        for snap in &stats.credentials {
            assert_eq!(snap.total_successes, 2);
            assert_eq!(snap.in_flight, 0);
        }
    }

    #[test]
    fn registration_deduplicates_preserving_first_occurrence() {
        let sched = scheduler(SelectionPolicy::RoundRobin);
        sched.register(["k1", "k2", "k1", "k3", "k2"]);
        assert_eq!(sched.len(), 3);
    }

    #[test]
    fn trip_and_recover_cycle() {
        let sched = scheduler(SelectionPolicy::RoundRobin);
        sched.register(["kA"]);
        let pool = ids(&["kA"]);
        let t0 = Instant::now();

        for _ in 0..3 {
            let lease = sched.select_at(t0, &pool).unwrap();
            lease.fail();
        }
        assert_eq!(sched.snapshot("kA").unwrap().health, "tripped");

        // Still cooling down.
        assert!(matches!(
            sched.select_at(t0 + Duration::from_millis(50), &pool),
            Err(SelectError::NoCredentialAvailable)
        ));

        // Cooldown elapsed: selection promotes to probing and hands it out.
        let lease = sched
            .select_at(t0 + Duration::from_millis(150), &pool)
            .unwrap();
        assert_eq!(lease.credential(), "kA");
        assert_eq!(sched.snapshot("kA").unwrap().health, "probing");
        lease.succeed();
        assert_eq!(sched.snapshot("kA").unwrap().health, "probing");

        for _ in 0..2 {
            let lease = sched
                .select_at(t0 + Duration::from_millis(200), &pool)
                .unwrap();
            lease.succeed();
        }
        assert_eq!(sched.snapshot("kA").unwrap().health, "eligible");
    }

    #[test]
    fn tripped_credentials_are_skipped_without_touching_in_flight() {
        let sched = scheduler(SelectionPolicy::RoundRobin);
        sched.register(["kX", "kY"]);
        for _ in 0..3 {
            sched.record_failure("kX");
        }
        assert_eq!(sched.snapshot("kX").unwrap().health, "tripped");

        let lease = sched.select(&ids(&["kX", "kY"])).unwrap();
        assert_eq!(lease.credential(), "kY");
        lease.succeed();

        let kx = sched.snapshot("kX").unwrap();
        assert_eq!(kx.in_flight, 0);
        assert_eq!(kx.total_requests, 0);
    }

    #[test]
    fn shrinking_the_candidate_list_prevents_repeats() {
        let sched = scheduler(SelectionPolicy::RoundRobin);
        sched.register(["k1", "k2"]);
        let mut remaining = ids(&["k1", "k2"]);

        let first = sched.select(&remaining).unwrap();
        remaining.retain(|c| c != first.credential());
        first.fail();

        let second = sched.select(&remaining).unwrap();
        assert_ne!(second.credential(), "k1");
        remaining.retain(|c| c != second.credential());
        second.fail();

        assert!(matches!(
            sched.select(&remaining),
            Err(SelectError::NoCredentialAvailable)
        ));
    }

    #[test]
    fn selection_ignores_unregistered_candidates() {
        let sched = scheduler(SelectionPolicy::RoundRobin);
        sched.register(["k1"]);
        assert!(matches!(
            sched.select(&ids(&["other"])),
            Err(SelectError::NoCredentialAvailable)
        ));
    }

    #[test]
    fn dropped_lease_counts_as_a_failure() {
        let sched = scheduler(SelectionPolicy::RoundRobin);
        sched.register(["k1"]);

        {
            let _lease = sched.select(&ids(&["k1"])).unwrap();
            // Client disconnected; the lease is dropped unsettled.
        }

        let snap = sched.snapshot("k1").unwrap();
        assert_eq!(snap.total_failures, 1);
        assert_eq!(snap.in_flight, 0);
    }

    #[test]
    fn sweeper_promotes_expired_cooldowns() {
        let sched = scheduler(SelectionPolicy::RoundRobin);
        sched.register(["kA"]);
        let t0 = Instant::now();
        for _ in 0..3 {
            sched.record_failure("kA");
        }

        sched.sweep_at(t0 + Duration::from_millis(50));
        assert_eq!(sched.snapshot("kA").unwrap().health, "tripped");

        sched.sweep_at(t0 + Duration::from_millis(200));
        assert_eq!(sched.snapshot("kA").unwrap().health, "probing");
    }

    #[test]
    fn sweeper_collects_idle_records() {
        let sched = scheduler(SelectionPolicy::RoundRobin);
        sched.register(["old", "fresh"]);
        let t0 = Instant::now();

        // "fresh" sees a request just before the sweep; "old" never does.
        let lease = sched.select_at(t0 + IDLE_TTL, &ids(&["fresh"])).unwrap();
        lease.succeed();

        sched.sweep_at(t0 + IDLE_TTL + Duration::from_secs(1));
        assert_eq!(sched.len(), 1);
        assert!(sched.snapshot("old").is_none());
        assert!(sched.snapshot("fresh").is_some());
    }

    #[test]
    fn reset_restores_eligibility() {
        let sched = scheduler(SelectionPolicy::RoundRobin);
        sched.register(["kA"]);
        for _ in 0..3 {
            sched.record_failure("kA");
        }
        assert_eq!(sched.snapshot("kA").unwrap().health, "tripped");

        assert!(sched.reset("kA"));
        assert_eq!(sched.snapshot("kA").unwrap().health, "eligible");
        assert_eq!(sched.snapshot("kA").unwrap().total_failures, 3);
        assert!(!sched.reset("unknown"));
    }

    #[test]
    fn least_in_flight_prefers_the_idle_credential() {
        let sched = scheduler(SelectionPolicy::LeastInFlight);
        sched.register(["k1", "k2"]);
        let pool = ids(&["k1", "k2"]);

        let held = sched.select(&pool).unwrap();
        assert_eq!(held.credential(), "k1");

        // k1 has one in flight, so k2 wins now.
        let lease = sched.select(&pool).unwrap();
        assert_eq!(lease.credential(), "k2");
        lease.succeed();
        held.succeed();
    }

    #[test]
    fn stats_serialize_with_masked_keys() {
        let sched = scheduler(SelectionPolicy::RoundRobin);
        sched.register(["AIzaSyB-abcdefghijklmnopqrstuvwx"]);
        let value = serde_json::to_value(sched.stats()).unwrap();
        assert_eq!(value["total"], 1);
        let key = value["credentials"][0]["key"].as_str().unwrap();
        assert!(!key.contains("abcdefghij"));
    }
}
