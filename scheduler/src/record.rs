//! Per-credential health record and its transition functions.
//!
//! All registry mutations flow through the methods here, which keeps the
//! record invariants local: `total_requests >= total_successes +
//! total_failures`, a tripped record always carries a future cooldown
//! deadline at transition time, and the probe counter is only meaningful
//! while probing.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Health state machine configuration.
#[derive(Debug, Clone, Copy)]
pub struct HealthPolicy {
    /// Consecutive failures before a credential trips.
    pub failure_threshold: u32,
    /// How long a tripped credential is excluded from selection.
    pub cooldown: Duration,
    /// Probe successes required to close back to eligible.
    pub probes_to_close: u32,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
            probes_to_close: 3,
        }
    }
}

/// Where a credential sits in its trip/recover cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Eligible for selection.
    Eligible,
    /// Excluded until the cooldown deadline passes.
    Tripped,
    /// Eligible again, but a single failure re-trips immediately.
    Probing,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eligible => "eligible",
            Self::Tripped => "tripped",
            Self::Probing => "probing",
        }
    }
}

/// The scheduler's view of one credential.
///
/// Consecutive failures drive state transitions; the cumulative counters are
/// diagnostic only and never reset.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub id: String,
    pub health: HealthState,
    pub consecutive_failures: u32,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub registered_at: Instant,
    pub last_request_at: Option<Instant>,
    pub last_success_at: Option<Instant>,
    pub last_failure_at: Option<Instant>,
    pub cooldown_until: Option<Instant>,
    pub probe_successes: u32,
    pub in_flight: u32,
}

impl CredentialRecord {
    #[must_use]
    pub fn new(id: String, now: Instant) -> Self {
        Self {
            id,
            health: HealthState::Eligible,
            consecutive_failures: 0,
            total_requests: 0,
            total_successes: 0,
            total_failures: 0,
            registered_at: now,
            last_request_at: None,
            last_success_at: None,
            last_failure_at: None,
            cooldown_until: None,
            probe_successes: 0,
            in_flight: 0,
        }
    }

    /// A request is being dispatched against this credential.
    pub fn record_request(&mut self, now: Instant) {
        self.total_requests += 1;
        self.last_request_at = Some(now);
        self.in_flight += 1;
    }

    /// The most recent dispatch completed successfully.
    pub fn record_success(&mut self, now: Instant, policy: &HealthPolicy) {
        self.total_successes += 1;
        self.last_success_at = Some(now);
        match self.health {
            HealthState::Eligible => {
                self.consecutive_failures = 0;
            }
            HealthState::Probing => {
                self.probe_successes += 1;
                if self.probe_successes >= policy.probes_to_close {
                    self.health = HealthState::Eligible;
                    self.consecutive_failures = 0;
                    self.probe_successes = 0;
                }
            }
            // A success against a tripped credential can only come from a
            // request dispatched before the trip; it does not reopen anything.
            HealthState::Tripped => {}
        }
    }

    /// The most recent dispatch failed.
    pub fn record_failure(&mut self, now: Instant, policy: &HealthPolicy) {
        self.total_failures += 1;
        self.last_failure_at = Some(now);
        self.consecutive_failures += 1;
        match self.health {
            HealthState::Eligible => {
                if self.consecutive_failures >= policy.failure_threshold {
                    self.trip(now, policy);
                }
            }
            HealthState::Probing => {
                self.trip(now, policy);
            }
            HealthState::Tripped => {}
        }
    }

    fn trip(&mut self, now: Instant, policy: &HealthPolicy) {
        self.health = HealthState::Tripped;
        self.cooldown_until = Some(now + policy.cooldown);
        self.probe_successes = 0;
    }

    /// Promote a tripped record to probing once its cooldown has elapsed.
    /// Returns whether a promotion happened.
    pub fn maybe_promote(&mut self, now: Instant) -> bool {
        if self.health == HealthState::Tripped
            && self.cooldown_until.is_some_and(|deadline| now >= deadline)
        {
            self.health = HealthState::Probing;
            self.cooldown_until = None;
            self.probe_successes = 0;
            return true;
        }
        false
    }

    /// Manual reset: force eligible and clear the failure streak while
    /// preserving cumulative totals.
    pub fn reset(&mut self) {
        self.health = HealthState::Eligible;
        self.consecutive_failures = 0;
        self.cooldown_until = None;
        self.probe_successes = 0;
    }

    /// Eligible for selection right now (eligible or probing).
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        matches!(self.health, HealthState::Eligible | HealthState::Probing)
    }

    /// Copy-out for reporting, with the credential masked.
    #[must_use]
    pub fn snapshot(&self, now: Instant) -> CredentialSnapshot {
        CredentialSnapshot {
            key: relay_types::mask_credential(&self.id),
            health: self.health.as_str(),
            consecutive_failures: self.consecutive_failures,
            total_requests: self.total_requests,
            total_successes: self.total_successes,
            total_failures: self.total_failures,
            in_flight: self.in_flight,
            cooldown_remaining_ms: self.cooldown_until.map(|deadline| {
                deadline.saturating_duration_since(now).as_millis() as u64
            }),
        }
    }
}

/// Reporting view of one credential, safe to serialize into `/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialSnapshot {
    pub key: String,
    pub health: &'static str,
    pub consecutive_failures: u32,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub in_flight: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_ms: Option<u64>,
}
