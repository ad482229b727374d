//! Selection policies over the eligible set.

use crate::record::CredentialRecord;
use relay_types::SelectionPolicy;

/// Pick one index out of `eligible` (indices into `records`, in registration
/// order). Returns `None` only when the eligible set is empty.
///
/// The round-robin cursor advances on every successful selection regardless
/// of the call's later outcome, and stays valid when the eligible set
/// shrinks between calls because it is reduced modulo the current size.
pub(crate) fn pick(
    policy: SelectionPolicy,
    eligible: &[usize],
    records: &[CredentialRecord],
    cursor: &mut u64,
) -> Option<usize> {
    if eligible.is_empty() {
        return None;
    }
    let picked = match policy {
        SelectionPolicy::RoundRobin => {
            let slot = (*cursor % eligible.len() as u64) as usize;
            *cursor = cursor.wrapping_add(1);
            eligible[slot]
        }
        SelectionPolicy::Random => eligible[rand::random_range(0..eligible.len())],
        SelectionPolicy::LeastInFlight => eligible
            .iter()
            .copied()
            .min_by_key(|&idx| (records[idx].in_flight, idx))?,
    };
    Some(picked)
}
