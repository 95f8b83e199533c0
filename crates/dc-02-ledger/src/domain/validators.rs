//! Validator election from stored votes.
//!
//! The number of validators is the weighted average vote-list length over
//! the middle half (25% to 75%) of voting weight, never fewer than the
//! standby set. The seats go to the most-voted registered candidates,
//! topped up from the standby list.

use super::errors::{LedgerError, LedgerResult};
use super::states::ValidatorState;
use shared_crypto::{multisig_redeem_script, script_hash, PublicKey};
use shared_types::{Fixed8, UInt160};
use std::collections::BTreeSet;

/// Byzantine quorum for `n` validators.
pub fn quorum(n: usize) -> usize {
    n - n.saturating_sub(1) / 3
}

/// Script hash of the `quorum(n)`-of-`n` contract over `validators`.
pub fn consensus_address(validators: &[PublicKey]) -> LedgerResult<UInt160> {
    let script = multisig_redeem_script(quorum(validators.len()), validators)
        .map_err(|e| LedgerError::ValidatorSet(e.to_string()))?;
    Ok(script_hash(&script))
}

/// Re-weight `items` to the slice of cumulative weight between `start` and
/// `end` (fractions of the total). Items wholly outside are dropped.
pub fn weighted_filter<T: Copy>(items: &[(T, i64)], start: f64, end: f64) -> Vec<(T, i64)> {
    let amount: f64 = items.iter().map(|(_, w)| *w as f64).sum();
    let mut result = Vec::new();
    if amount <= 0.0 {
        return result;
    }
    let mut sum: i64 = 0;
    let mut current = 0.0;
    for (item, weight) in items {
        if current >= end {
            break;
        }
        sum += weight;
        let old = current;
        current = sum as f64 / amount;
        if current <= start {
            continue;
        }
        let weight = if old < start {
            if current > end {
                ((end - start) * amount) as i64
            } else {
                ((current - start) * amount) as i64
            }
        } else if current > end {
            ((end - old) * amount) as i64
        } else {
            *weight
        };
        result.push((*item, weight));
    }
    result
}

/// Integer weighted average; zero when there is no weight.
pub fn weighted_average(items: &[(i64, i64)]) -> i64 {
    let mut sum_weight: i128 = 0;
    let mut total: i128 = 0;
    for (value, weight) in items {
        sum_weight += i128::from(*weight);
        total += i128::from(*value) * i128::from(*weight);
    }
    if sum_weight == 0 {
        0
    } else {
        (total / sum_weight) as i64
    }
}

/// Validator count implied by the vote-length tally.
pub fn elected_count(vote_lengths: &[Fixed8], standby: usize) -> usize {
    let voted: Vec<(i64, i64)> = vote_lengths
        .iter()
        .enumerate()
        .filter(|(_, votes)| votes.is_positive())
        .map(|(i, votes)| (i as i64, votes.raw()))
        .collect();
    let filtered = weighted_filter(&voted, 0.25, 0.75);
    let count = weighted_average(&filtered).max(0) as usize;
    count.max(standby)
}

/// The `count` elected keys, ascending.
pub fn select_validators(
    mut candidates: Vec<ValidatorState>,
    standby: &[PublicKey],
    count: usize,
) -> Vec<PublicKey> {
    let standby_set: BTreeSet<&PublicKey> = standby.iter().collect();
    candidates.retain(|v| (v.registered && v.votes.is_positive()) || standby_set.contains(&v.public_key));
    candidates.sort_by(|a, b| b.votes.cmp(&a.votes).then(a.public_key.cmp(&b.public_key)));
    let mut chosen: BTreeSet<PublicKey> = candidates
        .into_iter()
        .take(count)
        .map(|v| v.public_key)
        .collect();
    for key in standby {
        if chosen.len() >= count {
            break;
        }
        chosen.insert(*key);
    }
    chosen.into_iter().collect()
}
