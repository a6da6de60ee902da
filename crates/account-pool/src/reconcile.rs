//! Startup reconciliation
//!
//! Allocation and sweeping both grow the destination pool before shrinking the
//! source, so an interrupted move leaves an account in two pools. This pass
//! keeps each account only in the furthest pool it reached
//! (released > cooldown > available) and drops repeats within a pool, keeping
//! the first occurrence. Malformed cooldown lines are never touched.

use std::collections::HashSet;

use crate::error::Result;
use crate::record::{Account, CooldownLine};
use crate::store::PoolStore;

/// Number of duplicate records removed from each pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    pub available_removed: usize,
    pub cooldown_removed: usize,
    pub released_removed: usize,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.available_removed + self.cooldown_removed + self.released_removed
    }
}

/// Remove cross-pool and in-pool duplicates, rewriting only pools that change.
pub async fn reconcile(store: &PoolStore) -> Result<ReconcileReport> {
    let txn = store.lock().await;
    let released = txn.released().load().await?;
    let cooldown = txn.cooldown().load().await?;
    let available = txn.available().load().await?;

    let mut seen: HashSet<Account> = HashSet::new();
    let (released, released_removed) = keep_unseen(released, &mut seen, |a| Some(a));
    let (cooldown, cooldown_removed) = keep_unseen(cooldown, &mut seen, CooldownLine::account);
    let (available, available_removed) = keep_unseen(available, &mut seen, |a| Some(a));

    if released_removed > 0 {
        txn.released().replace(&released).await?;
    }
    if cooldown_removed > 0 {
        txn.cooldown().replace(&cooldown).await?;
    }
    if available_removed > 0 {
        txn.available().replace(&available).await?;
    }

    Ok(ReconcileReport {
        available_removed,
        cooldown_removed,
        released_removed,
    })
}

/// Keep records whose account has not been seen yet. Records without an
/// account (malformed lines) are always kept.
fn keep_unseen<R>(
    records: Vec<R>,
    seen: &mut HashSet<Account>,
    account_of: impl Fn(&R) -> Option<&Account>,
) -> (Vec<R>, usize) {
    let before = records.len();
    let kept: Vec<R> = records
        .into_iter()
        .filter(|record| match account_of(record) {
            Some(account) => seen.insert(account.clone()),
            None => true,
        })
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}
