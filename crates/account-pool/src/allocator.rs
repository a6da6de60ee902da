//! Account allocation
//!
//! Moves one uniformly random account from `available` into `cooldown`. The
//! whole move runs under the store lock. The cooldown pool is grown before the
//! available pool is shrunk, so a crash between the two writes can duplicate
//! the account (repaired by [`crate::reconcile`]) but never lose it.

use std::time::SystemTime;

use rand::RngExt;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::record::{Account, CooldownEntry, CooldownLine};
use crate::store::PoolStore;

/// Allocate one account at `now`, starting its cooldown.
///
/// Returns `OutOfStock` with no pool changes when `available` is empty. If the
/// shrink of `available` fails after `cooldown` was grown, the cooldown write
/// is rolled back before the error is returned.
pub async fn allocate(store: &PoolStore, now: SystemTime) -> Result<Account> {
    let txn = store.lock().await;

    let mut available = txn.available().load().await?;
    if available.is_empty() {
        return Err(Error::OutOfStock);
    }

    let index = rand::rng().random_range(0..available.len());
    let account = available.remove(index);

    let mut cooldown = txn.cooldown().load().await?;
    cooldown.push(CooldownLine::Entry(CooldownEntry::new(account.clone(), now)));
    txn.cooldown().replace(&cooldown).await?;

    if let Err(e) = txn.available().replace(&available).await {
        cooldown.pop();
        if let Err(rollback) = txn.cooldown().replace(&cooldown).await {
            error!(
                error = %rollback,
                "cooldown rollback failed, account is now in two pools until reconciled"
            );
        }
        return Err(e);
    }

    debug!(
        remaining = available.len(),
        cooling_down = cooldown.len(),
        "account allocated"
    );
    Ok(account)
}
