//! Cooldown recycling
//!
//! A fixed-interval sweep promotes expired cooldown entries into the released
//! pool. One sweep per interval instead of a timer per entry: an account may sit
//! in cooldown up to one interval past its expiry.
//!
//! Within a sweep, `released` is grown before `cooldown` is shrunk, and accounts
//! already present in `released` are not appended again. A crash or failed
//! write between the two steps therefore leaves at worst a duplicate, which the
//! next sweep or [`crate::reconcile`] clears.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::MissedTickBehavior;
use tracing::{error, warn};

use crate::clock;
use crate::error::Result;
use crate::pool::AccountPool;
use crate::record::{Account, CooldownLine};
use crate::store::PoolStore;

/// Default time between sweeps (1 hour).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3_600);

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    /// Parsed entries still serving their cooldown.
    pub retained: usize,
    /// Entries promoted to `released`.
    pub moved: usize,
    /// Unparsable lines left untouched in `cooldown`.
    pub malformed: usize,
}

/// Promote every cooldown entry that has expired at `now`.
///
/// Writes nothing when no entry has expired.
pub async fn sweep(store: &PoolStore, cooldown: Duration, now: SystemTime) -> Result<SweepReport> {
    let txn = store.lock().await;
    let lines = txn.cooldown().load().await?;

    let mut expired: Vec<Account> = Vec::new();
    let mut retained: Vec<CooldownLine> = Vec::with_capacity(lines.len());
    for line in lines {
        match line {
            CooldownLine::Entry(entry) if clock::is_expired(&entry, now, cooldown) => {
                expired.push(entry.into_account());
            }
            other => retained.push(other),
        }
    }

    let malformed = retained.iter().filter(|l| l.is_malformed()).count();
    let report = SweepReport {
        retained: retained.len() - malformed,
        moved: expired.len(),
        malformed,
    };
    if expired.is_empty() {
        return Ok(report);
    }

    let released = txn.released().load().await?;
    let already_released: HashSet<&Account> = released.iter().collect();
    let fresh: Vec<Account> = expired
        .iter()
        .filter(|account| !already_released.contains(account))
        .cloned()
        .collect();
    if fresh.len() < expired.len() {
        warn!(
            duplicates = expired.len() - fresh.len(),
            "expired accounts already present in released pool, not appending again"
        );
    }

    txn.released().append(&fresh).await?;
    txn.cooldown().replace(&retained).await?;
    Ok(report)
}

/// Spawn the background recycler.
///
/// The first sweep runs immediately, so entries that expired while the process
/// was down are promoted at startup, then every `interval`. Each sweep runs as
/// its own task: a store error or a panic is logged and the loop carries on
/// with the next tick.
pub fn spawn_recycle_task(pool: Arc<AccountPool>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            run_cycle(&pool).await;
        }
    })
}

/// Run one supervised sweep.
async fn run_cycle(pool: &Arc<AccountPool>) {
    let cycle_pool = Arc::clone(pool);
    let outcome = tokio::spawn(async move { cycle_pool.sweep().await }).await;

    match outcome {
        Ok(Ok(_)) => {
            metrics::counter!("account_pool_sweeps_total", "outcome" => "ok").increment(1);
        }
        Ok(Err(e)) => {
            metrics::counter!("account_pool_sweeps_total", "outcome" => "failed").increment(1);
            warn!(error = %e, "sweep failed, will retry next interval");
        }
        Err(e) => {
            metrics::counter!("account_pool_sweeps_total", "outcome" => "panicked").increment(1);
            error!(error = %e, "sweep task panicked, will retry next interval");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::DEFAULT_COOLDOWN;
    use crate::record::CooldownEntry;
    use crate::store::PoolPaths;
    use std::time::UNIX_EPOCH;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn entry(id: &str, secs: u64) -> CooldownLine {
        CooldownEntry::new(Account::new(id), at(secs)).into()
    }

    async fn store_with_cooldown(dir: &tempfile::TempDir, lines: &[CooldownLine]) -> PoolStore {
        let store = PoolStore::new(PoolPaths::in_dir(dir.path()));
        store.lock().await.cooldown().replace(lines).await.unwrap();
        store
    }

    fn ids(accounts: &[Account]) -> Vec<&str> {
        accounts.iter().map(Account::expose).collect()
    }

    #[tokio::test]
    async fn expired_entries_move_to_released() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_cooldown(&dir, &[entry("A", 1_000)]).await;

        let report = sweep(&store, DEFAULT_COOLDOWN, at(1_000 + 86_400))
            .await
            .unwrap();
        assert_eq!(
            report,
            SweepReport {
                retained: 0,
                moved: 1,
                malformed: 0
            }
        );

        let snapshot = store.snapshot().await.unwrap();
        assert!(snapshot.cooldown.is_empty());
        assert_eq!(ids(&snapshot.released), vec!["A"]);
    }

    #[tokio::test]
    async fn never_promotes_early() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_cooldown(
            &dir,
            &[entry("old", 0), entry("edge", 1_000), entry("young", 1_001)],
        )
        .await;

        let now = at(1_000 + 86_400);
        let report = sweep(&store, DEFAULT_COOLDOWN, now).await.unwrap();
        assert_eq!(report.moved, 2);
        assert_eq!(report.retained, 1);

        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(ids(&snapshot.released), vec!["old", "edge"]);
        assert_eq!(snapshot.cooldown, vec![entry("young", 1_001)]);
    }

    #[tokio::test]
    async fn nothing_expired_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PoolPaths::in_dir(dir.path());
        tokio::fs::write(&paths.cooldown, "5000|A\n\n5001|B\n")
            .await
            .unwrap();
        let store = PoolStore::new(paths.clone());

        let report = sweep(&store, DEFAULT_COOLDOWN, at(6_000)).await.unwrap();
        assert_eq!(report.moved, 0);
        assert_eq!(report.retained, 2);

        // The blank line is still there: the file was not rewritten
        let contents = tokio::fs::read_to_string(&paths.cooldown).await.unwrap();
        assert_eq!(contents, "5000|A\n\n5001|B\n");
        assert!(!paths.released.exists());
    }

    #[tokio::test]
    async fn empty_cooldown_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = PoolStore::new(PoolPaths::in_dir(dir.path()));

        let report = sweep(&store, DEFAULT_COOLDOWN, at(0)).await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn malformed_line_survives_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PoolPaths::in_dir(dir.path());
        tokio::fs::write(&paths.cooldown, "100|A\nnot|a|timestamp\n200|B\n")
            .await
            .unwrap();
        let store = PoolStore::new(paths.clone());

        let report = sweep(&store, DEFAULT_COOLDOWN, at(200 + 86_400))
            .await
            .unwrap();
        assert_eq!(report.moved, 2);
        assert_eq!(report.malformed, 1);
        assert_eq!(report.retained, 0);

        let cooldown = tokio::fs::read_to_string(&paths.cooldown).await.unwrap();
        assert_eq!(cooldown, "not|a|timestamp\n");
        let released = tokio::fs::read_to_string(&paths.released).await.unwrap();
        assert_eq!(released, "A\nB\n");
    }

    #[tokio::test]
    async fn appends_after_existing_released() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_cooldown(&dir, &[entry("new", 0)]).await;
        store
            .lock()
            .await
            .released()
            .replace(&[Account::new("older")])
            .await
            .unwrap();

        sweep(&store, DEFAULT_COOLDOWN, at(86_400)).await.unwrap();

        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(ids(&snapshot.released), vec!["older", "new"]);
    }

    #[tokio::test]
    async fn interrupted_sweep_does_not_duplicate_on_retry() {
        // State left by a crash after the released append but before the
        // cooldown shrink: "A" is in both pools.
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_cooldown(&dir, &[entry("A", 0)]).await;
        store
            .lock()
            .await
            .released()
            .replace(&[Account::new("A")])
            .await
            .unwrap();

        let report = sweep(&store, DEFAULT_COOLDOWN, at(86_400)).await.unwrap();
        assert_eq!(report.moved, 1);

        let snapshot = store.snapshot().await.unwrap();
        assert!(snapshot.cooldown.is_empty());
        assert_eq!(ids(&snapshot.released), vec!["A"]);
    }

    #[tokio::test]
    async fn sweep_after_restart_uses_persisted_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store_with_cooldown(&dir, &[entry("A", 10), entry("B", 50_000)]).await;
            sweep(&store, DEFAULT_COOLDOWN, at(20)).await.unwrap();
        }

        let reopened = PoolStore::new(PoolPaths::in_dir(dir.path()));
        let report = sweep(&reopened, DEFAULT_COOLDOWN, at(10 + 86_400))
            .await
            .unwrap();
        assert_eq!(report.moved, 1);

        let snapshot = reopened.snapshot().await.unwrap();
        assert_eq!(ids(&snapshot.released), vec!["A"]);
        assert_eq!(snapshot.cooldown, vec![entry("B", 50_000)]);
    }

    #[tokio::test]
    async fn failed_sweep_leaves_cooldown_intact() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PoolPaths::in_dir(dir.path());
        let store = store_with_cooldown(&dir, &[entry("A", 0)]).await;
        // Released pool path is a directory, so it can be neither read nor replaced
        tokio::fs::create_dir(&paths.released).await.unwrap();

        let err = sweep(&store, DEFAULT_COOLDOWN, at(86_400)).await.unwrap_err();
        assert!(matches!(err, crate::Error::StoreUnavailable(_)));

        let cooldown = store.lock().await.cooldown().load().await.unwrap();
        assert_eq!(cooldown, vec![entry("A", 0)]);
    }

    #[tokio::test]
    async fn background_task_keeps_running_after_failed_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PoolPaths::in_dir(dir.path());
        let pool = Arc::new(AccountPool::new(
            PoolStore::new(paths.clone()),
            Duration::ZERO,
        ));
        tokio::fs::write(&paths.cooldown, "1|A\n").await.unwrap();
        tokio::fs::create_dir(&paths.released).await.unwrap();

        let handle = spawn_recycle_task(pool.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished(), "recycler must survive failed sweeps");

        // Fix the store; a later cycle should succeed
        tokio::fs::remove_dir(&paths.released).await.unwrap();
        let mut moved = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let snapshot = pool.store().snapshot().await.unwrap();
            if snapshot.cooldown.is_empty() && snapshot.released.len() == 1 {
                moved = true;
                break;
            }
        }
        handle.abort();
        assert!(moved, "recycler should promote the entry once the store recovers");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn allocations_and_sweeps_interleave_without_loss_or_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PoolStore::new(PoolPaths::in_dir(dir.path())));
        let accounts: Vec<Account> = (0..120).map(|i| Account::new(format!("acct-{i}"))).collect();
        store.lock().await.available().replace(&accounts).await.unwrap();

        let mut allocations = Vec::new();
        let mut sweeps = Vec::new();
        for i in 0..120 {
            let alloc_store = Arc::clone(&store);
            allocations.push(tokio::spawn(async move {
                crate::allocator::allocate(&alloc_store, SystemTime::now()).await
            }));
            if i % 3 == 0 {
                let store = Arc::clone(&store);
                sweeps.push(tokio::spawn(async move {
                    sweep(&store, Duration::ZERO, SystemTime::now()).await
                }));
            }
        }

        let mut handed_out = HashSet::new();
        for task in allocations {
            let account = task.await.unwrap().unwrap();
            assert!(handed_out.insert(account.expose().to_string()));
        }
        for task in sweeps {
            task.await.unwrap().unwrap();
        }

        // Mid-run: every account is in exactly one pool
        let snapshot = store.snapshot().await.unwrap();
        assert!(snapshot.available.is_empty());
        assert_eq!(snapshot.malformed(), 0);
        let mut seen: HashSet<&str> = ids(&snapshot.released).into_iter().collect();
        for line in &snapshot.cooldown {
            assert!(seen.insert(line.account().unwrap().expose()));
        }
        assert_eq!(seen.len(), 120);
        assert_eq!(snapshot.cooling_down() + snapshot.released.len(), 120);

        sweep(&store, Duration::ZERO, SystemTime::now()).await.unwrap();
        let snapshot = store.snapshot().await.unwrap();
        assert!(snapshot.cooldown.is_empty());
        let released: HashSet<&str> = ids(&snapshot.released).into_iter().collect();
        assert_eq!(snapshot.released.len(), 120);
        assert_eq!(released.len(), 120);
        let handed_out: HashSet<&str> = handed_out.iter().map(String::as_str).collect();
        assert_eq!(released, handed_out);
    }
}
