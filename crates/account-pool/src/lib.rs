//! Single-use account pool with durable cooldown tracking
//!
//! Accounts move one way through three file-backed pools:
//!
//! 1. Provisioning (external) writes accounts into `available`
//! 2. [`AccountPool::allocate`] picks one at random, hands it out and records it
//!    in `cooldown` with the allocation time
//! 3. The background recycler sweeps `cooldown` on a fixed interval and moves
//!    entries whose cooldown has elapsed into `released`
//! 4. Accounts stay in `released` for good
//!
//! All pool mutations go through [`PoolStore`], which serializes them behind one
//! lock and writes files atomically. Writes grow the destination pool before
//! shrinking the source; [`AccountPool::reconcile`] clears any duplicate an
//! interrupted write leaves behind.

pub mod allocator;
pub mod clock;
pub mod error;
pub mod pool;
pub mod reconcile;
pub mod record;
pub mod recycler;
pub mod store;

pub use clock::DEFAULT_COOLDOWN;
pub use error::{Error, Result};
pub use pool::AccountPool;
pub use reconcile::ReconcileReport;
pub use record::{Account, CooldownEntry, CooldownLine, Record};
pub use recycler::{DEFAULT_SWEEP_INTERVAL, SweepReport, spawn_recycle_task};
pub use store::{PoolPaths, PoolSnapshot, PoolStore, PoolTxn};
