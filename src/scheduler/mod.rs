//! # Refresh Scheduler
//!
//! Background work that keeps the proxy warm:
//! - the token loop re-acquires the bearer credential before it goes stale
//! - the cache loop re-walks the taxonomy tree from the canonical root
//!
//! The full-tree walk is guarded by [`SingleFlight`], shared with the manual
//! refresh endpoint, so at most one runs at any time.

pub mod periodic;
pub mod refresher;
pub mod single_flight;

pub use periodic::{run_periodic, spawn_cache_loop, spawn_token_loop, Schedule};
pub use refresher::{CacheRefresher, LastRefresh, RefreshOutcome, RefreshTrigger};
pub use single_flight::{FlightGuard, SingleFlight};
