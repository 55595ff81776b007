//! Building blocks shared by the thread and allow-from caches
//!
//! Both caches keep one `CacheEntry` per key. A refresh runs as a spawned
//! task whose handle is wrapped in a `Shared` future and parked on the entry,
//! so every caller that finds the entry stale while the task runs awaits the
//! same result instead of issuing its own remote call.

mod entry;

pub use entry::{CacheEntry, Inflight, catch_panic, spawn_shared};
