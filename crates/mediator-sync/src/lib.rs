//! The synchronization pipeline: resolve a changed resource, validate it,
//! transform it across the system boundary and upsert it downstream, keyed by
//! official identifier so that re-running is idempotent.

pub mod item;
pub mod pipeline;
pub mod retry;
pub mod summary;

pub use item::{SyncItem, SyncState};
pub use pipeline::{SyncPipeline, SyncTarget};
pub use retry::RetryPolicy;
pub use summary::{SyncOutcome, SyncSummary, TypeCounts};
