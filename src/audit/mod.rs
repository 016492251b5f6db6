//! Transaction completeness auditing and the machinery that keeps each
//! transaction's persisted `needs_review` flag up to date.
//!
//! Mutation call-sites never run the calculation themselves. They call
//! [RecomputeCoalescer::request_recompute] after their write, or wrap a group
//! of writes in [RecomputeCoalescer::batch], and the coalescer decides when
//! the calculation actually runs.
//!
//! The scheduling state is process local. Several server instances sharing
//! one database each coalesce on their own, so a burst spread across
//! instances can cost up to two runs per instance.

mod batch;
mod coalescer;
mod completeness;
mod store;
mod tax;

pub use batch::{BatchScope, FlushOptions};
pub use coalescer::{CoalescerConfig, RecomputeCoalescer, RecomputeKey};
pub use completeness::{
    CompletenessSnapshot, CompletenessStatus, calculate_completeness, classify_ratio,
};
pub use store::{AuditStore, SqliteAuditStore};
pub use tax::{SubtotalInference, SubtotalSource, infer_subtotal, infer_subtotal_from_parts};

/// The coalescer used by the application, backed by SQLite.
pub type Auditor = RecomputeCoalescer<SqliteAuditStore>;
