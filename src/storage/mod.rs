//! In-memory file storage
//!
//! # Architecture
//!
//! ```text
//! Repository (path → current version)
//!   └─→ StoredEntry (idle clock, access count, frozen threshold)
//!        └─→ Slab (append-only bytes, complete/failed, reader wakeups)
//!
//! ExpirySweeper ──every interval──▶ Repository::sweep_expired
//! ```
//!
//! Uploads stream into a [`Slab`] through a [`ChunkSource`]; downloads
//! stream out through a [`ChunkSink`], following the writer in real time.
//! The [`Repository`] publishes one current version per path and detaches
//! old versions without interrupting their readers. Idle entries are
//! evicted by the [`ExpirySweeper`] using thresholds chosen by the
//! [`ExpirationPolicy`].

pub mod expiry;
pub mod metrics;
pub mod policy;
pub mod repository;
pub mod slab;

pub use expiry::{start_sweeper, ExpirySweeper, SweepConfig};
pub use metrics::{MetricsSnapshot, StorageMetrics};
pub use policy::{ExpirationPolicy, PatternOverride, DEFAULT_EXPIRATION};
pub use repository::{EntrySnapshot, Repository, StoredEntry};
pub use slab::{
    AppendOutcome, ChunkSink, ChunkSource, ReadOutcome, SinkStatus, Slab, READ_CHUNK_SIZE,
};
