//! Core business logic module
//!
//! This module contains the storage and aggregation components:
//! - `layout` / `codec` - Header resolution and grouped-run encoding
//! - `deleter` - Contiguous-range row deletion
//! - `store` - Typed record stores over one sheet each
//! - `sequence` - Lock-guarded identifier minting
//! - `cache` - Best-effort read cache of serialized aggregates
//! - `aggregator` - Cross-store joins and rollups
//! - `journal` - Monthly journal export
//! - `retry` / `extraction` - Inference calls with bounded retry
//! - `documents` - Rendered document publishing
//! - `service` - The operation facade tying everything together

pub mod aggregator;
pub mod cache;
pub mod codec;
pub mod deleter;
pub mod documents;
pub mod extraction;
pub mod journal;
pub mod layout;
pub mod retry;
pub mod sequence;
pub mod service;
pub mod store;

pub use aggregator::Snapshot;
pub use cache::{CacheKey, ReadCache};
pub use extraction::{InferenceClient, InferenceError};
pub use retry::RetryPolicy;
pub use sequence::SequenceGenerator;
pub use service::{Backends, LedgerService};
pub use store::RecordStore;
