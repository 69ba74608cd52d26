//! Tree enumeration and parallel processing
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────┐   bounded (N × 4)   ┌───────────┐
//!   │ tree-walker  │ ──────────────────► │ Worker 1  │ ──┐
//!   │  read_dir    │         │           ├───────────┤   │  results
//!   │  (1 thread)  │         └─────────► │ Worker N  │ ──┴──────────►
//!   └──────────────┘                     └───────────┘
//! ```

pub mod pool;
pub mod tree;
pub mod types;

pub use pool::{PoolStats, WorkerPool};
pub use tree::{walk, WalkOptions};
pub use types::{EntryKind, FilePathMode};
