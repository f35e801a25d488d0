//! Bucket Allocator
//!
//! Fixed-size slab classes, one pre-reserved pool per power-of-two size.
//! Nothing is allocated after construction: every slot exists from the
//! start and only moves between the free and used state.
//!
//! # Architecture
//!
//! ```text
//! BucketEngine
//!   ├─→ Bucket(16B  x 10)  → Free: 3 → 7 → 1   Used: {0, 2, 4, 5, 6, 8, 9}
//!   ├─→ Bucket(32B  x 10)  → Free: 0 → 1 → …   Used: {}
//!   ├─→ Bucket(64B  x 0)   → disabled
//!   └─→ Bucket(128B x 4)   → Free: (none)      Used: {0, 1, 2, 3}
//!
//! EngineStats (optional)
//!   └─→ per class: allocated / freed / high-water mark / reallocs / overflows
//! ```
//!
//! A request is classified into the smallest class that fits. An exhausted
//! class either fails with `OutOfMemory` or, with overflow enabled, hands the
//! request to the next larger class.

pub mod bucket;
pub mod engine;
pub mod production_tests;
pub mod size_class;
pub mod slot;
pub mod stats;

pub use bucket::{Bucket, FREED_SENTINEL, SLOT_ALIGN};
pub use engine::{BucketEngine, ENGINE_NAME};
pub use size_class::{class_size, classify, SizeClassTable, MIN_CLASS_SIZE};
pub use slot::SlotPtr;
pub use stats::{ClassStats, CompactLine, CompactReport, DetailedReport, EngineStats};
