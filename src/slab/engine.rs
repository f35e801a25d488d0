//! Bucket allocation engine
//!
//! Owns one [`Bucket`] per configured size class and applies the
//! allocation policies on top of them:
//!
//! - requests are classified into the smallest class that fits;
//! - an exhausted class fails immediately, or with `allow_overflow` the
//!   request walks up to the next larger classes;
//! - reallocation keeps the slot when the new size stays in the same class
//!   (or shrinks while `shrink_reallocates` is off), otherwise it moves.
//!
//! All bucket storage is reserved from the global allocator in
//! [`BucketEngine::new`]. The engine never allocates from itself and never
//! touches the global allocator again for slot storage.
//!
//! The engine is single-threaded: it is neither `Send` nor `Sync`.

use super::bucket::Bucket;
use super::size_class::SizeClassTable;
use super::slot::SlotPtr;
use super::stats::EngineStats;
use crate::allocator::{Allocator, AllocatorIdentity, Capabilities, Capability};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use tracing::{debug, info, warn};

/// Name reported through [`AllocatorIdentity`]
pub const ENGINE_NAME: &str = "bucket";

/// Fixed-capacity, per-size-class allocator
#[derive(Debug)]
pub struct BucketEngine {
    config: EngineConfig,
    table: SizeClassTable,
    buckets: Vec<Bucket>,
    stats: Option<EngineStats>,
}

impl BucketEngine {
    /// Free, resize and ownership tests; nothing else
    pub const CAPABILITIES: Capabilities = Capabilities::empty()
        .with(Capability::Free)
        .with(Capability::Resize)
        .with(Capability::Ownership);

    /// Identity shared by every engine instance
    pub fn engine_identity() -> AllocatorIdentity {
        AllocatorIdentity {
            name: ENGINE_NAME.to_string(),
            version: crate::VERSION.to_string(),
        }
    }

    /// Reserve every bucket described by `config`
    pub fn new(config: EngineConfig) -> Result<Self> {
        let table = config.size_classes()?;

        let buckets = table
            .iter()
            .map(|(index, size, capacity)| Bucket::new(index, size, capacity, config.zero_on_free))
            .collect::<Result<Vec<_>>>()?;

        let stats = config.record_stats.then(|| {
            EngineStats::new(
                buckets
                    .iter()
                    .map(|b| (b.slot_size(), b.capacity(), b.byte_range())),
            )
        });

        info!(
            classes = table.len(),
            reserved_bytes = table.total_bytes(),
            overflow = config.allow_overflow,
            "Initialized bucket engine with capacities {:?}",
            config.capacities
        );

        Ok(Self {
            config,
            table,
            buckets,
            stats,
        })
    }

    /// Allocate a slot of at least `size` bytes
    pub fn allocate(&mut self, size: isize) -> Result<SlotPtr> {
        let class = self.table.classify(size)?;
        let (_, ptr) = self.allocate_from(class, size)?;
        Ok(ptr)
    }

    /// Resize the allocation at `ptr` to hold `new_size` bytes
    ///
    /// Returns `ptr` itself when no move is needed. Otherwise the payload
    /// prefix that fits both classes is copied into a new slot and the old
    /// slot is released. `old_size` is only a hint; the current class is
    /// derived from `ptr`.
    pub fn reallocate(&mut self, ptr: SlotPtr, new_size: isize, old_size: isize) -> Result<SlotPtr> {
        let current = self.used_class_of(ptr)?;
        let target = self.table.classify(new_size)?;

        if let Some(stats) = self.stats.as_mut() {
            stats.on_reallocate(target);
        }

        let keep = target == current || (!self.config.shrink_reallocates && target < current);
        if keep {
            debug!(%ptr, class = current, new_size, old_size, "Reallocate kept slot");
            return Ok(ptr);
        }

        let (placed, new_ptr) = self.allocate_from(target, new_size)?;
        let copy_len = self.table.class_size(current).min(self.table.class_size(target));

        // SAFETY: both pointers are the starts of distinct used slots (the
        // old slot is still in use, so the new one cannot be it), each at
        // least `copy_len` bytes long, inside reservations owned by `self`.
        unsafe {
            std::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), copy_len);
        }

        self.buckets[current].release(ptr)?;

        if let Some(stats) = self.stats.as_mut() {
            stats.on_free(current);
            if target > current {
                stats.on_grow(target);
            } else {
                stats.on_shrink(target);
            }
        }

        debug!(
            from = %ptr,
            to = %new_ptr,
            from_class = current,
            to_class = placed,
            copied = copy_len,
            "Reallocate moved slot"
        );
        Ok(new_ptr)
    }

    /// Release the slot at `ptr`
    pub fn free(&mut self, ptr: SlotPtr) -> Result<()> {
        let class = self.class_of(ptr).ok_or_else(|| not_owned(ptr))?;
        self.buckets[class].release(ptr).map_err(|e| {
            warn!(%ptr, class, "Free of a slot that is not in use");
            e
        })?;

        if let Some(stats) = self.stats.as_mut() {
            stats.on_free(class);
        }
        Ok(())
    }

    /// Whether `ptr` is a slot address of this engine, free or used
    pub fn is_owned(&self, ptr: SlotPtr) -> bool {
        self.class_of(ptr).is_some()
    }

    pub fn capabilities(&self) -> Capabilities {
        Self::CAPABILITIES
    }

    pub fn identity(&self) -> AllocatorIdentity {
        Self::engine_identity()
    }

    /// Size class holding `ptr`, if any
    pub fn class_of(&self, ptr: SlotPtr) -> Option<usize> {
        self.buckets.iter().position(|b| b.contains_address(ptr))
    }

    /// Contents of the used slot at `ptr`
    pub fn bytes(&self, ptr: SlotPtr) -> Result<&[u8]> {
        let class = self.class_of(ptr).ok_or_else(|| not_owned(ptr))?;
        self.buckets[class].bytes(ptr)
    }

    /// Mutable contents of the used slot at `ptr`
    pub fn bytes_mut(&mut self, ptr: SlotPtr) -> Result<&mut [u8]> {
        let class = self.class_of(ptr).ok_or_else(|| not_owned(ptr))?;
        self.buckets[class].bytes_mut(ptr)
    }

    /// `(used, capacity)` of class `index`
    pub fn usage(&self, index: usize) -> Option<(usize, usize)> {
        self.buckets.get(index).map(|b| (b.used(), b.capacity()))
    }

    /// Bucket for class `index`
    pub fn bucket(&self, index: usize) -> Option<&Bucket> {
        self.buckets.get(index)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn table(&self) -> &SizeClassTable {
        &self.table
    }

    /// Usage statistics, `None` unless `record_stats` is enabled
    pub fn stats(&self) -> Option<&EngineStats> {
        self.stats.as_ref()
    }

    /// Acquire a slot starting at class `class`, escalating on overflow
    ///
    /// Returns the class that served the request.
    fn allocate_from(&mut self, class: usize, size: isize) -> Result<(usize, SlotPtr)> {
        let mut index = class;

        while let Some(bucket) = self.buckets.get_mut(index) {
            if let Some(ptr) = bucket.acquire() {
                if let Some(stats) = self.stats.as_mut() {
                    stats.on_allocate(index);
                }
                return Ok((index, ptr));
            }

            if !self.config.allow_overflow || index + 1 >= self.buckets.len() {
                break;
            }

            debug!(class = index, size, "Class exhausted, overflowing to next class");
            if let Some(stats) = self.stats.as_mut() {
                stats.on_overflow(index);
            }
            index += 1;
        }

        warn!(size, class, "Bucket allocation failed: out of memory");
        Err(Error::OutOfMemory { size, class })
    }

    fn used_class_of(&self, ptr: SlotPtr) -> Result<usize> {
        self.class_of(ptr)
            .filter(|&class| self.buckets[class].is_used(ptr))
            .ok_or_else(|| not_owned(ptr))
    }
}

impl Allocator for BucketEngine {
    fn allocate(&mut self, size: isize) -> Result<SlotPtr> {
        BucketEngine::allocate(self, size)
    }

    fn reallocate(&mut self, ptr: SlotPtr, new_size: isize, old_size: isize) -> Result<SlotPtr> {
        BucketEngine::reallocate(self, ptr, new_size, old_size)
    }

    fn free(&mut self, ptr: SlotPtr) -> Result<()> {
        BucketEngine::free(self, ptr)
    }

    fn is_owned(&self, ptr: SlotPtr) -> bool {
        BucketEngine::is_owned(self, ptr)
    }

    fn capabilities(&self) -> Capabilities {
        BucketEngine::capabilities(self)
    }

    fn identity(&self) -> AllocatorIdentity {
        BucketEngine::identity(self)
    }
}

fn not_owned(ptr: SlotPtr) -> Error {
    warn!(%ptr, "Pointer not owned by bucket engine");
    Error::NotOwned(ptr.addr())
}
