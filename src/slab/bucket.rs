//! Fixed-capacity pool of same-size slots
//!
//! Each bucket reserves `capacity * slot_size` bytes once, at construction,
//! and never grows. Free slots are chained through an index array (LIFO);
//! a per-slot occupancy flag replaces a used list, so release and ownership
//! checks are O(1).

use super::slot::SlotPtr;
use crate::error::{Error, Result};
use std::alloc::{self, Layout};
use std::ops::Range;
use std::ptr::NonNull;
use tracing::debug;

/// Byte written over a slot when it is freed with zero-on-free enabled
pub const FREED_SENTINEL: u8 = 0xCC;

/// Alignment of every slot (the smallest class size)
pub const SLOT_ALIGN: usize = 16;

/// One size class worth of slots
pub struct Bucket {
    class: usize,
    slot_size: usize,
    capacity: usize,
    zero_on_free: bool,
    /// Start of the reservation; dangling when `capacity == 0`
    base: NonNull<u8>,
    layout: Option<Layout>,
    /// Free list links, indexed by slot
    next: Vec<Option<u32>>,
    free_head: Option<u32>,
    in_use: Vec<bool>,
    used: usize,
}

impl Bucket {
    /// Reserve storage for `capacity` slots of `slot_size` bytes
    ///
    /// Storage comes from the global allocator. The free list starts with
    /// slot 0 at its head, followed by the remaining slots in address order.
    pub fn new(class: usize, slot_size: usize, capacity: usize, zero_on_free: bool) -> Result<Self> {
        if capacity > u32::MAX as usize {
            return Err(Error::Config(format!(
                "class {} capacity {} exceeds {} slots",
                class,
                capacity,
                u32::MAX
            )));
        }

        let (base, layout) = if capacity == 0 {
            (NonNull::<u8>::dangling(), None)
        } else {
            let bytes = slot_size.checked_mul(capacity).ok_or_else(|| {
                Error::Config(format!("class {} reservation overflows usize", class))
            })?;
            let layout = Layout::from_size_align(bytes, SLOT_ALIGN)
                .map_err(|e| Error::Backing(format!("invalid layout for class {}: {}", class, e)))?;
            // SAFETY: `layout` has a non-zero size (capacity > 0, slot_size >= 16).
            let raw = unsafe { alloc::alloc_zeroed(layout) };
            let base = NonNull::new(raw).ok_or_else(|| {
                Error::Backing(format!("failed to reserve {} bytes for class {}", bytes, class))
            })?;
            (base, Some(layout))
        };

        let next = (0..capacity)
            .map(|i| if i + 1 < capacity { Some((i + 1) as u32) } else { None })
            .collect();

        debug!(class, slot_size, capacity, "Initialized bucket");

        Ok(Self {
            class,
            slot_size,
            capacity,
            zero_on_free,
            base,
            layout,
            next,
            free_head: if capacity > 0 { Some(0) } else { None },
            in_use: vec![false; capacity],
            used: 0,
        })
    }

    /// Take a free slot, `None` if the bucket is exhausted
    pub fn acquire(&mut self) -> Option<SlotPtr> {
        let index = self.free_head? as usize;
        self.free_head = self.next[index].take();
        self.in_use[index] = true;
        self.used += 1;

        debug!(class = self.class, slot = index, "Acquired slot");
        Some(self.slot_ptr(index))
    }

    /// Return a used slot to the free list
    ///
    /// Returns the slot index. Fails with `NotOwned` if `ptr` is not the
    /// start of a slot in this bucket or the slot is already free.
    pub fn release(&mut self, ptr: SlotPtr) -> Result<usize> {
        let index = self
            .index_of(ptr)
            .filter(|&i| self.in_use[i])
            .ok_or(Error::NotOwned(ptr.addr()))?;

        if self.zero_on_free {
            // SAFETY: `index` is in range, so the whole slot lies inside the
            // reservation, and the caller gave up the slot by releasing it.
            unsafe {
                std::ptr::write_bytes(self.slot_ptr(index).as_ptr(), FREED_SENTINEL, self.slot_size);
            }
        }

        self.in_use[index] = false;
        self.next[index] = self.free_head;
        self.free_head = Some(index as u32);
        self.used -= 1;

        debug!(class = self.class, slot = index, "Released slot");
        Ok(index)
    }

    /// Whether `ptr` is the start of some slot in this bucket, free or used
    #[inline]
    pub fn contains_address(&self, ptr: SlotPtr) -> bool {
        self.index_of(ptr).is_some()
    }

    /// Whether `ptr` is the start of a slot that is currently in use
    pub fn is_used(&self, ptr: SlotPtr) -> bool {
        self.index_of(ptr).is_some_and(|i| self.in_use[i])
    }

    /// Contents of a used slot
    pub fn bytes(&self, ptr: SlotPtr) -> Result<&[u8]> {
        let index = self.used_index(ptr)?;
        // SAFETY: the slot is inside the zero-initialized reservation and
        // the shared borrow of `self` keeps the bucket alive.
        Ok(unsafe { std::slice::from_raw_parts(self.slot_ptr(index).as_ptr(), self.slot_size) })
    }

    /// Mutable contents of a used slot
    pub fn bytes_mut(&mut self, ptr: SlotPtr) -> Result<&mut [u8]> {
        let index = self.used_index(ptr)?;
        // SAFETY: as in `bytes`; the exclusive borrow of `self` rules out
        // any other view handed out through this bucket.
        Ok(unsafe {
            std::slice::from_raw_parts_mut(self.slot_ptr(index).as_ptr(), self.slot_size)
        })
    }

    /// Size class index
    pub fn class(&self) -> usize {
        self.class
    }

    /// Bytes per slot
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Total slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently in use
    pub fn used(&self) -> usize {
        self.used
    }

    /// Slots currently free
    pub fn free(&self) -> usize {
        self.capacity - self.used
    }

    /// Whether no slot can be acquired
    pub fn is_exhausted(&self) -> bool {
        self.free_head.is_none()
    }

    /// Address of slot 0
    pub fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Address range covered by the reservation
    pub fn byte_range(&self) -> Range<usize> {
        let start = self.base_addr();
        start..start + self.capacity * self.slot_size
    }

    /// Verify that the free list and the used slots partition the bucket
    pub fn check_partition(&self) -> bool {
        let mut seen = vec![false; self.capacity];
        let mut free = 0;
        let mut cursor = self.free_head;

        while let Some(index) = cursor {
            let index = index as usize;
            if index >= self.capacity || seen[index] || self.in_use[index] {
                return false;
            }
            seen[index] = true;
            free += 1;
            cursor = self.next[index];
        }

        let used = self.in_use.iter().filter(|&&u| u).count();
        used == self.used && free + used == self.capacity
    }

    fn index_of(&self, ptr: SlotPtr) -> Option<usize> {
        let offset = ptr.addr().checked_sub(self.base_addr())?;
        let index = offset / self.slot_size;
        (offset % self.slot_size == 0 && index < self.capacity).then_some(index)
    }

    fn used_index(&self, ptr: SlotPtr) -> Result<usize> {
        self.index_of(ptr)
            .filter(|&i| self.in_use[i])
            .ok_or(Error::NotOwned(ptr.addr()))
    }

    fn slot_ptr(&self, index: usize) -> SlotPtr {
        // SAFETY: callers pass `index < capacity`, so the offset stays inside
        // the reservation and cannot wrap to null.
        SlotPtr::new(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(index * self.slot_size)) })
    }
}

impl Drop for Bucket {
    fn drop(&mut self) {
        if let Some(layout) = self.layout {
            // SAFETY: `base` was returned by `alloc_zeroed` with this layout.
            unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
        }
    }
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("class", &self.class)
            .field("slot_size", &self.slot_size)
            .field("capacity", &self.capacity)
            .field("used", &self.used)
            .field("range", &self.byte_range())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_acquire_order() -> Result<()> {
        let mut bucket = Bucket::new(0, 16, 4, false)?;
        let base = bucket.base_addr();

        for i in 0..4 {
            let ptr = bucket.acquire().expect("slot available");
            assert_eq!(ptr.addr(), base + i * 16);
        }
        assert!(bucket.acquire().is_none());
        assert!(bucket.is_exhausted());
        assert!(bucket.check_partition());
        Ok(())
    }

    #[test]
    fn test_bucket_release_reuses_slot() -> Result<()> {
        let mut bucket = Bucket::new(1, 32, 3, false)?;
        let first = bucket.acquire().unwrap();
        let second = bucket.acquire().unwrap();

        assert_eq!(bucket.release(first)?, 0);
        assert_eq!(bucket.used(), 1);
        assert_eq!(bucket.free(), 2);

        // LIFO: the slot just released comes back first
        assert_eq!(bucket.acquire(), Some(first));
        assert_ne!(first, second);
        assert!(bucket.check_partition());
        Ok(())
    }

    #[test]
    fn test_bucket_release_rejects_foreign_and_double_free() -> Result<()> {
        let mut bucket = Bucket::new(0, 16, 2, false)?;
        let ptr = bucket.acquire().unwrap();

        let mut local = [0u8; 16];
        let foreign = SlotPtr::from_raw(local.as_mut_ptr()).unwrap();
        assert!(matches!(bucket.release(foreign), Err(Error::NotOwned(_))));

        // interior pointer is not a slot start
        let interior = SlotPtr::from_raw(ptr.as_ptr().wrapping_add(1)).unwrap();
        assert!(!bucket.contains_address(interior));
        assert!(matches!(bucket.release(interior), Err(Error::NotOwned(_))));

        bucket.release(ptr)?;
        assert!(matches!(bucket.release(ptr), Err(Error::NotOwned(_))));
        assert!(bucket.check_partition());
        Ok(())
    }

    #[test]
    fn test_bucket_contains_free_and_used() -> Result<()> {
        let mut bucket = Bucket::new(0, 16, 2, false)?;
        let ptr = bucket.acquire().unwrap();
        assert!(bucket.contains_address(ptr));
        assert!(bucket.is_used(ptr));

        bucket.release(ptr)?;
        assert!(bucket.contains_address(ptr));
        assert!(!bucket.is_used(ptr));

        let past_end = SlotPtr::from_raw(ptr.as_ptr().wrapping_add(32)).unwrap();
        assert!(!bucket.contains_address(past_end));
        Ok(())
    }

    #[test]
    fn test_bucket_zero_on_free() -> Result<()> {
        let mut bucket = Bucket::new(0, 16, 1, true)?;
        let ptr = bucket.acquire().unwrap();
        bucket.bytes_mut(ptr)?.copy_from_slice(&[7u8; 16]);
        bucket.release(ptr)?;

        let again = bucket.acquire().unwrap();
        assert_eq!(again, ptr);
        assert!(bucket.bytes(again)?.iter().all(|&b| b == FREED_SENTINEL));
        Ok(())
    }

    #[test]
    fn test_bucket_bytes_requires_used_slot() -> Result<()> {
        let mut bucket = Bucket::new(2, 64, 1, false)?;
        let ptr = bucket.acquire().unwrap();
        assert_eq!(bucket.bytes(ptr)?.len(), 64);

        bucket.release(ptr)?;
        assert!(matches!(bucket.bytes(ptr), Err(Error::NotOwned(_))));
        Ok(())
    }

    #[test]
    fn test_disabled_bucket() -> Result<()> {
        let mut bucket = Bucket::new(3, 128, 0, false)?;
        assert!(bucket.acquire().is_none());
        assert!(bucket.byte_range().is_empty());
        assert!(bucket.check_partition());
        Ok(())
    }

    #[test]
    fn test_slots_are_aligned() -> Result<()> {
        let mut bucket = Bucket::new(2, 64, 8, false)?;
        while let Some(ptr) = bucket.acquire() {
            assert_eq!(ptr.addr() % SLOT_ALIGN, 0);
        }
        Ok(())
    }
}
