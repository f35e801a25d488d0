//! Size class table for the bucket allocator
//!
//! Class `i` holds slots of `16 * 2^i` bytes. The table only records how many
//! slots each class gets; everything else is derived from the index.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Byte size of the smallest class
pub const MIN_CLASS_SIZE: usize = 16;

const MIN_CLASS_SHIFT: u32 = MIN_CLASS_SIZE.trailing_zeros();

/// Highest class index whose byte size still fits in a `usize`
pub const MAX_CLASS_INDEX: usize = (usize::BITS - MIN_CLASS_SHIFT - 1) as usize;

/// Byte size of class `index`
///
/// Pure function of the index. `index` must not exceed [`MAX_CLASS_INDEX`].
#[inline]
pub const fn class_size(index: usize) -> usize {
    MIN_CLASS_SIZE << index
}

/// Ordered per-class capacities, class 0 first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeClassTable {
    capacities: Vec<usize>,
}

impl SizeClassTable {
    /// Create a table from per-class slot counts
    ///
    /// A capacity of `0` disables the class. Fails if a class would be too
    /// large to address.
    pub fn new(capacities: Vec<usize>) -> Result<Self> {
        if capacities.is_empty() {
            return Err(Error::Config("at least one size class is required".to_string()));
        }
        if capacities.len() > MAX_CLASS_INDEX + 1 {
            return Err(Error::Config(format!(
                "{} size classes requested, at most {} are addressable",
                capacities.len(),
                MAX_CLASS_INDEX + 1
            )));
        }

        let table = Self { capacities };
        table.checked_total_bytes().ok_or_else(|| {
            Error::Config("total bucket reservation overflows usize".to_string())
        })?;
        Ok(table)
    }

    /// Smallest class whose byte size is at least `size`
    ///
    /// The returned index may be `>= self.len()` when `size` is larger than
    /// every configured class; callers treat that as exhaustion.
    pub fn classify(&self, size: isize) -> Result<usize> {
        classify(size)
    }

    /// Number of configured classes (including disabled ones)
    pub fn len(&self) -> usize {
        self.capacities.len()
    }

    /// Always false: construction rejects an empty table
    pub fn is_empty(&self) -> bool {
        self.capacities.is_empty()
    }

    /// Slot count for class `index`, `0` if the class is unknown
    pub fn capacity(&self, index: usize) -> usize {
        self.capacities.get(index).copied().unwrap_or(0)
    }

    /// Byte size of class `index`
    pub fn class_size(&self, index: usize) -> usize {
        class_size(index)
    }

    /// Whether class `index` exists and has at least one slot
    pub fn is_enabled(&self, index: usize) -> bool {
        self.capacity(index) > 0
    }

    /// Byte size of the largest configured class
    pub fn largest_size(&self) -> usize {
        class_size(self.len() - 1)
    }

    /// Bytes reserved across all classes
    pub fn total_bytes(&self) -> usize {
        // validated in `new`
        self.checked_total_bytes().unwrap_or(usize::MAX)
    }

    /// Iterate `(index, slot_size, capacity)` for every class
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        self.capacities
            .iter()
            .enumerate()
            .map(|(index, &capacity)| (index, class_size(index), capacity))
    }

    fn checked_total_bytes(&self) -> Option<usize> {
        self.iter().try_fold(0usize, |total, (_, size, capacity)| {
            size.checked_mul(capacity)
                .and_then(|bytes| total.checked_add(bytes))
        })
    }
}

/// Classify a requested byte count into a class index
///
/// Class 0 covers `(0, 16]`, class `i > 0` covers `(16·2^(i-1), 16·2^i]`.
/// Zero and negative sizes are rejected.
pub fn classify(size: isize) -> Result<usize> {
    if size <= 0 {
        return Err(Error::InvalidSize(size));
    }

    let size = size as usize;
    if size <= MIN_CLASS_SIZE {
        return Ok(0);
    }

    // ceil(log2(size)) - log2(16)
    let bits = usize::BITS - (size - 1).leading_zeros();
    Ok((bits - MIN_CLASS_SHIFT) as usize)
}
