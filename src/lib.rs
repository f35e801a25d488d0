// bucket-alloc
// A fixed-size, per-size-class slab allocator

#![warn(rust_2018_idioms)]

pub mod allocator;
pub mod config;
pub mod slab;

// Re-exports for convenience
pub use allocator::{Allocator, AllocatorIdentity, Capabilities, Capability};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use slab::{BucketEngine, EngineStats, SizeClassTable, SlotPtr};

/// Bucket allocator error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Invalid allocation size: {0}")]
        InvalidSize(isize),

        #[error("Out of memory: no slot for {size} bytes (class {class})")]
        OutOfMemory { size: isize, class: usize },

        #[error("Pointer {0:#x} is not owned by this allocator")]
        NotOwned(usize),

        #[error("Unsupported operation: {0}")]
        Unsupported(&'static str),

        #[error("Configuration error: {0}")]
        Config(String),

        #[error("Backing storage error: {0}")]
        Backing(String),
    }

    impl Error {
        /// Unsupported operations are never worth retrying
        pub fn is_fatal(&self) -> bool {
            matches!(self, Error::Unsupported(_))
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_format() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::NotOwned(0x1000).to_string(),
            "Pointer 0x1000 is not owned by this allocator"
        );
        assert_eq!(
            Error::OutOfMemory { size: 40, class: 2 }.to_string(),
            "Out of memory: no slot for 40 bytes (class 2)"
        );
        assert!(Error::Unsupported("thread_start").is_fatal());
        assert!(!Error::InvalidSize(0).is_fatal());
    }
}
