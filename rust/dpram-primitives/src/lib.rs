#![doc = include_str!("../README.md")]
#![no_std]

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod access;
pub mod confirm;
pub mod cqueue;
#[cfg(all(unix, feature = "std"))]
pub mod mmap;
pub mod region;

pub use access::ShmAccess;
pub use confirm::{
    ConfirmError, ConfirmPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, write16_confirmed,
};
pub use cqueue::{CircQueue, InvalidPointers};
#[cfg(all(unix, feature = "std"))]
pub use mmap::MmapRegion;
#[cfg(any(test, feature = "alloc"))]
pub use region::HeapRegion;
pub use region::Region;
