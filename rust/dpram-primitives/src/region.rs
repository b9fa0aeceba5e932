use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicU16, Ordering};

use crate::access::{ShmAccess, check_range, check_word};

/// A contiguous region of shared memory addressed by offset.
///
/// 16-bit fields are accessed as atomics so each individual word access is
/// single-copy atomic with respect to the peer. Byte ranges are plain copies;
/// their consistency is established by the head/tail protocol on top.
///
/// # Safety
///
/// The caller must ensure:
/// - `base` is valid for `len` bytes and at least 2-byte aligned
/// - the memory remains valid for the lifetime of this Region
#[derive(Clone, Copy)]
pub struct Region {
    base: NonNull<u8>,
    len: usize,
}

impl Region {
    /// Create a region from a raw pointer and length.
    ///
    /// # Safety
    ///
    /// - `base` must be valid for reads and writes of `len` bytes
    /// - `base` must be 2-byte aligned
    /// - the memory must remain valid for the lifetime of this Region
    pub unsafe fn from_raw(base: *mut u8, len: usize) -> Self {
        let base = NonNull::new(base).expect("region base must be non-null");
        assert!(
            (base.as_ptr() as usize).is_multiple_of(2),
            "region base must be 2-byte aligned"
        );
        Self { base, len }
    }

    /// Returns the base pointer of the region.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    #[inline]
    #[track_caller]
    fn word(&self, off: usize) -> &AtomicU16 {
        check_word(self.len, off);
        // SAFETY: in bounds and 2-byte aligned (base is aligned, off is even).
        unsafe { &*(self.as_ptr().add(off) as *const AtomicU16) }
    }
}

impl ShmAccess for Region {
    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn read16(&self, off: usize) -> u16 {
        self.word(off).load(Ordering::Acquire)
    }

    #[inline]
    fn write16(&self, off: usize, value: u16) {
        self.word(off).store(value, Ordering::Release)
    }

    fn read_bytes(&self, off: usize, dst: &mut [u8]) {
        check_range(self.len, off, dst.len());
        // SAFETY: range checked above; dst is a distinct local buffer.
        unsafe { ptr::copy_nonoverlapping(self.as_ptr().add(off), dst.as_mut_ptr(), dst.len()) };
    }

    fn write_bytes(&self, off: usize, src: &[u8]) {
        check_range(self.len, off, src.len());
        // SAFETY: range checked above; src is a distinct local buffer.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), self.as_ptr().add(off), src.len()) };
    }
}

// SAFETY: Region is a pointer plus length into memory that outlives it;
// word accesses are atomic and byte copies are bounds-checked.
unsafe impl Send for Region {}
// SAFETY: see above.
unsafe impl Sync for Region {}

#[cfg(any(test, feature = "alloc"))]
mod heap {
    use super::Region;
    use crate::access::ShmAccess;
    use alloc::alloc::{Layout, alloc_zeroed, dealloc};
    use core::ptr::NonNull;

    /// Heap-backed region for tests and in-process simulation of a peer.
    pub struct HeapRegion {
        base: NonNull<u8>,
        len: usize,
        layout: Layout,
    }

    impl HeapRegion {
        /// Allocate a zeroed heap region aligned to 64 bytes.
        pub fn new_zeroed(size: usize) -> Self {
            let layout =
                Layout::from_size_align(size.max(1), 64).expect("invalid heap region layout");
            // SAFETY: layout has non-zero size.
            let ptr = unsafe { alloc_zeroed(layout) };
            let base = NonNull::new(ptr).expect("heap region allocation failed");
            Self {
                base,
                len: size,
                layout,
            }
        }

        /// Returns a Region view of this allocation.
        #[inline]
        pub fn region(&self) -> Region {
            // SAFETY: the allocation is live for as long as self and 64-byte aligned.
            unsafe { Region::from_raw(self.base.as_ptr(), self.len) }
        }
    }

    impl ShmAccess for HeapRegion {
        #[inline]
        fn len(&self) -> usize {
            self.len
        }

        #[inline]
        fn read16(&self, off: usize) -> u16 {
            self.region().read16(off)
        }

        #[inline]
        fn write16(&self, off: usize, value: u16) {
            self.region().write16(off, value)
        }

        fn read_bytes(&self, off: usize, dst: &mut [u8]) {
            self.region().read_bytes(off, dst)
        }

        fn write_bytes(&self, off: usize, src: &[u8]) {
            self.region().write_bytes(off, src)
        }
    }

    impl Drop for HeapRegion {
        fn drop(&mut self) {
            // SAFETY: allocated in new_zeroed with this exact layout.
            unsafe { dealloc(self.base.as_ptr(), self.layout) };
        }
    }

    // SAFETY: the allocation is owned by the value and only reached through ShmAccess.
    unsafe impl Send for HeapRegion {}
    // SAFETY: see above.
    unsafe impl Sync for HeapRegion {}
}

#[cfg(any(test, feature = "alloc"))]
pub use heap::HeapRegion;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_and_bytes_share_storage() {
        let heap = HeapRegion::new_zeroed(32);
        heap.write16(4, 0x1234);
        let mut raw = [0u8; 2];
        heap.read_bytes(4, &mut raw);
        assert_eq!(u16::from_ne_bytes(raw), 0x1234);

        heap.write_bytes(10, &0xBEEFu16.to_ne_bytes());
        assert_eq!(heap.read16(10), 0xBEEF);
    }

    #[test]
    fn new_region_is_zeroed() {
        let heap = HeapRegion::new_zeroed(64);
        let mut all = [0xFFu8; 64];
        heap.read_bytes(0, &mut all);
        assert!(all.iter().all(|&b| b == 0));
    }

    #[test]
    fn region_view_aliases_heap() {
        let heap = HeapRegion::new_zeroed(16);
        let view = heap.region();
        view.write16(14, 7);
        assert_eq!(heap.read16(14), 7);
        assert_eq!(view.len(), 16);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn word_past_end_panics() {
        let heap = HeapRegion::new_zeroed(16);
        heap.read16(16);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn byte_copy_past_end_panics() {
        let heap = HeapRegion::new_zeroed(16);
        heap.write_bytes(12, &[0; 8]);
    }
}
