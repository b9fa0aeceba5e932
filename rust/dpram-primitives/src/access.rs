//! Word and byte access to memory shared with a peer processor.

/// Typed access to a region shared with a peer that may write at any time.
///
/// Offsets are byte offsets from the start of the region, and 16-bit
/// accesses must be 2-byte aligned. Implementations panic on out-of-range
/// or misaligned offsets: layouts are validated once, up front, so a bad
/// offset here is a bug rather than a runtime condition.
///
/// Nothing behind this trait has an exclusive owner. Any mutation of a
/// field the peer also inspects (queue pointers, mailboxes, handshake
/// fields) should go through [`write16_confirmed`](crate::write16_confirmed).
pub trait ShmAccess: Send + Sync {
    /// Size of the region in bytes.
    fn len(&self) -> usize;

    /// Returns true if the region has zero length.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the 16-bit word at `off`.
    fn read16(&self, off: usize) -> u16;

    /// Writes the 16-bit word at `off`.
    fn write16(&self, off: usize, value: u16);

    /// Copies `dst.len()` bytes starting at `off` into `dst`.
    fn read_bytes(&self, off: usize, dst: &mut [u8]);

    /// Copies `src` into the region starting at `off`.
    fn write_bytes(&self, off: usize, src: &[u8]);
}

/// Panics unless `[off, off + n)` lies within a region of `len` bytes.
#[inline]
#[track_caller]
pub fn check_range(len: usize, off: usize, n: usize) {
    let end = off.checked_add(n);
    assert!(
        matches!(end, Some(end) if end <= len),
        "access of {n} bytes at offset {off} out of bounds (len={len})"
    );
}

/// Panics unless a 16-bit word at `off` is aligned and in bounds.
#[inline]
#[track_caller]
pub fn check_word(len: usize, off: usize) {
    assert!(off.is_multiple_of(2), "16-bit access at odd offset {off}");
    check_range(len, off, 2);
}

impl<T: ShmAccess + ?Sized> ShmAccess for &T {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn read16(&self, off: usize) -> u16 {
        (**self).read16(off)
    }

    fn write16(&self, off: usize, value: u16) {
        (**self).write16(off, value)
    }

    fn read_bytes(&self, off: usize, dst: &mut [u8]) {
        (**self).read_bytes(off, dst)
    }

    fn write_bytes(&self, off: usize, src: &[u8]) {
        (**self).write_bytes(off, src)
    }
}
