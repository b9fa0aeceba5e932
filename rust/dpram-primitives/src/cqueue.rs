//! Circular byte queues with a head owned by the writer and a tail owned by
//! the reader.
//!
//! One slot is always left empty so that `head == tail` means empty and the
//! queue can never report `usage == capacity`. For any valid pair of
//! pointers, `usage + space == capacity - 1`.
//!
//! The free functions work on plain slices. [`CircQueue`] applies the same
//! arithmetic to a queue whose pointers and data live in shared memory.

use core::fmt;

use crate::access::ShmAccess;
use crate::confirm::{ConfirmError, ConfirmPolicy, write16_confirmed};

/// Both pointers are inside the queue.
#[inline]
pub fn valid(capacity: usize, head: usize, tail: usize) -> bool {
    head < capacity && tail < capacity
}

/// Bytes the writer may add without catching up with the reader.
#[inline]
pub fn space(capacity: usize, head: usize, tail: usize) -> usize {
    debug_assert!(valid(capacity, head, tail));
    if head < tail {
        tail - head - 1
    } else {
        capacity - head + tail - 1
    }
}

/// Bytes written but not yet consumed.
#[inline]
pub fn usage(capacity: usize, head: usize, tail: usize) -> usize {
    debug_assert!(valid(capacity, head, tail));
    if head >= tail {
        head - tail
    } else {
        capacity - tail + head
    }
}

/// Splits a transfer of `len` bytes at `pos` into the run before the wrap
/// point and the run after it.
#[inline]
fn split(capacity: usize, pos: usize, len: usize) -> (usize, usize) {
    let first = len.min(capacity - pos);
    (first, len - first)
}

/// Copies `src` into `buffer` starting at `head`, wrapping at `capacity`.
///
/// The caller must have checked `valid()` and `src.len() <= space(..)`.
pub fn write(buffer: &mut [u8], src: &[u8], capacity: usize, head: usize) {
    assert!(buffer.len() >= capacity && head < capacity && src.len() < capacity);
    let (first, rest) = split(capacity, head, src.len());
    buffer[head..head + first].copy_from_slice(&src[..first]);
    buffer[..rest].copy_from_slice(&src[first..]);
}

/// Fills `dst` from `buffer` starting at `tail`, wrapping at `capacity`.
///
/// The caller must have checked `valid()` and `dst.len() <= usage(..)`.
pub fn read(dst: &mut [u8], buffer: &[u8], capacity: usize, tail: usize) {
    assert!(buffer.len() >= capacity && tail < capacity && dst.len() < capacity);
    let (first, rest) = split(capacity, tail, dst.len());
    dst[..first].copy_from_slice(&buffer[tail..tail + first]);
    dst[first..].copy_from_slice(&buffer[..rest]);
}

/// Queue pointers read from shared memory that are out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidPointers {
    pub head: u16,
    pub tail: u16,
    pub capacity: u16,
}

impl fmt::Display for InvalidPointers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid queue pointers head={} tail={} (capacity={})",
            self.head, self.tail, self.capacity
        )
    }
}

impl core::error::Error for InvalidPointers {}

/// A circular queue living in shared memory.
///
/// Holds offsets only; the memory is passed to each call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircQueue {
    /// Offset of the 16-bit head (write index).
    pub head_off: usize,
    /// Offset of the 16-bit tail (read index).
    pub tail_off: usize,
    /// Offset of the data buffer.
    pub buf_off: usize,
    /// Size of the data buffer in bytes.
    pub capacity: u16,
}

impl CircQueue {
    pub const fn new(head_off: usize, tail_off: usize, buf_off: usize, capacity: u16) -> Self {
        Self {
            head_off,
            tail_off,
            buf_off,
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Largest message that can ever fit.
    #[inline]
    pub fn max_message(&self) -> usize {
        self.capacity().saturating_sub(1)
    }

    /// Current raw `(head, tail)`.
    #[inline]
    pub fn pointers<M: ShmAccess + ?Sized>(&self, mem: &M) -> (u16, u16) {
        (mem.read16(self.head_off), mem.read16(self.tail_off))
    }

    fn checked<M: ShmAccess + ?Sized>(&self, mem: &M) -> Result<(usize, usize), InvalidPointers> {
        let (head, tail) = self.pointers(mem);
        if valid(self.capacity(), head as usize, tail as usize) {
            Ok((head as usize, tail as usize))
        } else {
            Err(InvalidPointers {
                head,
                tail,
                capacity: self.capacity,
            })
        }
    }

    /// Free bytes, or the offending pointers.
    pub fn space<M: ShmAccess + ?Sized>(&self, mem: &M) -> Result<usize, InvalidPointers> {
        let (head, tail) = self.checked(mem)?;
        Ok(space(self.capacity(), head, tail))
    }

    /// Pending bytes, or the offending pointers.
    pub fn usage<M: ShmAccess + ?Sized>(&self, mem: &M) -> Result<usize, InvalidPointers> {
        let (head, tail) = self.checked(mem)?;
        Ok(usage(self.capacity(), head, tail))
    }

    /// Sets head and tail back to zero.
    pub fn reset<M: ShmAccess + ?Sized>(
        &self,
        mem: &M,
        policy: &ConfirmPolicy,
    ) -> Result<(), ConfirmError> {
        write16_confirmed(mem, self.head_off, 0, policy)?;
        write16_confirmed(mem, self.tail_off, 0, policy)?;
        Ok(())
    }

    /// Writer side: copies `src` in at head and publishes the new head.
    ///
    /// The caller must have checked `src.len() <= self.space(mem)?`.
    pub fn push<M: ShmAccess + ?Sized>(
        &self,
        mem: &M,
        src: &[u8],
        policy: &ConfirmPolicy,
    ) -> Result<(), ConfirmError> {
        let capacity = self.capacity();
        let head = mem.read16(self.head_off) as usize;
        assert!(head < capacity && src.len() < capacity);

        let (first, rest) = split(capacity, head, src.len());
        mem.write_bytes(self.buf_off + head, &src[..first]);
        if rest > 0 {
            mem.write_bytes(self.buf_off, &src[first..]);
        }

        let new_head = (head + src.len()) % capacity;
        write16_confirmed(mem, self.head_off, new_head as u16, policy)?;
        Ok(())
    }

    /// Reader side: fills `dst` from tail and publishes the new tail.
    ///
    /// The caller must have checked `dst.len() <= self.usage(mem)?`.
    pub fn pull<M: ShmAccess + ?Sized>(
        &self,
        mem: &M,
        dst: &mut [u8],
        policy: &ConfirmPolicy,
    ) -> Result<(), ConfirmError> {
        let capacity = self.capacity();
        let tail = mem.read16(self.tail_off) as usize;
        assert!(tail < capacity && dst.len() < capacity);

        let (first, rest) = split(capacity, tail, dst.len());
        mem.read_bytes(self.buf_off + tail, &mut dst[..first]);
        if rest > 0 {
            mem.read_bytes(self.buf_off, &mut dst[first..]);
        }

        let new_tail = (tail + dst.len()) % capacity;
        write16_confirmed(mem, self.tail_off, new_tail as u16, policy)?;
        Ok(())
    }
}
