//! Shared memory reached through an address/data register pair.
//!
//! Some boards do not map the window into the AP's address space. Each
//! 16-bit access is instead a write of the offset to an address register
//! followed by a read or write of a data register. The pair must not be
//! interleaved with another access, so [`IndirectRegion`] holds its own lock
//! around every sequence, narrower than any channel lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dpram_primitives::ShmAccess;
use dpram_primitives::access::{check_range, check_word};
use parking_lot::Mutex;

/// Address and data registers of an indirectly accessed window.
pub trait RegisterPort: Send + Sync {
    /// Select the word at byte offset `offset`.
    fn set_address(&self, offset: usize);
    fn read_data(&self) -> u16;
    fn write_data(&self, value: u16);
}

/// [`ShmAccess`] over a [`RegisterPort`].
///
/// Byte ranges are moved word by word; a range that starts or ends on an
/// odd offset read-modify-writes the boundary word.
pub struct IndirectRegion<P> {
    port: P,
    len: usize,
    lock: Mutex<()>,
}

impl<P: RegisterPort> IndirectRegion<P> {
    pub fn new(port: P, len: usize) -> Self {
        Self {
            port,
            len,
            lock: Mutex::new(()),
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    fn load(&self, off: usize) -> [u8; 2] {
        self.port.set_address(off);
        self.port.read_data().to_ne_bytes()
    }

    fn store(&self, off: usize, bytes: [u8; 2]) {
        self.port.set_address(off);
        self.port.write_data(u16::from_ne_bytes(bytes));
    }
}

impl<P: RegisterPort> ShmAccess for IndirectRegion<P> {
    fn len(&self) -> usize {
        self.len
    }

    fn read16(&self, off: usize) -> u16 {
        check_word(self.len, off);
        let _pair = self.lock.lock();
        u16::from_ne_bytes(self.load(off))
    }

    fn write16(&self, off: usize, value: u16) {
        check_word(self.len, off);
        let _pair = self.lock.lock();
        self.store(off, value.to_ne_bytes());
    }

    fn read_bytes(&self, off: usize, dst: &mut [u8]) {
        check_range(self.len, off, dst.len());
        let _pair = self.lock.lock();
        let mut pos = 0;
        while pos < dst.len() {
            let at = off + pos;
            let word = self.load(at & !1);
            if at % 2 == 1 || dst.len() - pos == 1 {
                dst[pos] = word[at % 2];
                pos += 1;
            } else {
                dst[pos..pos + 2].copy_from_slice(&word);
                pos += 2;
            }
        }
    }

    fn write_bytes(&self, off: usize, src: &[u8]) {
        check_range(self.len, off, src.len());
        let _pair = self.lock.lock();
        let mut pos = 0;
        while pos < src.len() {
            let at = off + pos;
            if at % 2 == 1 || src.len() - pos == 1 {
                let mut word = self.load(at & !1);
                word[at % 2] = src[pos];
                self.store(at & !1, word);
                pos += 1;
            } else {
                self.store(at, [src[pos], src[pos + 1]]);
                pos += 2;
            }
        }
    }
}

/// Register port that latches the address and forwards data accesses to
/// another accessor. Lets the indirect path be exercised against a
/// directly mapped window.
pub struct WindowPort<M> {
    mem: Arc<M>,
    address: AtomicUsize,
}

impl<M: ShmAccess> WindowPort<M> {
    pub fn new(mem: Arc<M>) -> Self {
        Self {
            mem,
            address: AtomicUsize::new(0),
        }
    }

    pub fn memory(&self) -> &Arc<M> {
        &self.mem
    }
}

impl<M: ShmAccess> RegisterPort for WindowPort<M> {
    fn set_address(&self, offset: usize) {
        self.address.store(offset, Ordering::Relaxed);
    }

    fn read_data(&self) -> u16 {
        self.mem.read16(self.address.load(Ordering::Relaxed))
    }

    fn write_data(&self, value: u16) {
        self.mem.write16(self.address.load(Ordering::Relaxed), value)
    }
}
