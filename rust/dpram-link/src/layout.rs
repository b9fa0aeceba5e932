//! Shared memory layout.
//!
//! Reference profile (all fields 16-bit, offsets in bytes):
//!
//! ```text
//! 0       magic         MAGIC_CODE once the AP has initialised the link
//! 2       access        ACCESS_ENABLED once the AP accepts traffic
//! 4       FMT tx head, tx tail, tx buffer, rx head, rx tail, rx buffer
//! ...     RAW (same shape)
//! ...     RFS (same shape)
//! size-4  CP -> AP mailbox
//! size-2  AP -> CP mailbox
//! ```
//!
//! "TX" is always from the AP's point of view: the AP owns the TX head and
//! the RX tail, the CP owns the other two.

use dpram_primitives::CircQueue;

use crate::channel::ChannelId;
use crate::config::PerChannel;
use crate::error::LayoutError;

/// Written to the magic field during PHONE_START.
pub const MAGIC_CODE: u16 = 0x00AA;
/// Written to the access field during PHONE_START.
pub const ACCESS_ENABLED: u16 = 0x0001;

const HEADER_SIZE: usize = 4;
const MAILBOX_SIZE: usize = 4;

/// Both directions of one IPC channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLayout {
    /// AP -> CP
    pub tx: CircQueue,
    /// CP -> AP
    pub rx: CircQueue,
}

/// Where every shared field lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkLayout {
    pub magic_off: usize,
    pub access_off: usize,
    /// FMT, RAW, RFS.
    pub channels: [ChannelLayout; 3],
    pub cp2ap_off: usize,
    pub ap2cp_off: usize,
    /// Bytes of shared memory the layout spans.
    pub size: usize,
}

struct Span {
    field: &'static str,
    offset: usize,
    len: usize,
    word: bool,
}

const QUEUE_FIELDS: [[&str; 6]; 3] = [
    [
        "fmt tx head",
        "fmt tx tail",
        "fmt tx buffer",
        "fmt rx head",
        "fmt rx tail",
        "fmt rx buffer",
    ],
    [
        "raw tx head",
        "raw tx tail",
        "raw tx buffer",
        "raw rx head",
        "raw rx tail",
        "raw rx buffer",
    ],
    [
        "rfs tx head",
        "rfs tx tail",
        "rfs tx buffer",
        "rfs rx head",
        "rfs rx tail",
        "rfs rx buffer",
    ],
];

impl LinkLayout {
    /// Reference layout for a region of `size` bytes.
    ///
    /// Capacities must be even so that every field after a buffer stays
    /// word-aligned.
    pub fn reference(size: usize, capacities: &PerChannel<u16>) -> Result<Self, LayoutError> {
        let mut off = HEADER_SIZE;
        let mut next_queue = |capacity: u16| {
            let queue = CircQueue::new(off, off + 2, off + 4, capacity);
            off += 4 + capacity as usize;
            queue
        };

        let mut channels = [ChannelLayout {
            tx: CircQueue::new(0, 0, 0, 0),
            rx: CircQueue::new(0, 0, 0, 0),
        }; 3];
        for (slot, (_, &capacity)) in channels.iter_mut().zip(capacities.iter()) {
            slot.tx = next_queue(capacity);
            slot.rx = next_queue(capacity);
        }

        let need = off + MAILBOX_SIZE;
        if size < need {
            return Err(LayoutError::RegionTooSmall { need, have: size });
        }

        let layout = Self {
            magic_off: 0,
            access_off: 2,
            channels,
            cp2ap_off: size - 4,
            ap2cp_off: size - 2,
            size,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Queues of an IPC channel.
    pub fn channel(&self, id: ChannelId) -> Option<&ChannelLayout> {
        id.ipc_index().map(|i| &self.channels[i])
    }

    fn spans(&self) -> Vec<Span> {
        let word = |field, offset| Span {
            field,
            offset,
            len: 2,
            word: true,
        };
        let mut spans = vec![
            word("magic", self.magic_off),
            word("access", self.access_off),
            word("cp2ap mailbox", self.cp2ap_off),
            word("ap2cp mailbox", self.ap2cp_off),
        ];
        for (names, ch) in QUEUE_FIELDS.iter().zip(&self.channels) {
            for (q, names) in [(&ch.tx, &names[..3]), (&ch.rx, &names[3..])] {
                spans.push(word(names[0], q.head_off));
                spans.push(word(names[1], q.tail_off));
                spans.push(Span {
                    field: names[2],
                    offset: q.buf_off,
                    len: q.capacity(),
                    word: false,
                });
            }
        }
        spans
    }

    /// Checks alignment, bounds, minimum capacities and overlap.
    pub fn validate(&self) -> Result<(), LayoutError> {
        for (names, ch) in QUEUE_FIELDS.iter().zip(&self.channels) {
            for (q, field) in [(&ch.tx, names[2]), (&ch.rx, names[5])] {
                if q.capacity < 2 {
                    return Err(LayoutError::CapacityTooSmall {
                        field,
                        capacity: q.capacity,
                    });
                }
            }
        }

        let mut spans = self.spans();
        for span in &spans {
            if span.word && !span.offset.is_multiple_of(2) {
                return Err(LayoutError::Misaligned {
                    field: span.field,
                    offset: span.offset,
                });
            }
            if span.offset.checked_add(span.len).is_none_or(|end| end > self.size) {
                return Err(LayoutError::OutOfBounds {
                    field: span.field,
                    offset: span.offset,
                    len: span.len,
                    size: self.size,
                });
            }
        }

        spans.sort_by_key(|s| s.offset);
        for pair in spans.windows(2) {
            if pair[0].offset + pair[0].len > pair[1].offset {
                return Err(LayoutError::Overlap {
                    first: pair[0].field,
                    second: pair[1].field,
                });
            }
        }
        Ok(())
    }
}
