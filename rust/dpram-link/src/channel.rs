//! Logical channels and their per-channel runtime state.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::diagnostic::TrafficStats;
use crate::layout::ChannelLayout;
use crate::mailbox::ChannelMasks;

/// Logical channels multiplexed over the link.
///
/// FMT carries control messages and is reliable: any fault on it escalates
/// to a CP crash. RAW carries best-effort packet data. RFS carries remote
/// file system traffic. BOOT has no IPC queues; its traffic is handed to
/// the extension while the link is in BOOT or DOWNLOAD mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    Fmt,
    Raw,
    Rfs,
    Boot,
}

impl ChannelId {
    /// Channels that own a pair of shared circular queues, in layout order.
    pub const IPC: [ChannelId; 3] = [ChannelId::Fmt, ChannelId::Raw, ChannelId::Rfs];

    /// Every channel, including BOOT.
    pub const ALL: [ChannelId; 4] = [
        ChannelId::Fmt,
        ChannelId::Raw,
        ChannelId::Rfs,
        ChannelId::Boot,
    ];

    /// Position among the IPC channels, `None` for BOOT.
    #[inline]
    pub fn ipc_index(self) -> Option<usize> {
        match self {
            ChannelId::Fmt => Some(0),
            ChannelId::Raw => Some(1),
            ChannelId::Rfs => Some(2),
            ChannelId::Boot => None,
        }
    }

    #[inline]
    pub(crate) fn slot(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ChannelId::Fmt => "fmt",
            ChannelId::Raw => "raw",
            ChannelId::Rfs => "rfs",
            ChannelId::Boot => "boot",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Software side of a channel's transmit path. Guarded by [`Channel::tx`].
#[derive(Debug, Default)]
pub(crate) struct TxState {
    /// Messages not yet copied into the shared TX queue, oldest first.
    pub queue: VecDeque<Bytes>,
    /// The head message did not fit and is waiting for RES_ACK.
    pub retransmit_pending: bool,
    /// A retry worker is running for this channel.
    pub worker_armed: bool,
    /// The consumer was told to stop submitting.
    pub suspended: bool,
}

/// Fixed pool of receive buffers. Guarded by [`Channel::rx`].
#[derive(Debug)]
pub(crate) struct RxPool {
    pub free: Vec<Vec<u8>>,
    pub filled: VecDeque<Vec<u8>>,
    /// A SEND arrived while no buffer was free.
    pub deferred: bool,
    /// The deferred burst came with REQ_ACK; RES_ACK goes out once it is
    /// drained.
    pub ack_owed: bool,
}

impl RxPool {
    fn new(buffers: usize, buffer_size: usize) -> Self {
        Self {
            free: (0..buffers.max(1))
                .map(|_| Vec::with_capacity(buffer_size))
                .collect(),
            filled: VecDeque::new(),
            deferred: false,
            ack_owed: false,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct TrafficCounters {
    tx_bytes: AtomicU64,
    tx_messages: AtomicU64,
    rx_bytes: AtomicU64,
    rx_messages: AtomicU64,
    dropped: AtomicU64,
}

impl TrafficCounters {
    pub fn sent(&self, messages: usize, bytes: usize) {
        self.tx_messages
            .fetch_add(messages as u64, Ordering::Relaxed);
        self.tx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn received(&self, bytes: usize) {
        self.rx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn delivered(&self) {
        self.rx_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped(&self, messages: usize) {
        self.dropped.fetch_add(messages as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TrafficStats {
        TrafficStats {
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            tx_messages: self.tx_messages.load(Ordering::Relaxed),
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            rx_messages: self.rx_messages.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// One IPC channel: its shared queues, mailbox bits and software state.
pub(crate) struct Channel {
    pub id: ChannelId,
    pub layout: ChannelLayout,
    pub masks: ChannelMasks,
    /// Bursts on this channel carry length-delimited frames.
    pub framed: bool,
    pub tx: Mutex<TxState>,
    pub rx: Mutex<RxPool>,
    /// Signalled once per RES_ACK bit seen for this channel.
    pub res_ack: Notify,
    pub counters: TrafficCounters,
}

impl Channel {
    pub fn new(
        id: ChannelId,
        layout: ChannelLayout,
        masks: ChannelMasks,
        framed: bool,
        rx_buffers: usize,
    ) -> Self {
        let buffer_size = layout.rx.max_message();
        Self {
            id,
            layout,
            masks,
            framed,
            tx: Mutex::new(TxState::default()),
            rx: Mutex::new(RxPool::new(rx_buffers, buffer_size)),
            res_ack: Notify::new(),
            counters: TrafficCounters::default(),
        }
    }
}
