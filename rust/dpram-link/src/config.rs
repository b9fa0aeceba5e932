//! Link device configuration.

use std::path::PathBuf;
use std::time::Duration;

use dpram_primitives::ConfirmPolicy;

use crate::channel::ChannelId;
use crate::error::LayoutError;
use crate::layout::LinkLayout;

/// One value per IPC channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerChannel<T> {
    pub fmt: T,
    pub raw: T,
    pub rfs: T,
}

impl<T> PerChannel<T> {
    /// Value for an IPC channel. `None` for BOOT, which has no IPC state.
    pub fn get(&self, id: ChannelId) -> Option<&T> {
        match id {
            ChannelId::Fmt => Some(&self.fmt),
            ChannelId::Raw => Some(&self.raw),
            ChannelId::Rfs => Some(&self.rfs),
            ChannelId::Boot => None,
        }
    }

    /// Values in [`ChannelId::IPC`] order.
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &T)> {
        ChannelId::IPC.into_iter().zip([&self.fmt, &self.raw, &self.rfs])
    }
}

/// Where and when crash material is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpConfig {
    /// Directory dump files are written to. `None` disables persistence.
    pub dir: Option<PathBuf>,
    /// Snapshot shared memory when the AP forces a crash.
    pub memory_on_force_crash: bool,
    /// Snapshot shared memory when the CP reports CRASH_EXIT.
    pub memory_on_crash_exit: bool,
    /// Keep a copy of every received burst.
    pub rx_bursts: bool,
    /// Jobs that may wait for the dump worker before new ones are dropped.
    pub queue_depth: usize,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            dir: None,
            memory_on_force_crash: true,
            memory_on_crash_exit: false,
            rx_bursts: false,
            queue_depth: 8,
        }
    }
}

/// Configuration for a [`LinkDevice`](crate::LinkDevice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Size of the shared window in bytes.
    pub region_size: usize,
    /// Buffer capacity of each channel's TX and RX queue. Must be even.
    pub capacities: PerChannel<u16>,
    /// Retry budget for confirmed writes.
    pub confirm: ConfirmPolicy,
    /// How long a retry worker waits for RES_ACK before asking again.
    pub res_ack_timeout: Duration,
    /// How long the CP has to acknowledge a forced crash.
    pub crash_ack_timeout: Duration,
    /// Queued RAW messages beyond which new ones are dropped.
    pub txq_max: usize,
    /// Receive buffers per channel.
    pub rx_pool_buffers: usize,
    /// Channels whose bursts are split into frames before delivery.
    pub framed: PerChannel<bool>,
    pub dump: DumpConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            region_size: 16 * 1024,
            capacities: PerChannel {
                fmt: 2044,
                raw: 4092,
                rfs: 1020,
            },
            confirm: ConfirmPolicy::default(),
            res_ack_timeout: Duration::from_millis(100),
            crash_ack_timeout: Duration::from_secs(5),
            txq_max: 1024,
            rx_pool_buffers: 4,
            framed: PerChannel {
                fmt: false,
                raw: true,
                rfs: false,
            },
            dump: DumpConfig::default(),
        }
    }
}

impl LinkConfig {
    /// Reference layout for this configuration.
    pub fn layout(&self) -> Result<LinkLayout, LayoutError> {
        LinkLayout::reference(self.region_size, &self.capacities)
    }
}
