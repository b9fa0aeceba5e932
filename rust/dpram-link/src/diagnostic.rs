//! Link diagnostics.
//!
//! A [`LinkDiagnostics`] is a point-in-time copy of the shared queue
//! pointers and software state of every channel, cheap enough to take from
//! an admin request while traffic is flowing.

use std::fmt::Write as _;
use std::sync::atomic::Ordering;

use dpram_primitives::{CircQueue, ShmAccess, cqueue};

use crate::channel::ChannelId;
use crate::command::ControlEvent;
use crate::device::{LinkDevice, LinkMode};

/// Pointers and fill level of one shared queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingStats {
    pub head: u16,
    pub tail: u16,
    pub capacity: u16,
    pub used: u16,
    pub free: u16,
}

impl RingStats {
    /// `None` when the pointers are out of range.
    pub fn read<M: ShmAccess + ?Sized>(queue: &CircQueue, mem: &M) -> Option<Self> {
        let (head, tail) = queue.pointers(mem);
        let capacity = queue.capacity();
        if !cqueue::valid(capacity, head as usize, tail as usize) {
            return None;
        }
        Some(Self {
            head,
            tail,
            capacity: queue.capacity,
            used: cqueue::usage(capacity, head as usize, tail as usize) as u16,
            free: cqueue::space(capacity, head as usize, tail as usize) as u16,
        })
    }
}

/// Cumulative traffic counters of one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficStats {
    pub tx_bytes: u64,
    pub tx_messages: u64,
    pub rx_bytes: u64,
    /// Messages (or frames) handed to the consumer.
    pub rx_messages: u64,
    /// Messages discarded by backlog limits or crash purges.
    pub dropped: u64,
}

#[derive(Debug, Clone)]
pub struct ChannelDiagnostics {
    pub channel: ChannelId,
    pub tx_ring: Option<RingStats>,
    pub rx_ring: Option<RingStats>,
    pub queued: usize,
    pub retransmit_pending: bool,
    pub worker_armed: bool,
    pub rx_free: usize,
    pub rx_filled: usize,
    pub traffic: TrafficStats,
}

#[derive(Debug, Clone)]
pub struct LinkDiagnostics {
    pub mode: LinkMode,
    pub wake_lock: bool,
    pub crash_ack_pending: bool,
    pub magic: u16,
    pub access: u16,
    pub channels: Vec<ChannelDiagnostics>,
    pub events: Vec<ControlEvent>,
    pub dumps_written: u64,
    pub dumps_dropped: u64,
}

impl LinkDiagnostics {
    pub fn channel(&self, id: ChannelId) -> Option<&ChannelDiagnostics> {
        self.channels.iter().find(|c| c.channel == id)
    }

    /// Format the diagnostics as a compact human-readable string.
    pub fn format(&self) -> String {
        let mut output = String::new();

        let _ = write!(
            output,
            "[DPRAM] mode={} magic={:#06x} access={}",
            self.mode, self.magic, self.access
        );
        if self.wake_lock {
            let _ = write!(output, " WAKELOCK");
        }
        if self.crash_ack_pending {
            let _ = write!(output, " AWAITING-CRASH-ACK");
        }
        let _ = writeln!(output);

        for ch in &self.channels {
            let _ = write!(
                output,
                "  [{}] TX:{} RX:{} q={}",
                ch.channel,
                ring(&ch.tx_ring),
                ring(&ch.rx_ring),
                ch.queued
            );
            if ch.retransmit_pending {
                let _ = write!(output, " PENDING");
            }
            if ch.rx_filled > 0 {
                let _ = write!(output, " undelivered={}", ch.rx_filled);
            }
            let t = &ch.traffic;
            if t.tx_bytes > 0 || t.rx_bytes > 0 {
                let _ = write!(
                    output,
                    " ({}↑ {}↓)",
                    format_bytes(t.tx_bytes),
                    format_bytes(t.rx_bytes)
                );
            }
            if t.dropped > 0 {
                let _ = write!(output, " dropped={}", t.dropped);
            }
            let _ = writeln!(output);
        }

        if let Some(last) = self.events.last() {
            let _ = writeln!(output, "  last command: {}", last.command);
        }
        if self.dumps_written > 0 || self.dumps_dropped > 0 {
            let _ = writeln!(
                output,
                "  dumps: {} written, {} dropped",
                self.dumps_written, self.dumps_dropped
            );
        }
        output
    }
}

fn ring(stats: &Option<RingStats>) -> String {
    match stats {
        Some(r) => format!("{}/{}", r.used, r.capacity),
        None => "INVALID".to_string(),
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}K", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}M", bytes as f64 / (1024.0 * 1024.0))
    }
}

impl LinkDevice {
    pub fn diagnostics(&self) -> LinkDiagnostics {
        let shared = &self.shared;
        let mem = &*shared.mem;
        let _power = shared.power.acquire();

        let channels = shared
            .channels
            .iter()
            .map(|ch| {
                let (queued, retransmit_pending, worker_armed) = {
                    let tx = ch.tx.lock();
                    (tx.queue.len(), tx.retransmit_pending, tx.worker_armed)
                };
                let (rx_free, rx_filled) = {
                    let rx = ch.rx.lock();
                    (rx.free.len(), rx.filled.len())
                };
                ChannelDiagnostics {
                    channel: ch.id,
                    tx_ring: RingStats::read(&ch.layout.tx, mem),
                    rx_ring: RingStats::read(&ch.layout.rx, mem),
                    queued,
                    retransmit_pending,
                    worker_armed,
                    rx_free,
                    rx_filled,
                    traffic: ch.counters.snapshot(),
                }
            })
            .collect();

        LinkDiagnostics {
            mode: self.mode(),
            wake_lock: self.wake_lock_held(),
            crash_ack_pending: shared.crash.ack_pending.load(Ordering::Acquire),
            magic: mem.read16(shared.layout.magic_off),
            access: mem.read16(shared.layout.access_off),
            channels,
            events: shared.events.snapshot(),
            dumps_written: shared.dump_stats.written.load(Ordering::Relaxed),
            dumps_dropped: shared.dump_stats.dropped.load(Ordering::Relaxed),
        }
    }
}
