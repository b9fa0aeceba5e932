//! Shared helpers for link integration tests.
//!
//! - [`TapRegion`]: heap-backed window that records AP -> CP mailbox writes
//!   and can garble writes to chosen offsets.
//! - [`Peer`]: plays the CP side of the queues and mailboxes.
//! - [`Recorder`]: consumer that keeps everything it is given.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use dpram_link::{
    ChannelId, Command, Consumer, DefaultExtension, Extension, LinkConfig, LinkDevice,
    LinkLayout, LinkState, PerChannel,
};
use dpram_primitives::{CircQueue, ConfirmPolicy, HeapRegion, ShmAccess};
use parking_lot::Mutex;

pub const REGION_SIZE: usize = 1024;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "dpram_link=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Small queues so tests can reach the wrap and full cases quickly.
pub fn test_config() -> LinkConfig {
    LinkConfig {
        region_size: REGION_SIZE,
        capacities: PerChannel {
            fmt: 16,
            raw: 128,
            rfs: 32,
        },
        confirm: ConfirmPolicy::new(100, Duration::ZERO),
        res_ack_timeout: Duration::from_secs(5),
        crash_ack_timeout: Duration::from_secs(5),
        ..LinkConfig::default()
    }
}

struct Garble {
    offset: usize,
    remaining: u32,
}

/// Heap window with a tap on the AP -> CP mailbox.
pub struct TapRegion {
    inner: HeapRegion,
    ap2cp_off: usize,
    mailbox: Mutex<Vec<u16>>,
    garble: Mutex<Option<Garble>>,
}

impl TapRegion {
    pub fn new(size: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: HeapRegion::new_zeroed(size),
            ap2cp_off: size - 2,
            mailbox: Mutex::new(Vec::new()),
            garble: Mutex::new(None),
        })
    }

    /// The next `count` writes to `offset` store the complement instead.
    pub fn garble(&self, offset: usize, count: u32) {
        *self.garble.lock() = Some(Garble {
            offset,
            remaining: count,
        });
    }

    /// Every value the AP wrote to its mailbox, in order.
    pub fn mailbox_writes(&self) -> Vec<u16> {
        self.mailbox.lock().clone()
    }

    pub fn clear_mailbox_writes(&self) {
        self.mailbox.lock().clear();
    }

    /// Access that bypasses the tap.
    pub fn raw(&self) -> &HeapRegion {
        &self.inner
    }
}

impl ShmAccess for TapRegion {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn read16(&self, off: usize) -> u16 {
        self.inner.read16(off)
    }

    fn write16(&self, off: usize, value: u16) {
        let mut value = value;
        if let Some(g) = self.garble.lock().as_mut()
            && g.offset == off
            && g.remaining > 0
        {
            g.remaining -= 1;
            value = !value;
        }
        if off == self.ap2cp_off {
            self.mailbox.lock().push(value);
        }
        self.inner.write16(off, value)
    }

    fn read_bytes(&self, off: usize, dst: &mut [u8]) {
        self.inner.read_bytes(off, dst)
    }

    fn write_bytes(&self, off: usize, src: &[u8]) {
        self.inner.write_bytes(off, src)
    }
}

const PEER_POLICY: ConfirmPolicy = ConfirmPolicy::new(0, Duration::ZERO);

/// The CP side of the link.
pub struct Peer {
    pub mem: Arc<TapRegion>,
    pub layout: LinkLayout,
}

impl Peer {
    pub fn new(mem: Arc<TapRegion>, layout: LinkLayout) -> Self {
        Self { mem, layout }
    }

    fn queues(&self, id: ChannelId) -> (CircQueue, CircQueue) {
        let ch = self.layout.channel(id).expect("IPC channel");
        (ch.tx, ch.rx)
    }

    /// Read everything the AP has written to `id`'s TX queue.
    pub fn drain(&self, id: ChannelId) -> Vec<u8> {
        let (tx, _) = self.queues(id);
        let usage = tx.usage(self.mem.raw()).expect("valid TX pointers");
        let mut out = vec![0u8; usage];
        tx.pull(self.mem.raw(), &mut out, &PEER_POLICY)
            .expect("tail update");
        out
    }

    /// Set the AP's TX queue pointers directly.
    pub fn set_tx_pointers(&self, id: ChannelId, head: u16, tail: u16) {
        let (tx, _) = self.queues(id);
        self.mem.raw().write16(tx.head_off, head);
        self.mem.raw().write16(tx.tail_off, tail);
    }

    pub fn tx_pointers(&self, id: ChannelId) -> (u16, u16) {
        self.queues(id).0.pointers(self.mem.raw())
    }

    pub fn set_rx_pointers(&self, id: ChannelId, head: u16, tail: u16) {
        let (_, rx) = self.queues(id);
        self.mem.raw().write16(rx.head_off, head);
        self.mem.raw().write16(rx.tail_off, tail);
    }

    pub fn rx_pointers(&self, id: ChannelId) -> (u16, u16) {
        self.queues(id).1.pointers(self.mem.raw())
    }

    /// Write `data` into the AP's RX queue.
    pub fn push(&self, id: ChannelId, data: &[u8]) {
        let (_, rx) = self.queues(id);
        let space = rx.space(self.mem.raw()).expect("valid RX pointers");
        assert!(data.len() <= space, "test pushed more than the RX queue holds");
        rx.push(self.mem.raw(), data, &PEER_POLICY)
            .expect("head update");
    }

    /// Post `value` in the CP mailbox and raise the interrupt.
    pub fn raise(&self, link: &LinkDevice, value: u16) {
        self.mem.raw().write16(self.layout.cp2ap_off, value);
        link.handle_interrupt();
    }

    pub fn command(&self, link: &LinkDevice, cmd: Command) {
        self.raise(link, cmd.value());
    }

    pub fn mailbox_writes(&self) -> Vec<u16> {
        self.mem.mailbox_writes()
    }

    /// How many mailbox writes equal `value`.
    pub fn count_writes(&self, value: u16) -> usize {
        self.mailbox_writes().iter().filter(|&&v| v == value).count()
    }
}

/// Consumer that records deliveries, state changes and flow control.
#[derive(Default)]
pub struct Recorder {
    pub delivered: Mutex<Vec<Vec<u8>>>,
    pub states: Mutex<Vec<LinkState>>,
    pub suspends: Mutex<usize>,
    pub resumes: Mutex<usize>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delivered(&self) -> Vec<Vec<u8>> {
        self.delivered.lock().clone()
    }

    pub fn states(&self) -> Vec<LinkState> {
        self.states.lock().clone()
    }
}

impl Consumer for Recorder {
    fn deliver(&self, data: &[u8]) {
        self.delivered.lock().push(data.to_vec());
    }

    fn notify_state_changed(&self, state: LinkState) {
        self.states.lock().push(state);
    }

    fn suspend_tx(&self) {
        *self.suspends.lock() += 1;
    }

    fn resume_tx(&self) {
        *self.resumes.lock() += 1;
    }
}

/// A link and its simulated peer.
pub struct Harness {
    pub link: LinkDevice,
    pub peer: Peer,
}

impl Harness {
    pub fn new(config: LinkConfig) -> Self {
        Self::with_extension(config, Arc::new(DefaultExtension))
    }

    pub fn with_extension(config: LinkConfig, ext: Arc<dyn Extension>) -> Self {
        init_tracing();
        let mem = TapRegion::new(config.region_size);
        let link = LinkDevice::with_extension(mem.clone(), config, ext).expect("link device");
        let peer = Peer::new(mem, link.layout().clone());
        Self { link, peer }
    }

    /// Complete the handshake and forget the mailbox traffic it caused.
    pub fn online(config: LinkConfig) -> Self {
        Self::new(config).go_online()
    }

    pub fn go_online(self) -> Self {
        let h = self;
        h.peer.command(&h.link, Command::PhoneStart);
        assert_eq!(h.link.mode(), dpram_link::LinkMode::Ipc);
        h.peer.mem.clear_mailbox_writes();
        h
    }
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    cond()
}
