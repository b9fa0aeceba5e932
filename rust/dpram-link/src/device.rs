//! The link device: shared state and its lifecycle.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use bytes::Bytes;
use dpram_primitives::{ConfirmError, ShmAccess, write16_confirmed};
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use crate::channel::{Channel, ChannelId};
use crate::command::ControlEvents;
use crate::config::LinkConfig;
use crate::consumer::{ChannelHandle, Consumer, LinkState};
use crate::dump::{self, DumpJob, DumpStats};
use crate::error::{LayoutError, LinkError};
use crate::extension::{DefaultExtension, Extension};
use crate::layout::LinkLayout;
use crate::mailbox::{ChannelMasks, Command};
use crate::power::PowerGate;

/// Operating mode of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkMode {
    /// No handshake yet. Messages are queued but not transmitted.
    Offline = 0,
    /// The CP boot loader is being fed through the extension.
    Boot = 1,
    /// A firmware image is being downloaded through the extension.
    Download = 2,
    /// Handshake complete; the circular queues carry traffic.
    Ipc = 3,
    /// The CP crashed. Terminal until the device is rebuilt.
    Upload = 4,
}

impl LinkMode {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => LinkMode::Boot,
            2 => LinkMode::Download,
            3 => LinkMode::Ipc,
            4 => LinkMode::Upload,
            _ => LinkMode::Offline,
        }
    }
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkMode::Offline => "offline",
            LinkMode::Boot => "boot",
            LinkMode::Download => "download",
            LinkMode::Ipc => "ipc",
            LinkMode::Upload => "upload",
        };
        f.write_str(name)
    }
}

/// What [`LinkDevice::send`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Copied into the shared queue and signalled.
    Sent,
    /// Held until the link comes online.
    Queued,
    /// Waiting for the CP to free space; a retry worker is armed.
    Deferred,
    /// Discarded because the best-effort backlog is full.
    Dropped,
}

/// Shutdown signal observed by every background task.
#[derive(Default)]
pub(crate) struct Interrupt {
    fired: AtomicBool,
    notify: Notify,
}

impl Interrupt {
    pub fn trigger(&self) {
        self.fired.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Resolves once [`trigger`](Self::trigger) has been called.
    pub async fn fired(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_fired() {
            return;
        }
        notified.await;
    }
}

#[derive(Default)]
pub(crate) struct CrashState {
    /// Expiry task armed by a forced crash.
    pub timer: Mutex<Option<JoinHandle<()>>>,
    /// CRASH_EXIT was sent and the CP has not echoed it yet.
    pub ack_pending: AtomicBool,
}

pub(crate) struct Shared {
    pub mem: Arc<dyn ShmAccess>,
    pub layout: LinkLayout,
    pub config: LinkConfig,
    pub ext: Arc<dyn Extension>,
    mode: AtomicU8,
    pub wake_lock: AtomicBool,
    pub channels: [Channel; 3],
    pub consumers: RwLock<[Option<Arc<dyn Consumer>>; 4]>,
    /// Last state pushed to consumers.
    pub notified: Mutex<Option<LinkState>>,
    pub power: PowerGate,
    pub runtime: Handle,
    /// A filled RX buffer is waiting for the delivery task.
    pub rx_ready: Notify,
    pub dump_tx: Mutex<Option<mpsc::Sender<DumpJob>>>,
    pub dump_seq: AtomicU64,
    pub dump_stats: Arc<DumpStats>,
    pub crash: CrashState,
    pub events: ControlEvents,
    pub interrupt: Interrupt,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Handle to a link device. Cheap to clone; every clone drives the same
/// link.
#[derive(Clone)]
pub struct LinkDevice {
    pub(crate) shared: Arc<Shared>,
}

impl LinkDevice {
    /// Build a link over `mem` with the reference profile.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(mem: Arc<dyn ShmAccess>, config: LinkConfig) -> Result<Self, LinkError> {
        Self::with_extension(mem, config, Arc::new(DefaultExtension))
    }

    /// Build a link whose device-specific behavior comes from `ext`.
    pub fn with_extension(
        mem: Arc<dyn ShmAccess>,
        config: LinkConfig,
        ext: Arc<dyn Extension>,
    ) -> Result<Self, LinkError> {
        let runtime = Handle::try_current().map_err(|_| LinkError::NoRuntime)?;

        let layout = ext.layout(&config)?;
        layout.validate()?;
        if layout.size > mem.len() {
            return Err(LayoutError::RegionTooSmall {
                need: layout.size,
                have: mem.len(),
            }
            .into());
        }

        let channels = ChannelId::IPC.map(|id| {
            let idx = id.ipc_index().unwrap_or_default();
            Channel::new(
                id,
                layout.channels[idx],
                ChannelMasks::of(id).unwrap_or(ChannelMasks::FMT),
                config.framed.get(id).copied().unwrap_or_default(),
                config.rx_pool_buffers,
            )
        });

        let (dump_tx, dump_rx) = mpsc::channel(config.dump.queue_depth.max(1));
        let dump_stats = Arc::new(DumpStats::default());

        let shared = Arc::new(Shared {
            mem,
            layout,
            power: PowerGate::new(ext.clone()),
            ext,
            mode: AtomicU8::new(LinkMode::Offline as u8),
            wake_lock: AtomicBool::new(false),
            channels,
            consumers: RwLock::new([None, None, None, None]),
            notified: Mutex::new(None),
            runtime,
            rx_ready: Notify::new(),
            dump_tx: Mutex::new(Some(dump_tx)),
            dump_seq: AtomicU64::new(0),
            dump_stats: dump_stats.clone(),
            crash: CrashState::default(),
            events: ControlEvents::default(),
            interrupt: Interrupt::default(),
            tasks: Mutex::new(Vec::new()),
            config,
        });
        let link = Self { shared };

        let delivery = link.shared.runtime.spawn(link.clone().run_delivery());
        let dumper = link.shared.runtime.spawn(dump::run_worker(
            dump_rx,
            link.shared.config.dump.dir.clone(),
            dump_stats,
        ));
        link.shared.tasks.lock().extend([delivery, dumper]);

        info!(
            size = link.shared.layout.size,
            "link device created over {} bytes of shared memory",
            link.shared.mem.len()
        );
        Ok(link)
    }

    #[inline]
    pub fn mode(&self) -> LinkMode {
        LinkMode::from_u8(self.shared.mode.load(Ordering::Acquire))
    }

    /// Store `mode`, returning the previous one.
    pub(crate) fn swap_mode(&self, mode: LinkMode) -> LinkMode {
        LinkMode::from_u8(self.shared.mode.swap(mode as u8, Ordering::AcqRel))
    }

    pub(crate) fn compare_mode(&self, current: LinkMode, new: LinkMode) -> Result<(), LinkMode> {
        self.shared
            .mode
            .compare_exchange(current as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(LinkMode::from_u8)
    }

    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    pub fn layout(&self) -> &LinkLayout {
        &self.shared.layout
    }

    pub fn memory(&self) -> &Arc<dyn ShmAccess> {
        &self.shared.mem
    }

    /// The wake lock has been taken by crash handling.
    pub fn wake_lock_held(&self) -> bool {
        self.shared.wake_lock.load(Ordering::Acquire)
    }

    pub(crate) fn acquire_wake_lock(&self) {
        if !self.shared.wake_lock.swap(true, Ordering::AcqRel) {
            debug!("wake lock acquired");
        }
    }

    /// Attach `consumer` to `channel`, replacing any previous one.
    pub fn register(&self, channel: ChannelId, consumer: Arc<dyn Consumer>) -> ChannelHandle {
        self.shared.consumers.write()[channel.slot()] = Some(consumer);
        debug!("consumer registered on {channel}");
        ChannelHandle::new(self.clone(), channel)
    }

    pub(crate) fn consumer(&self, channel: ChannelId) -> Option<Arc<dyn Consumer>> {
        self.shared.consumers.read()[channel.slot()].clone()
    }

    /// Tell every consumer about `state`, unless it was the last state sent.
    pub(crate) fn notify_state(&self, state: LinkState) {
        {
            let mut last = self.shared.notified.lock();
            if *last == Some(state) {
                trace!("state {state} already notified");
                return;
            }
            *last = Some(state);
        }
        let consumers: Vec<_> = self.shared.consumers.read().iter().flatten().cloned().collect();
        debug!("notifying {} consumers: {state}", consumers.len());
        for consumer in consumers {
            consumer.notify_state_changed(state);
        }
    }

    pub(crate) fn channel(&self, id: ChannelId) -> Option<&Channel> {
        id.ipc_index().map(|i| &self.shared.channels[i])
    }

    /// Confirmed write of the AP -> CP mailbox.
    pub(crate) fn write_mailbox(&self, value: u16) -> Result<(), ConfirmError> {
        trace!("ap2cp <- {value:#06x}");
        write16_confirmed(
            &*self.shared.mem,
            self.shared.layout.ap2cp_off,
            value,
            &self.shared.config.confirm,
        )?;
        Ok(())
    }

    pub(crate) fn send_command(&self, cmd: Command) -> Result<(), ConfirmError> {
        debug!("sending {cmd}");
        self.write_mailbox(cmd.value())
    }

    /// Queue `data` on `channel` and transmit it if the link is online.
    ///
    /// Messages longer than the channel's queue can ever hold are rejected.
    /// Offline, messages are held and flushed after the handshake. Online,
    /// a message that does not fit waits for the CP to free space. BOOT
    /// traffic goes to the extension in BOOT and DOWNLOAD mode.
    pub fn send(&self, channel: ChannelId, data: impl Into<Bytes>) -> Result<SendStatus, LinkError> {
        let data = data.into();
        match self.channel(channel) {
            Some(ch) => self.enqueue(ch, data),
            None => self.send_boot(&data),
        }
    }

    /// Stop background work. Queued dumps are still written.
    pub fn shutdown(&self) {
        if self.shared.interrupt.is_fired() {
            return;
        }
        info!("shutting down link device");
        self.shared.interrupt.trigger();
        self.cancel_crash_timer();
        self.shared.dump_tx.lock().take();
        self.shared.wake_lock.store(false, Ordering::Release);
        // The dump worker is left to drain; the others stop on the signal.
        self.shared.tasks.lock().clear();
    }
}

impl fmt::Debug for LinkDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkDevice")
            .field("mode", &self.mode())
            .field("size", &self.shared.layout.size)
            .finish_non_exhaustive()
    }
}
