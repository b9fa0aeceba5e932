//! Crash material persistence.
//!
//! Producers (dispatch, crash handling, admin requests) only copy data and
//! enqueue a [`DumpJob`]; files are written by a dedicated task so the
//! interrupt path never touches the file system.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::channel::ChannelId;
use crate::device::LinkDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpKind {
    /// Copy of the whole shared window.
    SharedMemory,
    /// One receive burst as it came out of the RX queue.
    RxBurst(ChannelId),
    /// Crash log supplied by the extension.
    CrashLog,
    /// A chunk of CP RAM supplied by the extension.
    CpRam,
}

impl fmt::Display for DumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpKind::SharedMemory => write!(f, "shmem"),
            DumpKind::RxBurst(ch) => write!(f, "rx-{ch}"),
            DumpKind::CrashLog => write!(f, "crash-log"),
            DumpKind::CpRam => write!(f, "cp-ram"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DumpJob {
    pub kind: DumpKind,
    pub taken_at: SystemTime,
    /// Per-device sequence number, increasing.
    pub seq: u64,
    pub data: Vec<u8>,
}

impl DumpJob {
    /// `<seq>-<kind>-<unix secs>.bin`
    pub fn file_name(&self) -> String {
        let secs = self
            .taken_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        format!("{:06}-{}-{}.bin", self.seq, self.kind, secs)
    }
}

#[derive(Debug, Default)]
pub(crate) struct DumpStats {
    pub written: AtomicU64,
    pub dropped: AtomicU64,
    pub failed: AtomicU64,
}

pub(crate) async fn run_worker(
    mut rx: mpsc::Receiver<DumpJob>,
    dir: Option<PathBuf>,
    stats: Arc<DumpStats>,
) {
    while let Some(job) = rx.recv().await {
        let Some(dir) = &dir else {
            continue;
        };
        match write_job(dir, &job).await {
            Ok(path) => {
                stats.written.fetch_add(1, Ordering::Relaxed);
                info!("wrote {} bytes to {}", job.data.len(), path.display());
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!("dump {} failed: {e}", job.file_name());
            }
        }
    }
    trace!("dump worker stopping");
}

async fn write_job(dir: &Path, job: &DumpJob) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(job.file_name());
    tokio::fs::write(&path, &job.data).await?;
    Ok(path)
}

impl LinkDevice {
    /// Copy of the whole shared window.
    pub fn snapshot(&self) -> Vec<u8> {
        let mem = &*self.shared.mem;
        let mut out = vec![0u8; mem.len()];
        mem.read_bytes(0, &mut out);
        out
    }

    /// Hand `data` to the dump worker. Returns false if it was dropped.
    pub(crate) fn enqueue_dump(&self, kind: DumpKind, data: Vec<u8>) -> bool {
        if self.shared.config.dump.dir.is_none() {
            trace!("no dump directory, discarding {kind}");
            return false;
        }
        let job = DumpJob {
            kind,
            taken_at: SystemTime::now(),
            seq: self.shared.dump_seq.fetch_add(1, Ordering::Relaxed),
            data,
        };
        let sender = self.shared.dump_tx.lock();
        let Some(sender) = sender.as_ref() else {
            debug!("dump worker stopped, discarding {kind}");
            return false;
        };
        match sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                self.shared.dump_stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("dump queue full, dropping {}", job.kind);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
