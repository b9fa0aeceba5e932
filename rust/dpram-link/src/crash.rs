//! Crash escalation and handling.
//!
//! Any fault the link cannot recover from forces the CP to crash so that
//! its state can be collected. The CP is expected to answer CRASH_EXIT;
//! if it does not within `crash_ack_timeout`, the AP handles the crash as
//! if it had.

use std::sync::atomic::Ordering;

use crate::consumer::LinkState;
use crate::device::{LinkDevice, LinkMode};
use crate::dump::DumpKind;
use crate::error::LinkError;
use crate::mailbox::Command;

impl LinkDevice {
    /// Escalate `err` to a forced crash if the link cannot continue.
    pub(crate) fn fault(&self, err: &LinkError) {
        if err.is_fatal() {
            error!("link fault: {err}");
            self.trigger_force_crash();
        } else {
            warn!("link fault: {err}");
        }
    }

    /// Force the CP into its crash handler.
    ///
    /// No-op once the link is already in UPLOAD mode.
    pub fn trigger_force_crash(&self) {
        let prev = self.swap_mode(LinkMode::Upload);
        if prev == LinkMode::Upload {
            debug!("forced crash ignored, already in upload mode");
            return;
        }
        error!("forcing CP crash from {prev} mode");
        self.acquire_wake_lock();

        if self.shared.config.dump.memory_on_force_crash {
            self.enqueue_dump(DumpKind::SharedMemory, self.snapshot());
        }

        self.shared.crash.ack_pending.store(true, Ordering::Release);
        if let Err(e) = self.send_command(Command::CrashExit) {
            warn!("could not signal CRASH_EXIT: {e}");
        }

        let link = self.clone();
        let timeout = self.shared.config.crash_ack_timeout;
        let timer = self.shared.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            link.crash_ack_expired();
        });
        if let Some(old) = self.shared.crash.timer.lock().replace(timer) {
            old.abort();
        }
    }

    fn crash_ack_expired(&self) {
        // Detach ourselves so the handler below does not abort this task.
        self.shared.crash.timer.lock().take();
        if self.shared.crash.ack_pending.swap(false, Ordering::AcqRel) {
            warn!("CP did not acknowledge the forced crash");
            self.handle_cp_crash(Command::CrashExit);
        }
    }

    pub(crate) fn cancel_crash_timer(&self) {
        self.shared.crash.ack_pending.store(false, Ordering::Release);
        if let Some(timer) = self.shared.crash.timer.lock().take() {
            debug!("crash-ack timer cancelled");
            timer.abort();
        }
    }

    /// The CP crashed (or is assumed to have).
    pub(crate) fn handle_cp_crash(&self, cmd: Command) {
        let state = if cmd == Command::CrashReset {
            LinkState::CrashReset
        } else {
            self.cancel_crash_timer();
            LinkState::CrashExit
        };

        let prev = self.swap_mode(LinkMode::Upload);
        error!("CP {cmd} in {prev} mode");
        self.acquire_wake_lock();

        for ch in &self.shared.channels {
            let mut tx = ch.tx.lock();
            let purged = tx.queue.len();
            tx.queue.clear();
            tx.retransmit_pending = false;
            drop(tx);
            if purged > 0 {
                ch.counters.dropped(purged);
                debug!("{}: discarded {purged} queued messages", ch.id);
            }
        }

        if let Err(e) = self.shared.ext.init_map(LinkMode::Upload) {
            warn!("init_map(upload) failed: {e}");
        }
        self.notify_state(state);

        if cmd == Command::CrashExit {
            if let Some(log) = self.shared.ext.crash_log(&*self.shared.mem) {
                self.enqueue_dump(DumpKind::CrashLog, log);
            }
            if self.shared.config.dump.memory_on_crash_exit {
                self.enqueue_dump(DumpKind::SharedMemory, self.snapshot());
            }
        }
    }
}
