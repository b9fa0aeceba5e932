//! Command state machine.

use std::collections::VecDeque;
use std::time::SystemTime;

use dpram_primitives::write16_confirmed;
use parking_lot::Mutex;

use crate::consumer::LinkState;
use crate::device::{LinkDevice, LinkMode};
use crate::error::LinkError;
use crate::layout::{ACCESS_ENABLED, MAGIC_CODE};
use crate::mailbox::Command;

const EVENT_HISTORY: usize = 16;

/// A command received from the CP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlEvent {
    pub command: Command,
    pub at: SystemTime,
}

/// Most recent commands, oldest first.
#[derive(Default)]
pub(crate) struct ControlEvents {
    recent: Mutex<VecDeque<ControlEvent>>,
}

impl ControlEvents {
    pub fn record(&self, command: Command) {
        let mut recent = self.recent.lock();
        if recent.len() == EVENT_HISTORY {
            recent.pop_front();
        }
        recent.push_back(ControlEvent {
            command,
            at: SystemTime::now(),
        });
    }

    pub fn snapshot(&self) -> Vec<ControlEvent> {
        self.recent.lock().iter().copied().collect()
    }
}

impl LinkDevice {
    pub(crate) fn handle_command(&self, cmd: Command) {
        self.shared.events.record(cmd);
        match cmd {
            Command::ReqActive => {
                if let Err(e) = self.send_command(Command::ResActive) {
                    self.fault(&LinkError::Confirm(e));
                }
            }
            Command::PhoneStart => {
                if let Err(e) = self.phone_start() {
                    error!("initialisation aborted: {e}");
                }
            }
            Command::CrashReset | Command::CrashExit => self.handle_cp_crash(cmd),
            Command::InitStart => {
                debug!("CP announced {cmd}");
                if let Err(e) = self.shared.ext.cp_start_handler(&*self.shared.mem) {
                    warn!("cp_start_handler failed: {e}");
                }
            }
            Command::InitEnd
            | Command::ResActive
            | Command::ReqTimeSync
            | Command::CpDeepSleep
            | Command::NvRebuilding
            | Command::SilentNvRebuilding
            | Command::NormalPwrOff
            | Command::EmerDown
            | Command::PifInitDone => {
                info!("CP reported {cmd}");
            }
        }
    }

    /// Handshake: reset every queue, publish magic and access, go online,
    /// answer INIT_END and flush what was queued while offline.
    ///
    /// A confirmation failure leaves the mode untouched.
    pub(crate) fn phone_start(&self) -> Result<(), LinkError> {
        let mode = self.mode();
        if mode == LinkMode::Upload {
            debug!("PHONE_START ignored in {mode} mode");
            return Ok(());
        }

        let mem = &*self.shared.mem;
        let policy = &self.shared.config.confirm;
        let layout = &self.shared.layout;
        let _power = self.shared.power.acquire();

        for ch in &self.shared.channels {
            ch.layout.tx.reset(mem, policy)?;
            ch.layout.rx.reset(mem, policy)?;
        }
        write16_confirmed(mem, layout.magic_off, MAGIC_CODE, policy)?;
        write16_confirmed(mem, layout.access_off, ACCESS_ENABLED, policy)?;

        self.shared.ext.init_map(LinkMode::Ipc)?;
        // A crash forced while the fields were being written wins.
        self.compare_mode(mode, LinkMode::Ipc)
            .map_err(|now| LinkError::WrongMode {
                operation: "PHONE_START",
                mode: now,
            })?;
        if mode != LinkMode::Ipc {
            info!("mode {mode} -> {}", LinkMode::Ipc);
        }
        self.notify_state(LinkState::Online);
        if let Err(e) = self.send_command(Command::InitEnd) {
            let e = LinkError::from(e);
            self.fault(&e);
            return Err(e);
        }

        for ch in &self.shared.channels {
            if ch.tx.lock().queue.is_empty() {
                continue;
            }
            if let Err(e) = self.flush(ch) {
                warn!("{}: flush after handshake failed: {e}", ch.id);
            }
        }
        Ok(())
    }
}
