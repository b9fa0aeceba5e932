//! Administrative requests.

use crate::device::{LinkDevice, LinkMode};
use crate::diagnostic::LinkDiagnostics;
use crate::dump::DumpKind;
use crate::error::LinkError;
use crate::extension::ExtensionError;
use crate::layout::{ACCESS_ENABLED, MAGIC_CODE};

/// Upper bound on CP RAM chunks pulled for one dump request.
const MAX_DUMP_CHUNKS: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Report whether the handshake completed.
    QueryInitStatus,
    /// Capture CP RAM through the extension, or shared memory otherwise.
    TriggerDump,
    Diagnostics,
    ForceCrash,
    /// Passed to [`Extension::ioctl`](crate::Extension::ioctl).
    Device { cmd: u32, arg: Vec<u8> },
}

#[derive(Debug, Clone)]
pub enum AdminResponse {
    InitStatus {
        mode: LinkMode,
        /// Magic and access fields hold their initialised values.
        initialised: bool,
    },
    /// Jobs handed to the dump worker.
    DumpQueued { jobs: usize },
    Diagnostics(Box<LinkDiagnostics>),
    CrashTriggered,
    Device(Vec<u8>),
}

impl LinkDevice {
    pub fn admin(&self, cmd: AdminCommand) -> Result<AdminResponse, LinkError> {
        debug!("admin: {cmd:?}");
        match cmd {
            AdminCommand::QueryInitStatus => {
                let mem = &*self.shared.mem;
                let layout = &self.shared.layout;
                let _power = self.shared.power.acquire();
                let initialised = mem.read16(layout.magic_off) == MAGIC_CODE
                    && mem.read16(layout.access_off) == ACCESS_ENABLED;
                Ok(AdminResponse::InitStatus {
                    mode: self.mode(),
                    initialised,
                })
            }
            AdminCommand::TriggerDump => self.dump_now(),
            AdminCommand::Diagnostics => Ok(AdminResponse::Diagnostics(Box::new(self.diagnostics()))),
            AdminCommand::ForceCrash => {
                self.trigger_force_crash();
                Ok(AdminResponse::CrashTriggered)
            }
            AdminCommand::Device { cmd, arg } => {
                Ok(AdminResponse::Device(self.shared.ext.ioctl(cmd, &arg)?))
            }
        }
    }

    fn dump_now(&self) -> Result<AdminResponse, LinkError> {
        let ext = &self.shared.ext;
        match ext.dump_start() {
            Ok(()) => {
                let mut jobs = 0;
                for _ in 0..MAX_DUMP_CHUNKS {
                    let Some(chunk) = ext.dump_update()? else {
                        break;
                    };
                    if self.enqueue_dump(DumpKind::CpRam, chunk) {
                        jobs += 1;
                    }
                }
                Ok(AdminResponse::DumpQueued { jobs })
            }
            Err(ExtensionError::Unsupported(_)) => {
                let queued = self.enqueue_dump(DumpKind::SharedMemory, self.snapshot());
                Ok(AdminResponse::DumpQueued {
                    jobs: usize::from(queued),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}
