//! Device-specific hooks.
//!
//! Every hook has a default, so a board only overrides what differs from
//! the reference profile. The extension is chosen once, when the link
//! device is built.

use std::fmt;

use dpram_primitives::ShmAccess;

use crate::config::LinkConfig;
use crate::device::{LinkDevice, LinkMode};
use crate::error::LayoutError;
use crate::layout::LinkLayout;

/// Failure reported by an extension hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionError {
    /// The hook is not provided on this device.
    Unsupported(&'static str),
    /// The hook ran and failed.
    Failed(String),
}

impl fmt::Display for ExtensionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionError::Unsupported(hook) => write!(f, "{hook} is not supported"),
            ExtensionError::Failed(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ExtensionError {}

/// Outcome of [`Extension::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The extension consumed the mailbox value.
    Handled,
    /// Run the built-in dispatch.
    Default,
}

pub trait Extension: Send + Sync + 'static {
    /// Layout of the shared window. Defaults to the reference profile.
    fn layout(&self, config: &LinkConfig) -> Result<LinkLayout, LayoutError> {
        config.layout()
    }

    /// Reconfigure the window for `mode` before the link enters it.
    fn init_map(&self, _mode: LinkMode) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Push a chunk of boot or download image to the CP.
    fn download_binary(&self, _data: &[u8]) -> Result<(), ExtensionError> {
        Err(ExtensionError::Unsupported("download_binary"))
    }

    /// The CP announced INIT_START.
    fn cp_start_handler(&self, _mem: &dyn ShmAccess) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Crash log left by the CP, captured on CRASH_EXIT.
    fn crash_log(&self, _mem: &dyn ShmAccess) -> Option<Vec<u8>> {
        None
    }

    /// Begin a CP RAM dump.
    fn dump_start(&self) -> Result<(), ExtensionError> {
        Err(ExtensionError::Unsupported("dump_start"))
    }

    /// Next chunk of the CP RAM dump, `None` once complete.
    fn dump_update(&self) -> Result<Option<Vec<u8>>, ExtensionError> {
        Ok(None)
    }

    /// Device-specific administrative request.
    fn ioctl(&self, _cmd: u32, _arg: &[u8]) -> Result<Vec<u8>, ExtensionError> {
        Err(ExtensionError::Unsupported("ioctl"))
    }

    /// Sees every CP mailbox value before the built-in dispatch.
    fn dispatch(&self, _link: &LinkDevice, _value: u16) -> Dispatch {
        Dispatch::Default
    }

    /// Extended command (bits 15, 14 and 13 set).
    fn ext_command(&self, _link: &LinkDevice, value: u16) {
        debug!("extended command {value:#06x} ignored");
    }

    /// Acknowledge the CP interrupt after the mailbox was read.
    fn clear_intr(&self) {}

    /// The window must be woken before it is touched.
    fn needs_wakeup(&self) -> bool {
        false
    }

    fn wakeup(&self) {}

    fn sleep(&self) {}
}

/// Extension that keeps every default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExtension;

impl Extension for DefaultExtension {}
