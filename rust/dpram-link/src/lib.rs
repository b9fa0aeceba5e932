//! Flow-controlled messaging between an application processor (AP) and a
//! peer processor (CP) that share nothing but a dual-ported memory window
//! and a pair of 16-bit mailboxes.
//!
//! The [`LinkDevice`] owns the shared-memory view, runs the command state
//! machine driven by [`LinkDevice::handle_interrupt`], moves bytes through
//! the per-channel circular queues and escalates every unrecoverable fault
//! into a forced CP crash. Background work (RX delivery, RES_ACK retry
//! workers, the crash-ack timer and dump persistence) runs on the tokio
//! runtime that was current when the device was built.

#[macro_use]
mod macros;

pub mod admin;
mod boot;
pub mod channel;
mod command;
pub mod config;
pub mod consumer;
mod crash;
pub mod device;
pub mod diagnostic;
mod dispatch;
pub mod dump;
pub mod error;
pub mod extension;
mod flow;
pub mod framing;
pub mod indirect;
pub mod layout;
pub mod mailbox;
pub mod power;
mod rx;
mod tx;

pub use admin::{AdminCommand, AdminResponse};
pub use channel::ChannelId;
pub use command::ControlEvent;
pub use config::{DumpConfig, LinkConfig, PerChannel};
pub use consumer::{ChannelHandle, Consumer, LinkState};
pub use device::{LinkDevice, LinkMode, SendStatus};
pub use diagnostic::{ChannelDiagnostics, LinkDiagnostics, RingStats, TrafficStats};
pub use dump::{DumpJob, DumpKind};
pub use error::{LayoutError, LinkError};
pub use extension::{DefaultExtension, Dispatch, Extension, ExtensionError};
pub use framing::{Frame, FrameError, Frames};
pub use indirect::{IndirectRegion, RegisterPort, WindowPort};
pub use layout::{ACCESS_ENABLED, ChannelLayout, LinkLayout, MAGIC_CODE};
pub use mailbox::{ChannelMasks, Command, Mailbox};
pub use power::{PowerGate, PowerGuard};

pub use dpram_primitives::{
    CircQueue, ConfirmError, ConfirmPolicy, HeapRegion, InvalidPointers, Region, ShmAccess,
};
#[cfg(unix)]
pub use dpram_primitives::MmapRegion;
