use std::fmt;

use dpram_primitives::{ConfirmError, InvalidPointers};

use crate::channel::ChannelId;
use crate::device::LinkMode;
use crate::extension::ExtensionError;
use crate::framing::FrameError;

/// A shared-memory layout that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// The fields do not fit in the region.
    RegionTooSmall { need: usize, have: usize },
    /// A 16-bit field sits at an odd offset.
    Misaligned { field: &'static str, offset: usize },
    /// A field extends past the end of the region.
    OutOfBounds {
        field: &'static str,
        offset: usize,
        len: usize,
        size: usize,
    },
    /// Two fields share bytes.
    Overlap {
        first: &'static str,
        second: &'static str,
    },
    /// A queue too small to carry even one byte.
    CapacityTooSmall { field: &'static str, capacity: u16 },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::RegionTooSmall { need, have } => {
                write!(f, "region too small: need {need} bytes, have {have}")
            }
            LayoutError::Misaligned { field, offset } => {
                write!(f, "{field} at odd offset {offset:#x}")
            }
            LayoutError::OutOfBounds {
                field,
                offset,
                len,
                size,
            } => write!(
                f,
                "{field} ({len} bytes at {offset:#x}) exceeds region of {size} bytes"
            ),
            LayoutError::Overlap { first, second } => write!(f, "{first} overlaps {second}"),
            LayoutError::CapacityTooSmall { field, capacity } => {
                write!(f, "{field} capacity {capacity} is below the minimum of 2")
            }
        }
    }
}

impl std::error::Error for LayoutError {}

/// Errors surfaced by the link device.
#[derive(Debug)]
pub enum LinkError {
    Layout(LayoutError),
    /// A pointer, mailbox or handshake write never read back correctly.
    Confirm(ConfirmError),
    /// A shared queue held out-of-range pointers and was reset.
    InvalidPointers {
        channel: ChannelId,
        source: InvalidPointers,
    },
    /// The message can never fit in the channel's TX queue.
    MessageTooLarge {
        channel: ChannelId,
        len: usize,
        max: usize,
    },
    /// The operation is not allowed in the current mode.
    WrongMode {
        operation: &'static str,
        mode: LinkMode,
    },
    Extension(ExtensionError),
    /// A received burst did not split into frames.
    Frame {
        channel: ChannelId,
        source: FrameError,
    },
    /// Built outside a tokio runtime.
    NoRuntime,
}

impl LinkError {
    /// Whether this fault on `channel` leaves the link unusable.
    ///
    /// Unconfirmed writes and framing errors always are. Invalid pointers
    /// are only fatal on FMT; other channels recover by resetting the queue.
    pub fn is_fatal(&self) -> bool {
        match self {
            LinkError::Confirm(_) | LinkError::Frame { .. } => true,
            LinkError::InvalidPointers { channel, .. } => *channel == ChannelId::Fmt,
            _ => false,
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Layout(e) => write!(f, "invalid layout: {e}"),
            LinkError::Confirm(e) => write!(f, "confirmed write failed: {e}"),
            LinkError::InvalidPointers { channel, source } => {
                write!(f, "{channel}: {source}")
            }
            LinkError::MessageTooLarge { channel, len, max } => {
                write!(f, "{channel}: message of {len} bytes exceeds maximum of {max}")
            }
            LinkError::WrongMode { operation, mode } => {
                write!(f, "{operation} not allowed in {mode} mode")
            }
            LinkError::Extension(e) => write!(f, "extension: {e}"),
            LinkError::Frame { channel, source } => write!(f, "{channel}: {source}"),
            LinkError::NoRuntime => write!(f, "link device must be created inside a tokio runtime"),
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LinkError::Layout(e) => Some(e),
            LinkError::Confirm(e) => Some(e),
            LinkError::InvalidPointers { source, .. } => Some(source),
            LinkError::Extension(e) => Some(e),
            LinkError::Frame { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<LayoutError> for LinkError {
    fn from(e: LayoutError) -> Self {
        LinkError::Layout(e)
    }
}

impl From<ConfirmError> for LinkError {
    fn from(e: ConfirmError) -> Self {
        LinkError::Confirm(e)
    }
}

impl From<ExtensionError> for LinkError {
    fn from(e: ExtensionError) -> Self {
        LinkError::Extension(e)
    }
}
