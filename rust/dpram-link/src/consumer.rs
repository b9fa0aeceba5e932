//! The upper-layer side of a channel.

use std::fmt;

use bytes::Bytes;

use crate::channel::ChannelId;
use crate::device::{LinkDevice, SendStatus};
use crate::error::LinkError;

/// Link state as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Handshake complete, traffic flows.
    Online,
    /// The CP reset after a crash.
    CrashReset,
    /// The CP crashed, or was forced to and never answered.
    CrashExit,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Online => write!(f, "online"),
            LinkState::CrashReset => write!(f, "crash-reset"),
            LinkState::CrashExit => write!(f, "crash-exit"),
        }
    }
}

/// Receives a channel's traffic and the link's state changes.
///
/// Called from the link's background tasks and from the interrupt path, so
/// implementations must not block.
pub trait Consumer: Send + Sync + 'static {
    /// One received message (or one frame on a framed channel).
    fn deliver(&self, data: &[u8]);

    /// The link changed state. Repeats of the same state are suppressed.
    fn notify_state_changed(&self, _state: LinkState) {}

    /// The channel's TX queue is backed up; stop submitting.
    fn suspend_tx(&self) {}

    /// The backlog drained; submitting may resume.
    fn resume_tx(&self) {}
}

/// Submission handle returned by [`LinkDevice::register`].
#[derive(Clone)]
pub struct ChannelHandle {
    link: LinkDevice,
    channel: ChannelId,
}

impl ChannelHandle {
    pub(crate) fn new(link: LinkDevice, channel: ChannelId) -> Self {
        Self { link, channel }
    }

    #[inline]
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Queue a message on this channel. See [`LinkDevice::send`].
    pub fn enqueue(&self, data: impl Into<Bytes>) -> Result<SendStatus, LinkError> {
        self.link.send(self.channel, data)
    }
}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
