//! Byte-message channel between this worker and its controller.
//!
//! A channel is named by the controller-wide shared name plus this worker's index, so
//! several workers of one controller never see each other's traffic.

#[cfg(test)]
mod memory;
#[cfg(unix)]
mod socket;

#[cfg(test)]
pub(crate) use memory::MemoryChannel;
#[cfg(unix)]
pub(crate) use socket::SocketChannel;

use bytes::Bytes;
use std::fmt;
use std::time::Duration;

/// Largest frame accepted from or sent to the controller.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("failed to open channel {name}: {source}")]
    Startup {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("channel i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("controller closed the channel")]
    Closed,
    #[error("no controller connected")]
    NotConnected,
    #[error("frame of {0} bytes exceeds the channel limit")]
    FrameTooLarge(usize),
}

impl ChannelError {
    /// Only a channel that could not be opened at all ends the worker.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChannelError::Startup { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelName {
    pub shared: String,
    pub index: u32,
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.shared, self.index)
    }
}

pub trait Channel {
    fn send(&mut self, message: &[u8]) -> Result<(), ChannelError>;

    /// Wait up to `timeout` for one message. A zero timeout only returns what is
    /// already available.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Bytes>, ChannelError>;
}
