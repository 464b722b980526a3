//! Channel abstraction
//!
//! A channel is an open, configured serial endpoint. The relay loop only needs
//! three things from it: block until something happens, ask how many bytes
//! are waiting, and read up to that many.

pub mod serial;

use std::io;

use crate::RelayError;

pub use serial::{configure_port, list_ports, open_channel, PortInfo, SerialChannel};

/// Conditions reported by [`Channel::wait_for_event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventMask(u32);

impl EventMask {
    /// Received data is waiting in the input queue
    pub const RX_CHAR: Self = Self(0x0001);
    /// Out-of-band or priority condition on the line
    pub const PRIORITY: Self = Self(0x0002);

    /// Mask with no condition set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bit value
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set in `self`
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if no bit is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// An open, configured communication endpoint the relay reads from
pub trait Channel {
    /// Block until the endpoint reports a monitored condition.
    ///
    /// Must not consume any bytes. There is no timeout.
    fn wait_for_event(&mut self) -> io::Result<EventMask>;

    /// Number of bytes that can be read right now without blocking
    fn pending_count(&mut self) -> io::Result<usize>;

    /// Raw read from the endpoint into `buf`
    fn read_raw(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Read at most `min(buf.len(), pending_count())` bytes.
    ///
    /// `Ok(0)` means nothing more is available for this wait cycle; no OS read
    /// is issued when nothing is pending. A read that times out or is
    /// interrupted is also `Ok(0)`. Only a failed OS read maps to
    /// [`RelayError::Transport`].
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, RelayError> {
        let pending = self.pending_count().map_err(RelayError::Transport)?;
        let len = buf.len().min(pending);
        if len == 0 {
            return Ok(0);
        }

        match self.read_raw(&mut buf[..len]) {
            Ok(n) => Ok(n),
            Err(e) if is_transient(&e) => {
                tracing::trace!("read of {} bytes ended early: {}", len, e);
                Ok(0)
            }
            Err(e) => Err(RelayError::Transport(e)),
        }
    }
}

/// Errors from a read that are not a fault of the link
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}
