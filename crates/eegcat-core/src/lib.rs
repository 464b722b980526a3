//! # eegcat core library
//!
//! Relays a raw byte stream from a serial port to a file or stdout.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - A [`Channel`](channel::Channel) abstraction over a configured serial port
//! - The event-driven relay loop that drains the channel into a sink
//! - Output sink selection (file or stdout)
//! - Session configuration and logging setup
//!
//! The port is always used at 8 data bits, no parity, one stop bit and no
//! flow control. No framing is added or interpreted: the sink receives the
//! bytes exactly as they arrived.
//!
//! ## Example
//!
//! ```rust,ignore
//! use eegcat_core::{channel::open_channel, relay::Relay, sink::Sink};
//!
//! let channel = open_channel("/dev/ttyUSB0", 57600)?;
//! let sink = Sink::open(None)?;
//! Relay::new(channel, sink).run()?;
//! ```

pub mod channel;
pub mod config;
mod error;
pub mod logging;
pub mod relay;
pub mod sink;

pub use error::{ConfigSource, RelayError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::channel::{open_channel, Channel, EventMask, SerialChannel};
    pub use crate::config::RelayConfig;
    pub use crate::relay::{Relay, RelayStats, TRANSFER_BUFFER_SIZE};
    pub use crate::sink::Sink;
    pub use crate::RelayError;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
