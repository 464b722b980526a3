//! Relay loop
//!
//! Moves bytes from a [`Channel`] to an output sink. Each outer iteration
//! blocks for an event, then drains the channel through a fixed transfer
//! buffer until a read comes back empty. Every write is flushed before the
//! next read so a reader following the sink sees data immediately.

use std::convert::Infallible;
use std::io::Write;

use crate::channel::{Channel, EventMask};
use crate::RelayError;

/// Capacity of the transfer buffer between one read and one write
pub const TRANSFER_BUFFER_SIZE: usize = 512;

/// Running counters for a relay session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Events returned by the channel
    pub events: u64,
    /// Events that carried received data
    pub data_events: u64,
    /// Reads that returned at least one byte
    pub reads: u64,
    /// Bytes written to the sink
    pub bytes: u64,
}

/// Relay from `C` to `W`
pub struct Relay<C, W> {
    channel: C,
    sink: W,
    buffer: [u8; TRANSFER_BUFFER_SIZE],
    stats: RelayStats,
}

impl<C: Channel, W: Write> Relay<C, W> {
    /// Create a relay over an opened channel and sink
    pub fn new(channel: C, sink: W) -> Self {
        Self {
            channel,
            sink,
            buffer: [0u8; TRANSFER_BUFFER_SIZE],
            stats: RelayStats::default(),
        }
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// The channel being read
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// The sink being written
    pub fn sink(&self) -> &W {
        &self.sink
    }

    /// Give back the channel and sink
    pub fn into_parts(self) -> (C, W) {
        (self.channel, self.sink)
    }

    /// Relay forever. Only returns on a fatal error.
    pub fn run(&mut self) -> Result<Infallible, RelayError> {
        loop {
            if let Err(e) = self.cycle() {
                tracing::debug!(
                    bytes = self.stats.bytes,
                    reads = self.stats.reads,
                    "relay stopped"
                );
                return Err(e);
            }
        }
    }

    /// One outer iteration: wait for an event and, if data is ready, drain it.
    ///
    /// Returns the number of bytes relayed, which is zero when the event did
    /// not report received data or nothing was pending.
    pub fn cycle(&mut self) -> Result<usize, RelayError> {
        let events = self
            .channel
            .wait_for_event()
            .map_err(RelayError::Transport)?;
        self.stats.events += 1;

        if !events.contains(EventMask::RX_CHAR) {
            tracing::trace!("ignoring event mask {:#06x}", events.bits());
            return Ok(0);
        }
        self.stats.data_events += 1;

        self.drain()
    }

    fn drain(&mut self) -> Result<usize, RelayError> {
        let mut total = 0;
        loop {
            let n = self.channel.read(&mut self.buffer)?;
            if n == 0 {
                break;
            }

            self.sink
                .write_all(&self.buffer[..n])
                .map_err(RelayError::Sink)?;
            self.sink.flush().map_err(RelayError::Sink)?;

            self.stats.reads += 1;
            self.stats.bytes += n as u64;
            total += n;
            tracing::trace!("relayed {} bytes", n);
        }

        if total > 0 {
            tracing::debug!(
                "drain cycle moved {} bytes ({} total)",
                total,
                self.stats.bytes
            );
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Channel that reports one event with a fixed amount of data behind it
    struct Burst {
        data: VecDeque<u8>,
        events: VecDeque<EventMask>,
        read_sizes: Vec<usize>,
    }

    impl Burst {
        fn new(len: usize, events: Vec<EventMask>) -> Self {
            Self {
                data: (0..len).map(|i| (i % 251) as u8).collect(),
                events: events.into(),
                read_sizes: Vec::new(),
            }
        }
    }

    impl Channel for Burst {
        fn wait_for_event(&mut self) -> io::Result<EventMask> {
            self.events
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"))
        }

        fn pending_count(&mut self) -> io::Result<usize> {
            Ok(self.data.len())
        }

        fn read_raw(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.data.len());
            for (slot, byte) in buf.iter_mut().zip(self.data.drain(..n)) {
                *slot = byte;
            }
            self.read_sizes.push(n);
            Ok(n)
        }
    }

    #[test]
    fn test_cycle_drains_burst_larger_than_buffer() {
        let mut relay = Relay::new(Burst::new(600, vec![EventMask::RX_CHAR]), Vec::new());

        assert_eq!(relay.cycle().unwrap(), 600);
        assert_eq!(relay.channel().read_sizes, vec![512, 88]);
        assert_eq!(relay.sink().len(), 600);
        assert_eq!(
            relay.stats(),
            RelayStats {
                events: 1,
                data_events: 1,
                reads: 2,
                bytes: 600,
            }
        );
    }

    #[test]
    fn test_cycle_ignores_events_without_data_bit() {
        let mut relay = Relay::new(Burst::new(10, vec![EventMask::PRIORITY]), Vec::new());

        assert_eq!(relay.cycle().unwrap(), 0);
        assert!(relay.channel().read_sizes.is_empty());
        assert!(relay.sink().is_empty());
        assert_eq!(relay.stats().events, 1);
        assert_eq!(relay.stats().data_events, 0);
    }

    #[test]
    fn test_wait_failure_is_transport_error() {
        let mut relay = Relay::new(Burst::new(0, vec![]), Vec::new());
        assert!(matches!(relay.cycle(), Err(RelayError::Transport(_))));
    }

    #[test]
    fn test_run_returns_only_on_error() {
        let mut relay = Relay::new(
            Burst::new(1000, vec![EventMask::RX_CHAR, EventMask::RX_CHAR]),
            Vec::new(),
        );
        let err = match relay.run() {
            Err(e) => e,
            Ok(never) => match never {},
        };
        assert!(matches!(err, RelayError::Transport(_)));
        let (_, sink) = relay.into_parts();
        assert_eq!(sink.len(), 1000);
    }

    /// Shared buffer a test subscriber writes formatted events into
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stopping_on_fault_leaves_reporting_to_caller() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .finish();

        let err = tracing::subscriber::with_default(subscriber, || {
            let mut relay = Relay::new(Burst::new(40, vec![EventMask::RX_CHAR]), Vec::new());
            match relay.run() {
                Err(e) => e,
                Ok(never) => match never {},
            }
        });

        assert!(matches!(err, RelayError::Transport(_)));
        let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logged.is_empty(), "unexpected log output: {}", logged);
    }
}
