//! Serial port channel
//!
//! Opens a port at a fixed 8-N-1 framing with no flow control and exposes it
//! as a [`Channel`].

use serialport::{
    DataBits, FlowControl, Parity, SerialPort, SerialPortInfo, SerialPortType, StopBits,
};
use std::collections::BTreeMap;
use std::io::{self, Read};
#[cfg(target_os = "linux")]
use std::path::Path;
use std::time::Duration;

use super::{Channel, EventMask};
use crate::RelayError;

#[cfg(unix)]
type NativePort = serialport::TTYPort;
#[cfg(windows)]
type NativePort = serialport::COMPort;

/// Upper bound on a single read once data has been reported pending
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// An open serial port ready for relaying
pub struct SerialChannel {
    port: NativePort,
    name: String,
    baud_rate: u32,
}

impl SerialChannel {
    /// Port name the channel was opened with
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured baud rate
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl std::fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialChannel")
            .field("name", &self.name)
            .field("baud_rate", &self.baud_rate)
            .finish()
    }
}

impl Channel for SerialChannel {
    #[cfg(unix)]
    fn wait_for_event(&mut self) -> io::Result<EventMask> {
        use std::os::unix::io::AsRawFd;

        let mut fds = [libc::pollfd {
            fd: self.port.as_raw_fd(),
            events: libc::POLLIN | libc::POLLPRI,
            revents: 0,
        }];

        // SAFETY: `fds` is a live array of one pollfd for the whole call.
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(EventMask::empty());
            }
            return Err(err);
        }

        let revents = fds[0].revents;
        let pending = if revents & FAULT_EVENTS != 0 {
            self.pending_count().unwrap_or(0)
        } else {
            0
        };
        events_from_revents(revents, pending)
    }

    #[cfg(windows)]
    fn wait_for_event(&mut self) -> io::Result<EventMask> {
        use std::os::windows::io::AsRawHandle;
        use windows_sys::Win32::Devices::Communication::WaitCommEvent;

        let mut fired = 0;
        // SAFETY: the handle is owned by `self.port` and outlives the call;
        // `fired` is a live out-pointer and no OVERLAPPED is passed.
        let ok = unsafe {
            WaitCommEvent(self.port.as_raw_handle() as _, &mut fired, std::ptr::null_mut())
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(events_from_comm_mask(fired))
    }

    fn pending_count(&mut self) -> io::Result<usize> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

#[cfg(unix)]
const FAULT_EVENTS: libc::c_short = libc::POLLHUP | libc::POLLERR | libc::POLLNVAL;

/// Translate poll(2) results into an event mask.
///
/// `pending` is the input queue length, consulted only alongside a fault.
/// Queued bytes win over a hangup so data that arrived before the line
/// dropped is still drained; once the queue is empty the fault is reported,
/// even if the descriptor also claims to be readable.
#[cfg(unix)]
fn events_from_revents(revents: libc::c_short, pending: usize) -> io::Result<EventMask> {
    let mut mask = EventMask::empty();
    if revents & libc::POLLIN != 0 {
        mask |= EventMask::RX_CHAR;
    }
    if revents & libc::POLLPRI != 0 {
        mask |= EventMask::PRIORITY;
    }
    if revents & FAULT_EVENTS == 0 || pending > 0 {
        return Ok(mask);
    }

    if revents & libc::POLLNVAL != 0 {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            "port descriptor is no longer valid",
        ));
    }
    if revents & libc::POLLHUP != 0 {
        return Err(io::Error::new(io::ErrorKind::BrokenPipe, "port hung up"));
    }
    if revents & libc::POLLERR != 0 {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            "error condition reported on port",
        ));
    }
    Ok(mask)
}

/// Translate a `WaitCommEvent` result into an event mask
#[cfg(windows)]
fn events_from_comm_mask(fired: u32) -> EventMask {
    use windows_sys::Win32::Devices::Communication::EV_RXCHAR;

    if fired & EV_RXCHAR != 0 {
        EventMask::RX_CHAR
    } else {
        EventMask::empty()
    }
}

/// Make `WaitCommEvent` return when a character is received
#[cfg(windows)]
fn watch_comm_events(port: &NativePort) -> Result<(), RelayError> {
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::Devices::Communication::{SetCommMask, EV_RXCHAR};

    // SAFETY: the handle is owned by `port` and valid for the call.
    let ok = unsafe { SetCommMask(port.as_raw_handle() as _, EV_RXCHAR) };
    if ok == 0 {
        return Err(RelayError::Configure {
            setting: "event mask",
            source: io::Error::last_os_error().into(),
        });
    }
    Ok(())
}

/// Open `name` at `baud_rate` and apply the fixed framing.
///
/// On Unix the port is opened exclusively, so a port already held by another
/// process fails here.
pub fn open_channel(name: &str, baud_rate: u32) -> Result<SerialChannel, RelayError> {
    let mut port = serialport::new(name, baud_rate)
        .timeout(READ_TIMEOUT)
        .open_native()
        .map_err(|source| RelayError::OpenPort {
            port: name.to_string(),
            source,
        })?;
    tracing::debug!("opened {} at {} baud", name, baud_rate);

    configure_port(&mut port)?;
    #[cfg(windows)]
    watch_comm_events(&port)?;

    Ok(SerialChannel {
        port,
        name: name.to_string(),
        baud_rate,
    })
}

/// Configure a port for raw capture: 8 data bits, no parity, one stop bit,
/// no hardware or software flow control, modem lines deasserted.
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), RelayError> {
    port.set_data_bits(DataBits::Eight)
        .map_err(|source| RelayError::Configure {
            setting: "data bits",
            source,
        })?;
    port.set_parity(Parity::None)
        .map_err(|source| RelayError::Configure {
            setting: "parity",
            source,
        })?;
    port.set_stop_bits(StopBits::One)
        .map_err(|source| RelayError::Configure {
            setting: "stop bits",
            source,
        })?;
    port.set_flow_control(FlowControl::None)
        .map_err(|source| RelayError::Configure {
            setting: "flow control",
            source,
        })?;

    // Modem control lines stay low; some adapters cannot drive them at all.
    if let Err(e) = port.write_data_terminal_ready(false) {
        tracing::warn!("failed to clear DTR: {} (continuing)", e);
    }
    if let Err(e) = port.write_request_to_send(false) {
        tracing::warn!("failed to clear RTS: {} (continuing)", e);
    }

    tracing::debug!("port configured for 8-N-1, no flow control");
    Ok(())
}

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
        }
    }

    /// One-line description for port listings
    pub fn describe(&self) -> String {
        let mut line = self.name.clone();
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            line.push_str(&format!(" [{:04x}:{:04x}]", vid, pid));
        }
        let label: Vec<&str> = [self.manufacturer.as_deref(), self.product.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if !label.is_empty() {
            line.push(' ');
            line.push_str(&label.join(" "));
        }
        line
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// Listing order: CDC-ACM devices, then USB serial adapters, then the rest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PortClass {
    CdcAcm,
    UsbSerial,
    Other,
}

impl PortClass {
    /// Classify a port and extract its device number, if any
    fn of(name: &str) -> (Self, Option<u32>) {
        let node = name.rsplit(['/', '\\']).next().unwrap_or(name);
        for (prefix, class) in [("ttyACM", Self::CdcAcm), ("ttyUSB", Self::UsbSerial)] {
            if let Some(index) = node.strip_prefix(prefix) {
                return (class, index.parse().ok());
            }
        }
        (Self::Other, None)
    }
}

/// Order ports by class, then tty device number, then name
fn sort_ports(ports: &mut [PortInfo]) {
    ports.sort_by_cached_key(|p| {
        let (class, index) = PortClass::of(&p.name);
        (class, index.unwrap_or(u32::MAX), p.name.clone())
    });
}

/// Device nodes under `dev` that look like USB serial adapters
#[cfg(target_os = "linux")]
fn usb_tty_nodes(dev: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dev) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|node| PortClass::of(node).0 != PortClass::Other)
        .map(|node| dev.join(node).display().to_string())
        .collect()
}

/// List available serial ports in a deterministic order.
///
/// On Linux, `/dev/ttyACM*` and `/dev/ttyUSB*` nodes missed by the
/// enumeration API are added without USB metadata.
pub fn list_ports() -> Vec<PortInfo> {
    let mut by_name: BTreeMap<String, PortInfo> = serialport::available_ports()
        .unwrap_or_else(|e| {
            tracing::warn!("port enumeration failed: {}", e);
            Vec::new()
        })
        .into_iter()
        .map(PortInfo::from)
        .map(|p| (p.name.clone(), p))
        .collect();

    #[cfg(target_os = "linux")]
    for node in usb_tty_nodes(Path::new("/dev")) {
        by_name
            .entry(node.clone())
            .or_insert_with(|| PortInfo::bare(node));
    }

    let mut ports: Vec<PortInfo> = by_name.into_values().collect();
    sort_ports(&mut ports);
    ports
}
