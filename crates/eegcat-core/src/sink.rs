//! Output sink
//!
//! The relayed stream goes either to a file or to stdout. On Unix stdout is
//! written as is. On Windows `std::io::Stdout` refuses non-UTF-8 data when
//! attached to a console, so the sink writes to the raw standard output
//! handle instead, which passes bytes through untranslated.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::RelayError;

#[cfg(not(windows))]
type StdoutHandle = io::Stdout;
#[cfg(windows)]
type StdoutHandle = std::mem::ManuallyDrop<File>;

#[cfg(not(windows))]
fn stdout_handle() -> Result<StdoutHandle, RelayError> {
    Ok(io::stdout())
}

#[cfg(windows)]
fn stdout_handle() -> Result<StdoutHandle, RelayError> {
    use std::os::windows::io::{AsRawHandle, FromRawHandle};

    let handle = io::stdout().as_raw_handle();
    if handle.is_null() {
        return Err(RelayError::Sink(io::Error::new(
            io::ErrorKind::NotFound,
            "no standard output handle",
        )));
    }
    // SAFETY: the handle belongs to the process for its whole lifetime and
    // ManuallyDrop keeps the File from closing it.
    Ok(std::mem::ManuallyDrop::new(unsafe {
        File::from_raw_handle(handle)
    }))
}

/// Where relayed bytes are written
pub enum Sink {
    /// Process standard output
    Stdout(StdoutHandle),
    /// A file created (or truncated) for this session
    File {
        /// Open file handle
        file: File,
        /// Path it was opened at
        path: PathBuf,
    },
}

impl Sink {
    /// Open the sink for `output`; `None` selects stdout.
    ///
    /// An existing file is truncated. On Windows the file is opened without
    /// sharing so nothing else can write to it during the capture.
    pub fn open(output: Option<&Path>) -> Result<Self, RelayError> {
        let Some(path) = output else {
            return stdout_handle().map(Self::Stdout);
        };

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(windows)]
        {
            use std::os::windows::fs::OpenOptionsExt;
            options.share_mode(0);
        }

        let file = options.open(path).map_err(|source| RelayError::OutputFile {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("writing to {}", path.display());

        Ok(Self::File {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Human-readable destination name for the startup banner
    pub fn describe(&self) -> String {
        match self {
            Self::Stdout(_) => "stdout".to_string(),
            Self::File { path, .. } => path.display().to_string(),
        }
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout(out) => out.write(buf),
            Self::File { file, .. } => file.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Self::Stdout(out) => out.write_all(buf),
            Self::File { file, .. } => file.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stdout(out) => out.flush(),
            Self::File { file, .. } => file.flush(),
        }
    }
}
