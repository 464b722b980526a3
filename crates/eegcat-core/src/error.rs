//! Relay errors

use std::path::PathBuf;

use thiserror::Error;

/// Errors that end a relay session.
///
/// Every variant is fatal: nothing is retried, and the binary maps all of
/// them to exit status 1.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Bad or missing command-line argument
    #[error("{0}")]
    Usage(String),

    /// The serial port could not be opened
    #[error("opening port {port}")]
    OpenPort {
        /// Port name as given
        port: String,
        /// Driver error
        #[source]
        source: serialport::Error,
    },

    /// Framing or modem settings could not be applied
    #[error("configuring {setting}")]
    Configure {
        /// Setting being applied
        setting: &'static str,
        /// Driver error
        #[source]
        source: serialport::Error,
    },

    /// The output file could not be created
    #[error("opening output file {}", path.display())]
    OutputFile {
        /// Requested output path
        path: PathBuf,
        /// OS error
        #[source]
        source: std::io::Error,
    },

    /// The JSON config file could not be read or parsed
    #[error("loading config {}", path.display())]
    Config {
        /// Config file path
        path: PathBuf,
        /// Read or parse failure
        #[source]
        source: ConfigSource,
    },

    /// The channel faulted while waiting or reading
    #[error("transport error")]
    Transport(#[source] std::io::Error),

    /// Writing or flushing the output sink failed
    #[error("writing output")]
    Sink(#[source] std::io::Error),
}

/// Underlying cause of a [`RelayError::Config`]
#[derive(Error, Debug)]
pub enum ConfigSource {
    /// The file could not be read
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The file is not valid config JSON
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_transport_error_keeps_cause_as_source() {
        let err = RelayError::Transport(io::Error::new(
            io::ErrorKind::Other,
            "device reports readiness but returned no data",
        ));
        assert_eq!(err.to_string(), "transport error");
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("device reports readiness but returned no data".to_string())
        );
    }

    #[test]
    fn test_output_file_error_names_path() {
        let err = RelayError::OutputFile {
            path: PathBuf::from("/nonexistent/capture.eeg"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such directory"),
        };
        assert_eq!(err.to_string(), "opening output file /nonexistent/capture.eeg");
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("no such directory".to_string())
        );
    }

    #[test]
    fn test_config_source_is_transparent() {
        let err = RelayError::Config {
            path: PathBuf::from("eegcat.json"),
            source: io::Error::new(io::ErrorKind::NotFound, "file not found").into(),
        };
        assert_eq!(err.to_string(), "loading config eegcat.json");
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("file not found".to_string())
        );
    }

    #[test]
    fn test_usage_error_is_verbatim() {
        let err = RelayError::Usage("baud rate must be greater than zero".into());
        assert_eq!(err.to_string(), "baud rate must be greater than zero");
        assert!(err.source().is_none());
    }
}
