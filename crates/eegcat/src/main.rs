//! eegcat
//!
//! Copy EEG data from a serial port to stdout or a file, flushing after every
//! write so a viewer can follow the output live.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, FromArgMatches, Parser};

use eegcat_core::channel::{list_ports, open_channel};
use eegcat_core::config::RelayConfig;
use eegcat_core::logging;
use eegcat_core::relay::Relay;
use eegcat_core::sink::Sink;
use eegcat_core::RelayError;

/// Name used when argv[0] is unavailable
const FALLBACK_NAME: &str = "eegcat";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Copy EEG data from a serial port to stdout.",
    after_help = "Note that 8 bit data, no parity, 1 stop bit, no handshaking are always used."
)]
struct Args {
    /// Output to FILE instead of stdout. WARNING: an existing FILE is overwritten.
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    file: Option<PathBuf>,

    /// Read from PORT instead of the default
    #[arg(short, long, value_name = "PORT")]
    port: Option<String>,

    /// Set speed to RATE baud instead of the default
    #[arg(short, long, value_name = "RATE", value_parser = clap::value_parser!(u32).range(1..))]
    baud: Option<u32>,

    /// Suppress the start message
    #[arg(short, long)]
    quiet: bool,

    /// Read defaults from a JSON config file; flags override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// List available serial ports and exit
    #[arg(short, long)]
    list_ports: bool,
}

impl Args {
    /// Layer the command-line flags over `base`
    fn apply(&self, mut base: RelayConfig) -> RelayConfig {
        if let Some(port) = &self.port {
            base.port_name = port.clone();
        }
        if let Some(baud) = self.baud {
            base.baud_rate = baud;
        }
        if let Some(file) = &self.file {
            base.output = Some(file.clone());
        }
        base.quiet |= self.quiet;
        base
    }
}

/// Program name for diagnostics: the file stem of argv[0]
fn program_name(argv0: Option<OsString>) -> String {
    argv0
        .as_deref()
        .map(Path::new)
        .and_then(Path::file_stem)
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(FALLBACK_NAME)
        .to_string()
}

fn parse_args<I, T>(prog: &str, argv: I) -> Result<Args, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = Args::command()
        .bin_name(prog.to_string())
        .try_get_matches_from(argv)?;
    Args::from_arg_matches(&matches)
}

fn main() -> ExitCode {
    let prog = program_name(std::env::args_os().next());

    let args = match parse_args(&prog, std::env::args_os()) {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    logging::init_tracing(logging::DEFAULT_FILTER);

    match run(&prog, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&prog, &e);
            ExitCode::from(1)
        }
    }
}

fn run(prog: &str, args: &Args) -> anyhow::Result<()> {
    if args.list_ports {
        print_ports();
        return Ok(());
    }

    let config = load_config(args)?;
    tracing::debug!(version = eegcat_core::VERSION, ?config, "starting relay");

    let sink = Sink::open(config.output.as_deref()).context("cannot set up output")?;
    let channel = open_channel(&config.port_name, config.baud_rate)
        .context("cannot set up serial port")?;

    if !config.quiet {
        eprintln!(
            "{}: Copying {} at {} baud to {}",
            prog,
            channel.name(),
            channel.baud_rate(),
            sink.describe()
        );
        eprintln!("Press ctrl-C to quit.");
    }

    match Relay::new(channel, sink).run() {
        Ok(never) => match never {},
        Err(e) => Err(e.into()),
    }
}

/// Settings for this run: the config file if given, then the flags on top
fn load_config(args: &Args) -> anyhow::Result<RelayConfig> {
    let base = match &args.config {
        Some(path) => RelayConfig::from_file(path).context("cannot read settings")?,
        None => RelayConfig::default(),
    };
    let config = args.apply(base);
    config.validate()?;
    Ok(config)
}

fn print_ports() {
    let ports = list_ports();
    if ports.is_empty() {
        eprintln!("No serial ports found.");
    }
    for port in ports {
        eprintln!("{}", port.describe());
    }
}

/// Write `<prog>: <message>` to stderr, plus the usage line for usage errors
fn report(prog: &str, err: &anyhow::Error) {
    eprintln!("{}: {:#}", prog, err);
    if let Some(RelayError::Usage(_)) = err.downcast_ref::<RelayError>() {
        let usage = Args::command().bin_name(prog.to_string()).render_usage();
        eprintln!("{}", usage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_program_name_strips_directory_and_extension() {
        assert_eq!(
            program_name(Some(OsString::from("/usr/local/bin/eegcat"))),
            "eegcat"
        );
        assert_eq!(
            program_name(Some(OsString::from("tools/catEEG.exe"))),
            "catEEG"
        );
        assert_eq!(program_name(None), FALLBACK_NAME);
    }

    #[test]
    fn test_flags_override_config() {
        let args = parse_args("eegcat", ["eegcat", "-p", "/dev/ttyACM0", "-b", "115200", "-q"])
            .unwrap();
        let base = RelayConfig {
            port_name: "COM4".into(),
            baud_rate: 9600,
            output: Some(PathBuf::from("from-config.eeg")),
            quiet: false,
        };

        assert_eq!(
            args.apply(base),
            RelayConfig {
                port_name: "/dev/ttyACM0".into(),
                baud_rate: 115200,
                output: Some(PathBuf::from("from-config.eeg")),
                quiet: true,
            }
        );
    }

    #[test]
    fn test_no_flags_keeps_defaults() {
        let args = parse_args("eegcat", ["eegcat"]).unwrap();
        assert_eq!(args.apply(RelayConfig::default()), RelayConfig::default());
    }

    #[test]
    fn test_file_flag_selects_output() {
        let args = parse_args("eegcat", ["eegcat", "-f", "session.eeg"]).unwrap();
        let config = args.apply(RelayConfig::default());
        assert_eq!(config.output, Some(PathBuf::from("session.eeg")));
    }

    #[test]
    fn test_missing_value_is_usage_error() {
        let err = parse_args("eegcat", ["eegcat", "-f"]).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::InvalidValue | ErrorKind::MissingRequiredArgument
        ));
    }

    #[test]
    fn test_unknown_parameter_is_rejected() {
        let err = parse_args("eegcat", ["eegcat", "-x"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_zero_or_garbage_baud_is_rejected() {
        assert!(parse_args("eegcat", ["eegcat", "-b", "0"]).is_err());
        assert!(parse_args("eegcat", ["eegcat", "-b", "fast"]).is_err());
    }

    #[test]
    fn test_help_is_not_a_failure() {
        let err = parse_args("eegcat", ["eegcat", "-h"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_missing_config_file_reports_each_cause_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config_arg = path.display().to_string();
        let args = parse_args("eegcat", ["eegcat", "-c", config_arg.as_str()]).unwrap();

        let err = load_config(&args).unwrap_err();
        let message = format!("{:#}", err);
        let expected_prefix = format!("cannot read settings: loading config {}: ", config_arg);
        assert!(
            message.starts_with(&expected_prefix),
            "unexpected message: {}",
            message
        );
        assert_eq!(message.matches(config_arg.as_str()).count(), 1);
        assert_eq!(err.chain().count(), 3);
    }

    #[test]
    fn test_usage_error_from_config_is_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eegcat.json");
        std::fs::write(&path, r#"{ "baud_rate": 0 }"#).unwrap();
        let config_arg = path.display().to_string();
        let args = parse_args("eegcat", ["eegcat", "-c", config_arg.as_str()]).unwrap();

        let err = load_config(&args).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RelayError>(),
            Some(RelayError::Usage(_))
        ));
        assert_eq!(format!("{:#}", err), err.to_string());
    }

    #[test]
    fn test_command_definition_is_valid() {
        Args::command().debug_assert();
    }
}
