//! mothflash CLI - Command-line tool for flashing AudioMoth devices.
//!
//! ## Features
//!
//! - Upload firmware over the USB bootloader (XMODEM)
//! - Read the serial number and flash CRC
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;
mod serial;

use config::Config;
use serial::{SerialOptions, select_serial_port};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if progress bars and symbols should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Errors with a dedicated exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid invocation or missing setup (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// The user cancelled (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Cancelled(_) => 130,
        }
    }
}

/// Map an error to the process exit code.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }
    match err.downcast_ref::<mothflash::Error>() {
        Some(mothflash::Error::Interrupted | mothflash::Error::UploadDeclined) => 130,
        _ => 1,
    }
}

/// mothflash - Flash AudioMoth firmware over the USB bootloader.
///
/// Environment variables:
///   MOTHFLASH_PORT              - Default serial port
///   MOTHFLASH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "mothflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "MOTHFLASH_PORT")]
    port: Option<String>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "MOTHFLASH_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Consider all serial ports, not only USB serial devices.
    #[arg(long, global = true)]
    list_all_ports: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List serial ports that may be an AudioMoth.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Read the device serial number.
    SerialNumber,

    /// Read the CRC of the application flash area.
    Crc,

    /// Upload a firmware image and boot it.
    Upload {
        /// Path to the raw firmware binary.
        firmware: PathBuf,

        /// Overwrite the bootloader as well (whole flash).
        #[arg(long)]
        destructive: bool,

        /// Do not read back the flash CRC after uploading.
        #[arg(long)]
        no_verify: bool,

        /// Skip the destructive upload confirmation.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show information about a firmware file.
    Info {
        /// Path to the raw firmware binary.
        firmware: PathBuf,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn install_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Failed to install Ctrl-C handler: {e}");
    }
    mothflash::set_interrupt_checker(was_interrupted);
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    init_logging(&cli);
    install_interrupt_handler();

    debug!(
        "mothflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code_for(&err))
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::ListPorts { json } => commands::info::cmd_list_ports(cli, *json),
        Commands::SerialNumber => commands::device::cmd_serial_number(cli, &config),
        Commands::Crc => commands::device::cmd_crc(cli, &config),
        Commands::Upload {
            firmware,
            destructive,
            no_verify,
            yes,
        } => commands::upload::cmd_upload(
            cli,
            &config,
            &commands::upload::UploadArgs {
                firmware: firmware.as_path(),
                destructive: *destructive,
                no_verify: *no_verify,
                yes: *yes,
            },
        ),
        Commands::Info { firmware, json } => commands::info::cmd_info(firmware, *json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Select the serial port from CLI args, config, or interactively.
pub(crate) fn get_port(cli: &Cli, config: &Config) -> Result<String> {
    let options = SerialOptions {
        port: cli.port.clone(),
        list_all_ports: cli.list_all_ports,
        non_interactive: cli.non_interactive,
    };

    Ok(select_serial_port(&options, config)?.name)
}

/// Fail with `Cancelled` once Ctrl-C was pressed.
pub(crate) fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("Interrupted".to_string()).into())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use anyhow::Context as _;
    use clap::CommandFactory;

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_upload() {
        let cli = Cli::try_parse_from([
            "mothflash",
            "--port",
            "/dev/ttyACM0",
            "upload",
            "AudioMoth.bin",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyACM0"));
        match cli.command {
            Commands::Upload {
                firmware,
                destructive,
                no_verify,
                yes,
            } => {
                assert_eq!(firmware, PathBuf::from("AudioMoth.bin"));
                assert!(!destructive);
                assert!(!no_verify);
                assert!(!yes);
            },
            _ => panic!("expected upload"),
        }
    }

    #[test]
    fn test_cli_parse_upload_all_options() {
        let cli = Cli::try_parse_from([
            "mothflash",
            "upload",
            "--destructive",
            "--no-verify",
            "-y",
            "full.bin",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Upload {
                destructive: true,
                no_verify: true,
                yes: true,
                ..
            }
        ));
    }

    #[test]
    fn test_cli_parse_queries() {
        assert!(matches!(
            Cli::try_parse_from(["mothflash", "serial-number"]).unwrap().command,
            Commands::SerialNumber
        ));
        assert!(matches!(
            Cli::try_parse_from(["mothflash", "crc"]).unwrap().command,
            Commands::Crc
        ));
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from([
            "mothflash",
            "list-ports",
            "--json",
            "-vv",
            "--quiet",
            "--non-interactive",
            "--list-all-ports",
            "--config",
            "custom.toml",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
        assert!(cli.non_interactive);
        assert!(cli.list_all_ports);
        assert_eq!(cli.config_path, Some(PathBuf::from("custom.toml")));
        assert!(matches!(cli.command, Commands::ListPorts { json: true }));
    }

    #[test]
    fn test_cli_missing_subcommand() {
        assert!(Cli::try_parse_from(["mothflash"]).is_err());
    }

    #[test]
    fn test_cli_upload_requires_file() {
        assert!(Cli::try_parse_from(["mothflash", "upload"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        let usage: anyhow::Error = CliError::Usage("bad".into()).into();
        let cancelled: anyhow::Error = CliError::Cancelled("stop".into()).into();
        let declined: anyhow::Error = mothflash::Error::UploadDeclined.into();
        let timeout: anyhow::Error = mothflash::Error::ReadyTimeout.into();

        assert_eq!(exit_code_for(&usage), 2);
        assert_eq!(exit_code_for(&cancelled), 130);
        assert_eq!(exit_code_for(&declined), 130);
        assert_eq!(exit_code_for(&timeout), 1);
    }

    #[test]
    fn test_exit_code_through_context() {
        let err = Err::<(), _>(mothflash::Error::Interrupted)
            .context("Upload failed")
            .unwrap_err();
        assert_eq!(exit_code_for(&err), 130);
    }
}
