//! Serial port selection.
//!
//! Order of precedence:
//! - `--port` / `MOTHFLASH_PORT`
//! - `[connection] serial` from the config file
//! - the only candidate port, selected automatically
//! - an interactive choice when several candidates are present

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, info},
    mothflash::{
        DetectedPort, detect_candidate_ports, detect_ports, device::format_port_list, find_port,
    },
    std::io::IsTerminal,
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// Offer every port, not only USB serial candidates.
    pub list_all_ports: bool,
    /// Non-interactive mode (fail instead of prompting).
    pub non_interactive: bool,
}

fn usage_err(message: impl Into<String>) -> anyhow::Error {
    CliError::Usage(message.into()).into()
}

/// Select the port to talk to.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<DetectedPort> {
    if let Some(name) = &options.port {
        return Ok(find_port(name)?);
    }

    if let Some(name) = &config.connection.serial {
        debug!("Using port from config: {name}");
        return Ok(find_port(name)?);
    }

    let ports = if options.list_all_ports {
        detect_ports()
    } else {
        detect_candidate_ports()
    };
    select_from(ports, options)
}

fn select_from(mut ports: Vec<DetectedPort>, options: &SerialOptions) -> Result<DetectedPort> {
    match ports.len() {
        0 => Err(usage_err(
            "No serial ports found. Connect the AudioMoth in USB bootloader mode or pass --port",
        )),
        1 => {
            let port = ports.remove(0);
            info!("Auto-selected port: {}", port.name);
            Ok(port)
        },
        _ if options.non_interactive => Err(usage_err(
            "Found multiple serial ports; use --port to choose one",
        )),
        _ => {
            ensure_interactive_terminal()?;
            select_port_interactive(ports)
        },
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "Interactive port selection requires a terminal; use --port",
        ))
    }
}

/// Map a dialoguer failure to a CLI error.
pub(crate) fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) if io_err.kind() == std::io::ErrorKind::Interrupted => {
            CliError::Cancelled("Selection cancelled".to_string()).into()
        },
        DialoguerError::IO(io_err) => usage_err(format!("Prompt failed: {io_err}")),
    }
}

fn select_port_interactive(ports: Vec<DetectedPort>) -> Result<DetectedPort> {
    eprintln!(
        "{} Found {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    let term_width = console::Term::stderr().size().1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = format_port_list(&ports)
        .into_iter()
        .map(|label| console::truncate_str(&label, max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the AudioMoth port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => ports
            .into_iter()
            .nth(index)
            .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}")),
        None => Err(CliError::Cancelled("Selection cancelled".to_string()).into()),
    }
}
