//! Device query commands: serial number and flash CRC.

use anyhow::{Context, Result};
use console::style;
use mothflash::{NativePort, Session};

use crate::config::Config;
use crate::{Cli, ensure_not_interrupted, get_port};

fn open_session(cli: &Cli, config: &Config) -> Result<Session<NativePort>> {
    let port = get_port(cli, config)?;
    if !cli.quiet {
        eprintln!("{} Using port {}", style("🔌").cyan(), style(&port).bold());
    }
    ensure_not_interrupted()?;
    Session::open(&port).with_context(|| format!("Could not open port {port}"))
}

/// Serial number command implementation.
pub(crate) fn cmd_serial_number(cli: &Cli, config: &Config) -> Result<()> {
    let mut session = open_session(cli, config)?;
    let serial = session
        .read_serial_number()
        .context("Could not read serial number")?;
    session.close()?;

    println!("Serial Number: {serial}");
    Ok(())
}

/// Flash CRC command implementation.
pub(crate) fn cmd_crc(cli: &Cli, config: &Config) -> Result<()> {
    let mut session = open_session(cli, config)?;
    let crc = session.read_flash_crc().context("Could not read flash CRC")?;
    session.close()?;

    println!("Flash CRC: {crc}");
    Ok(())
}
