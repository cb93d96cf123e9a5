//! Upload command implementation.

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use mothflash::{Firmware, Session, UploadMode, UploadOptions};
use std::path::Path;

use crate::config::Config;
use crate::serial::map_prompt_error;
use crate::{Cli, CliError, ensure_not_interrupted, get_port, use_fancy_output};

/// Arguments of the `upload` subcommand.
pub(crate) struct UploadArgs<'a> {
    pub(crate) firmware: &'a Path,
    pub(crate) destructive: bool,
    pub(crate) no_verify: bool,
    pub(crate) yes: bool,
}

impl UploadArgs<'_> {
    fn mode(&self) -> UploadMode {
        if self.destructive {
            UploadMode::Destructive
        } else {
            UploadMode::NonDestructive
        }
    }
}

/// Decide up front whether a destructive upload can go ahead without asking.
///
/// Returns `Some(true)` when confirmation is already given, `None` when the
/// user must be asked.
fn preconfirmed(mode: UploadMode, assume_yes: bool, non_interactive: bool) -> Result<Option<bool>> {
    if !mode.is_destructive() || assume_yes {
        return Ok(Some(true));
    }
    if non_interactive {
        return Err(CliError::Usage(
            "Destructive upload needs --yes in non-interactive mode".to_string(),
        )
        .into());
    }
    Ok(None)
}

fn ask_overwrite_bootloader() -> bool {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("This will overwrite the bootloader. Are you sure?")
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)
        .unwrap_or_else(|e| {
            warn!("{e}");
            None
        })
        .unwrap_or(false)
}

fn progress_bar(cli: &Cli, total: usize) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total as u64);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} \
                 {msg}",
            )
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb
}

/// Upload command implementation.
pub(crate) fn cmd_upload(cli: &Cli, config: &Config, args: &UploadArgs<'_>) -> Result<()> {
    let mode = args.mode();

    let firmware = Firmware::from_file(args.firmware, mode)
        .with_context(|| format!("Failed to load firmware {}", args.firmware.display()))?;
    if !cli.quiet {
        eprintln!(
            "{} Loaded {} ({} bytes, {} blocks)",
            style("📦").cyan(),
            args.firmware.display(),
            firmware.len(),
            firmware.chunk_count()
        );
    }

    let confirmation = preconfirmed(
        mode,
        args.yes || config.flash.assume_yes,
        cli.non_interactive,
    )?;
    let options = UploadOptions {
        verify: !args.no_verify && config.verify(),
    };

    let port = get_port(cli, config)?;
    if !cli.quiet {
        eprintln!("{} Using port {}", style("🔌").cyan(), style(&port).bold());
    }
    ensure_not_interrupted()?;

    let mut session =
        Session::open(&port).with_context(|| format!("Could not open port {port}"))?;

    let pb = progress_bar(cli, firmware.len());
    pb.set_message("Uploading");
    let result = session.upload(
        &firmware,
        options,
        || {
            pb.suspend(|| confirmation.unwrap_or_else(ask_overwrite_bootloader))
        },
        |sent, _total| pb.set_position(sent as u64),
    );

    let report = match result {
        Ok(report) => {
            pb.finish_with_message("Complete");
            report
        },
        Err(e) => {
            pb.abandon();
            return Err(e).context("Upload failed");
        },
    };
    session.close()?;

    println!("Programmed: {} bytes", report.bytes);
    if let Some(crc) = &report.crc {
        println!("Flash CRC: {crc}");
    }
    if !cli.quiet {
        eprintln!("\n{} Device booted", style("🎉").green().bold());
    }

    Ok(())
}
