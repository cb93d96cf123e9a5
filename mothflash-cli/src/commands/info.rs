//! Firmware info and port listing command implementations.

use {
    crate::Cli,
    anyhow::{Context, Result},
    console::style,
    mothflash::{
        UploadMode, detect_candidate_ports, detect_ports, image::check_size,
        protocol::xmodem::PAYLOAD_SIZE,
    },
    serde::Serialize,
    std::{fs, path::Path},
};

/// List ports command implementation.
pub(crate) fn cmd_list_ports(cli: &Cli, json: bool) -> Result<()> {
    let detected = if cli.list_all_ports {
        detect_ports()
    } else {
        detect_candidate_ports()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&detected)?);
        return Ok(());
    }

    eprintln!("{}", style("Serial ports").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("No ports found").dim());
        return Ok(());
    }

    for port in &detected {
        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };
        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{vid_pid}{product}",
            style("•").green(),
            style(&port.name).cyan(),
        );
    }

    Ok(())
}

/// Size report for one upload mode.
#[derive(Debug, Serialize)]
struct ModeFit {
    mode: UploadMode,
    limit: usize,
    fits: bool,
}

/// Summary of a firmware file.
#[derive(Debug, Serialize)]
struct ImageInfo {
    path: String,
    size: usize,
    blocks: usize,
    modes: Vec<ModeFit>,
}

fn image_info(path: &Path) -> Result<ImageInfo> {
    let size = fs::metadata(path)
        .with_context(|| format!("Failed to read firmware {}", path.display()))?
        .len();
    let size = usize::try_from(size).context("Firmware size does not fit in memory")?;

    let modes = [UploadMode::NonDestructive, UploadMode::Destructive]
        .into_iter()
        .map(|mode| ModeFit {
            mode,
            limit: mode.max_size(),
            fits: check_size(size, mode).is_ok(),
        })
        .collect();

    Ok(ImageInfo {
        path: path.display().to_string(),
        size,
        blocks: size.div_ceil(PAYLOAD_SIZE),
        modes,
    })
}

/// Info command implementation.
pub(crate) fn cmd_info(firmware: &Path, json: bool) -> Result<()> {
    let info = image_info(firmware)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    eprintln!("\n{}", style("Firmware Information").bold().underlined());
    eprintln!("  Path:   {}", info.path);
    eprintln!("  Size:   {} bytes", info.size);
    eprintln!("  Blocks: {} x {PAYLOAD_SIZE} bytes", info.blocks);
    for fit in &info.modes {
        let verdict = if fit.fits {
            style("fits").green()
        } else if info.size == 0 {
            style("empty").red()
        } else {
            style("too large").red()
        };
        eprintln!(
            "  {:?}: {verdict} (limit {} bytes)",
            fit.mode, fit.limit
        );
    }

    Ok(())
}
