use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scanner::{
    ParallelPrinter, ScanCliArgs, ScanConfig, ScanSession, SessionOutcome, telemetry,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about = "Headless inventory barcode scanner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scan codes from a local camera and print each recognized payload.
    Scan(ScanCliArgs),
}

pub fn handle_command(command: Command) -> Result<()> {
    match command {
        Command::Scan(args) => run_scan(args),
    }
}

fn run_scan(args: ScanCliArgs) -> Result<()> {
    let config = ScanConfig::try_from(args)?;
    let _telemetry = telemetry::enter_runtime(&config.telemetry, config.verbose);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("failed to install Ctrl+C handler")?;
    }

    let (printer, printer_thread) =
        ParallelPrinter::install().context("failed to start output printer")?;

    let session = ScanSession::new(config.clone())
        .with_shutdown(shutdown)
        .on_recognized(move |payload| printer.print(payload));
    let outcome = run_session(session, &config);

    // The session owned the last printer handle; wait for queued lines.
    if printer_thread.join().is_err() {
        warn!("printer thread panicked");
    }

    match outcome? {
        SessionOutcome::Shutdown => info!("scanner stopped"),
        SessionOutcome::LoggedOut => info!(
            timeout = ?config.inactivity_timeout,
            "logged out after inactivity"
        ),
    }

    if config.telemetry.metrics {
        if let Some(rendered) = telemetry::render_metrics() {
            println!("{rendered}");
        }
    }
    Ok(())
}

#[cfg(feature = "with-opencv")]
fn run_session(session: ScanSession, config: &ScanConfig) -> Result<SessionOutcome> {
    use barcode_core::MultiFormatDecoder;
    use video_ingest::opencv_camera;

    let (camera_id, warmup_attempts) = (config.camera_id, config.warmup_attempts);
    session
        .run(
            move || opencv_camera::acquire(camera_id, warmup_attempts),
            MultiFormatDecoder,
        )
        .with_context(|| format!("scan session on camera {camera_id} failed"))
}

#[cfg(not(feature = "with-opencv"))]
fn run_session(_session: ScanSession, config: &ScanConfig) -> Result<SessionOutcome> {
    anyhow::bail!(
        "camera {} cannot be opened: inventory-scan was built without camera support (rebuild with --features with-opencv)",
        config.camera_id
    )
}
