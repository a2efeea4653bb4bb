//! Configuration parsing for the scan runner.
//!
//! CLI arguments and the optional JSON settings file are merged here into a
//! `ScanConfig` so the session never re-parses flags.

use std::{fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use clap::Args;
use serde::{Deserialize, Serialize};
use video_ingest::DEFAULT_WARMUP_ATTEMPTS;

use crate::{
    debounce::{DEFAULT_COOLDOWN, DEFAULT_THRESHOLD, DebounceConfig},
    settings::DisplaySettings,
    telemetry::TelemetryOptions,
    worker::{DEFAULT_FAILURE_BUDGET, WorkerOptions},
};

/// Logout after fifteen idle minutes unless configured otherwise.
pub const DEFAULT_TIMEOUT_SECS: f64 = 15.0 * 60.0;
const DEFAULT_POLL_MS: u64 = 33;

/// Persisted user settings, read from `--settings <path>`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredSettings {
    pub mirror: bool,
    pub timeout_secs: f64,
    pub target_resolution: Option<(u32, u32)>,
}

impl Default for StoredSettings {
    fn default() -> Self {
        Self {
            mirror: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            target_resolution: None,
        }
    }
}

impl StoredSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse settings file {}", path.display()))
    }
}

/// Canonical configuration for one scan session.
#[derive(Clone, Debug)]
pub struct ScanConfig {
    /// Index of the capture device.
    pub camera_id: i32,
    /// Initial display settings handed to the worker.
    pub display: DisplaySettings,
    pub debounce: DebounceConfig,
    /// Idle time before the session logs out.
    pub inactivity_timeout: Duration,
    /// Reads attempted before a camera is declared unavailable.
    pub warmup_attempts: u32,
    pub worker: WorkerOptions,
    /// Pause between consecutive frame requests.
    pub poll_interval: Duration,
    pub verbose: bool,
    pub telemetry: TelemetryOptions,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            camera_id: 0,
            display: DisplaySettings {
                mirror: true,
                target_resolution: None,
            },
            debounce: DebounceConfig::default(),
            inactivity_timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
            warmup_attempts: DEFAULT_WARMUP_ATTEMPTS,
            worker: WorkerOptions::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
            verbose: false,
            telemetry: TelemetryOptions::default(),
        }
    }
}

/// CLI arguments accepted by the `scan` subcommand.
#[derive(Debug, Default, Args)]
pub struct ScanCliArgs {
    /// Capture device index.
    #[arg(long = "camera", value_name = "ID", default_value_t = 0)]
    pub camera_id: i32,
    /// Output width in pixels (requires --height).
    #[arg(long = "width", value_name = "PX")]
    pub width: Option<u32>,
    /// Output height in pixels (requires --width).
    #[arg(long = "height", value_name = "PX")]
    pub height: Option<u32>,
    /// Mirror frames horizontally.
    #[arg(long = "mirror", action = clap::ArgAction::SetTrue, conflicts_with = "no_mirror")]
    pub mirror: bool,
    /// Show frames unmirrored.
    #[arg(long = "no-mirror", action = clap::ArgAction::SetTrue)]
    pub no_mirror: bool,
    /// Sightings a code needs beyond which it is recognized.
    #[arg(long = "threshold", value_name = "N")]
    pub threshold: Option<usize>,
    /// Seconds to suppress new recognitions after one fires.
    #[arg(long = "cooldown-secs", value_name = "SECS")]
    pub cooldown_secs: Option<f64>,
    /// Idle seconds before logging out.
    #[arg(long = "timeout-secs", value_name = "SECS")]
    pub timeout_secs: Option<f64>,
    /// Reads attempted while the camera warms up.
    #[arg(long = "warmup-attempts", value_name = "N")]
    pub warmup_attempts: Option<u32>,
    /// Consecutive failed reads tolerated (0 = never give up).
    #[arg(long = "failure-budget", value_name = "N")]
    pub failure_budget: Option<u32>,
    /// Milliseconds between frame requests.
    #[arg(long = "poll-ms", value_name = "MS")]
    pub poll_ms: Option<u64>,
    /// JSON settings file; flags override its values.
    #[arg(long = "settings", value_name = "PATH")]
    pub settings: Option<PathBuf>,
    /// Enable debug logging.
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
    /// Print Prometheus metrics on exit.
    #[arg(long = "metrics", action = clap::ArgAction::SetTrue)]
    pub metrics: bool,
}

impl TryFrom<ScanCliArgs> for ScanConfig {
    type Error = anyhow::Error;

    fn try_from(args: ScanCliArgs) -> Result<Self> {
        let stored = match args.settings.as_deref() {
            Some(path) => StoredSettings::load(path)?,
            None => StoredSettings::default(),
        };

        if args.camera_id < 0 {
            bail!("--camera must be a non-negative device index");
        }

        let target_resolution = match (args.width, args.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            (None, None) => stored.target_resolution,
            (Some(_), Some(_)) => bail!("--width and --height must be positive integers"),
            (Some(_), None) | (None, Some(_)) => {
                bail!("--width and --height must be given together")
            }
        };
        if let Some((0, _) | (_, 0)) = target_resolution {
            bail!("target_resolution in settings file must be positive");
        }

        let mirror = if args.mirror {
            true
        } else if args.no_mirror {
            false
        } else {
            stored.mirror
        };

        let threshold = args.threshold.unwrap_or(DEFAULT_THRESHOLD);
        if threshold == 0 {
            bail!("--threshold must be at least 1");
        }

        let cooldown = match args.cooldown_secs {
            Some(secs) if !secs.is_finite() || secs < 0.0 => {
                bail!("--cooldown-secs must be a non-negative number")
            }
            Some(secs) => Duration::from_secs_f64(secs),
            None => DEFAULT_COOLDOWN,
        };

        let timeout_secs = args.timeout_secs.unwrap_or(stored.timeout_secs);
        if !timeout_secs.is_finite() || timeout_secs <= 0.0 {
            bail!("--timeout-secs must be a positive number");
        }

        let warmup_attempts = args.warmup_attempts.unwrap_or(DEFAULT_WARMUP_ATTEMPTS);
        if warmup_attempts == 0 {
            bail!("--warmup-attempts must be at least 1");
        }

        let max_consecutive_failures = match args.failure_budget {
            Some(0) => None,
            Some(budget) => Some(budget),
            None => Some(DEFAULT_FAILURE_BUDGET),
        };

        let poll_interval = Duration::from_millis(args.poll_ms.unwrap_or(DEFAULT_POLL_MS));

        Ok(Self {
            camera_id: args.camera_id,
            display: DisplaySettings {
                mirror,
                target_resolution,
            },
            debounce: DebounceConfig {
                threshold,
                cooldown,
            },
            inactivity_timeout: Duration::from_secs_f64(timeout_secs),
            warmup_attempts,
            worker: WorkerOptions {
                max_consecutive_failures,
                annotate: true,
            },
            poll_interval,
            verbose: args.verbose,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
                metrics: args.metrics,
            },
        })
    }
}
