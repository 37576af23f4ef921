mod media;
mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use drive_core::{InMemoryContentStore, LocationSource};
use drive_engine::logging::{init_logging, LoggingMode};
use drive_engine::{ActivationState, Collaborators, DriveMode, EngineConfig};
use drive_location_nmea::{NmeaConfig, NmeaUdpSource};
use model::{DriveModeSettingsPatch, Statistics};
use time::OffsetDateTime;
use tracing::{info, warn};

use media::LogMediaBackend;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogMode {
    Silent,
    Development,
    Debug,
}

impl From<LogMode> for LoggingMode {
    fn from(m: LogMode) -> Self {
        match m {
            LogMode::Silent => LoggingMode::Silent,
            LogMode::Development => LoggingMode::Development,
            LogMode::Debug => LoggingMode::Debug,
        }
    }
}

/// Run drive mode headless against a drivecard catalog, fed by a recorded
/// route or a live NMEA stream, and log what would play.
#[derive(Parser, Debug)]
#[command(name = "drive-sim", version)]
struct Args {
    /// Catalog file (.ndjson, or .csv)
    #[arg(short, long)]
    catalog: PathBuf,

    /// Route CSV to replay (lat,lon,speed_mph,t_ms)
    #[arg(short, long, conflicts_with = "nmea")]
    route: Option<PathBuf>,

    /// Listen for NMEA RMC sentences on this UDP address instead of replaying
    #[arg(long, num_args = 0..=1, default_missing_value = "0.0.0.0:10110")]
    nmea: Option<String>,

    /// Route playback speed multiplier
    #[arg(long, default_value = "10")]
    speedup: f64,

    #[arg(short, long, default_value = "local")]
    user: String,

    /// Where per-user settings are stored (defaults to the platform config dir)
    #[arg(long)]
    settings_dir: Option<PathBuf>,

    /// Simulated length of every clip, in seconds
    #[arg(long, default_value = "20")]
    clip_secs: u64,

    /// Override the trigger distance, miles
    #[arg(long)]
    trigger_distance: Option<f64>,

    /// Scale the trigger distance with speed
    #[arg(long)]
    predictive: bool,

    /// Turn drive mode on at start instead of waiting for auto-enable
    #[arg(long)]
    enable: bool,

    /// Keep running this many seconds after the route ends
    #[arg(long, default_value = "5")]
    linger_secs: u64,

    #[arg(long, value_enum, default_value = "development")]
    log_mode: LogMode,
}

impl Args {
    fn validate(&self) -> Result<()> {
        if self.route.is_none() && self.nmea.is_none() {
            anyhow::bail!("one of --route or --nmea is required");
        }
        if !(self.speedup.is_finite() && self.speedup > 0.0) {
            anyhow::bail!("--speedup must be positive");
        }
        if let Some(d) = self.trigger_distance {
            anyhow::ensure!(d.is_finite() && d > 0.0, "--trigger-distance must be positive");
        }
        Ok(())
    }

    fn settings_patch(&self) -> Option<DriveModeSettingsPatch> {
        if self.trigger_distance.is_none() && !self.predictive {
            return None;
        }
        Some(DriveModeSettingsPatch {
            trigger_distance: self.trigger_distance,
            use_predictive_trigger: self.predictive.then_some(true),
            ..Default::default()
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    args.validate()?;
    init_logging(args.log_mode.into())?;

    let items = iox::import_catalog(&args.catalog)?;
    info!(count = items.len(), path = %args.catalog.display(), "catalog loaded");

    let settings_dir = match &args.settings_dir {
        Some(d) => d.clone(),
        None => dirs_next::config_dir()
            .context("no config directory; pass --settings-dir")?
            .join("drive-sim"),
    };

    let drive = DriveMode::new(
        args.user.clone(),
        Collaborators {
            content: Arc::new(InMemoryContentStore::new(items)),
            settings: Arc::new(iox::FileSettingsStore::new(settings_dir)),
            media: Arc::new(LogMediaBackend::new(Duration::from_secs(args.clip_secs))),
        },
        EngineConfig::default(),
    );
    tokio::spawn(session::report(drive.subscribe()));
    if let Some(patch) = args.settings_patch() {
        drive.update_settings(patch);
    }
    if args.enable {
        drive.enable(true);
    }

    let (tx, rx) = drive_core::channel();
    let pump = tokio::spawn(session::pump(drive.clone(), rx));

    if let Some(path) = &args.route {
        let route = iox::import_route_csv(path)?;
        info!(samples = route.len(), speedup = args.speedup, "replaying route");
        tokio::select! {
            _ = session::replay(&route, args.speedup, OffsetDateTime::now_utc(), &tx) => {
                tokio::time::sleep(Duration::from_secs(args.linger_secs)).await;
            }
            _ = tokio::signal::ctrl_c() => info!("interrupted"),
        }
    } else if let Some(addr) = &args.nmea {
        let source = NmeaUdpSource::new(NmeaConfig { bind_addr: addr.clone() });
        let live = tx.clone();
        tokio::select! {
            r = source.run(live) => {
                if let Err(e) = r {
                    warn!(error = %e, "location source stopped");
                }
            }
            _ = tokio::signal::ctrl_c() => info!("interrupted"),
        }
    }

    drop(tx);
    let _ = pump.await;
    drive.shutdown().await;

    let report = summary(&args.user, drive.state(), &drive.statistics());
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn summary(user: &str, state: ActivationState, stats: &Statistics) -> serde_json::Value {
    serde_json::json!({
        "user": user,
        "state": state,
        "statistics": stats,
    })
}
