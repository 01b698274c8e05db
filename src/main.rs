//! StepSync daemon.
//!
//! A polling loop that wakes every minute, checks whether the current local
//! hour is an unfired trigger hour, and if so runs the account batch after
//! a random jitter delay. Runs until interrupted.
//!
//! Configuration comes from the `CONFIG` environment variable (JSON blob);
//! see the crate docs for the accepted keys.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::Timelike;
use tokio::time::sleep;
use tracing::{info, warn};

use stepsync::schedule::{should_fire, RunMarker, TriggerSchedule, MARKER_FILE};
use stepsync::{run, Config};

/// Gate poll interval. The trigger window is the full hour, so a minute of
/// granularity is plenty.
const POLL_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = stepsync::init_logging();

    let config = Config::from_env().context("failed to load configuration")?;

    let schedule = match &config.cron_hours_utc {
        Some(utc_hours) => {
            let schedule = TriggerSchedule::from_utc_hours(utc_hours, config.tz_offset_hours);
            info!(
                "Trigger hours from CRON_HOURS: UTC {:?} -> local {:?}",
                utc_hours,
                schedule.hours()
            );
            schedule
        }
        None => {
            let schedule = TriggerSchedule::default();
            info!("Using default trigger hours: {:?}", schedule.hours());
            schedule
        }
    };

    info!(
        "StepSync started ({} mode, retry budget {})",
        if config.concurrent { "concurrent" } else { "sequential" },
        config.retry_times
    );

    let marker_path = PathBuf::from(MARKER_FILE);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            _ = sleep(POLL_INTERVAL) => {
                poll_tick(&config, &schedule, &marker_path).await;
            }
        }
    }

    Ok(())
}

/// One gate evaluation. On a hit: jitter, run the whole task body, and only
/// then record the marker so a crash mid-run retries the hour.
async fn poll_tick(config: &Config, schedule: &TriggerSchedule, marker_path: &Path) {
    let now = config.local_now();
    let marker = RunMarker::load(marker_path);

    if !should_fire(now, schedule, &marker) {
        return;
    }

    let hour = now.hour();
    let delay = TriggerSchedule::jitter_delay(hour);
    info!("Trigger hour {}:00 hit, waiting {:?} before the run", hour, delay);
    sleep(delay).await;

    run::run_once(config, now).await;

    let mut marker = RunMarker::load(marker_path);
    marker.record(&now.format("%Y-%m-%d").to_string(), hour);
    marker.prune(now.date_naive());
    if let Err(e) = marker.save(marker_path) {
        warn!("Failed to persist run marker: {}", e);
    }
}
