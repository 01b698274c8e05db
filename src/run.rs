//! One scheduled run: batch pass, failed-account retries, report dispatch.

use chrono::{DateTime, FixedOffset, Timelike};
use rand::Rng;
use tracing::{error, info, warn};

use crate::batch::{retry_failed, run_batch, BatchMode, ExecResult};
use crate::report::{build_report, mask_account, Notifier, Summary};
use crate::schedule::TriggerSchedule;
use crate::vendor::ZeppClient;
use crate::{Config, Credential};

/// Execute the full task body for one trigger: run every account, retry the
/// failures, then aggregate and dispatch the report.
///
/// Credential problems skip the run with a log line; nothing here aborts
/// the process.
pub async fn run_once(config: &Config, now: DateTime<FixedOffset>) {
    let accounts = match config.credentials() {
        Ok(accounts) => accounts,
        Err(e) => {
            error!("Skipping run: {}", e);
            return;
        }
    };

    let hour = now.hour();
    let step_range = TriggerSchedule::step_range(hour);
    let mode = if config.concurrent {
        BatchMode::Concurrent
    } else {
        BatchMode::Sequential
    };
    let total = accounts.len();

    info!(
        "Starting batch: {} account(s), {:?} mode, step range {}-{}",
        total, mode, step_range.0, step_range.1
    );

    let task = |idx: usize, cred: Credential| run_single_account(idx, total, cred, step_range, now);

    let mut results = run_batch(&accounts, mode, config.sleep_gap, &task).await;
    retry_failed(
        &mut results,
        &accounts,
        config.retry_times,
        mode,
        config.sleep_gap,
        &task,
    )
    .await;

    let summary = Summary::tally(&results);
    info!(
        "Run complete: {} succeeded, {} failed ({:.1}% success)",
        summary.success,
        summary.failure,
        summary.success_rate() * 100.0
    );

    let (title, body) = build_report(&results, now, step_range, config.push.push_plus_max);
    match Notifier::new(&config.push) {
        Ok(notifier) => notifier.dispatch(now, &title, &body).await,
        Err(e) => warn!("Could not build notifier: {}", e),
    }
}

/// Run the login/submit sequence for one account. Every failure is caught
/// here and converted into a failed result; the batch never aborts.
async fn run_single_account(
    idx: usize,
    total: usize,
    cred: Credential,
    (min_steps, max_steps): (u32, u32),
    now: DateTime<FixedOffset>,
) -> ExecResult {
    let masked = mask_account(&cred.user);
    let steps = rand::thread_rng().gen_range(min_steps..=max_steps);
    info!("[{}/{}] Account {}: submitting {} steps", idx + 1, total, masked, steps);

    let outcome = async {
        ZeppClient::new(&cred.user, &cred.password)?
            .sync_steps(steps, now)
            .await
    }
    .await;

    match outcome {
        Ok(message) => {
            info!("[{}/{}] Account {}: {}", idx + 1, total, masked, message);
            ExecResult::ok(&cred.user, message)
        }
        Err(e) => {
            warn!("[{}/{}] Account {} failed: {}", idx + 1, total, masked, e);
            ExecResult::failed(&cred.user, e.to_string())
        }
    }
}
