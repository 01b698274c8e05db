//! Order-preserving batch runner.
//!
//! Runs one "submit steps" task per account, either sequentially with a
//! fixed inter-account pause or concurrently with one future per account.
//! Output length and ordering always equal the input, regardless of mode or
//! individual failures.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::time::sleep;
use tracing::debug;

use crate::Credential;

/// Per-account outcome of one batch pass.
#[derive(Debug, Clone, Serialize)]
pub struct ExecResult {
    /// Raw account identifier; masked only at report time.
    pub account: String,
    pub success: bool,
    pub message: String,
}

impl ExecResult {
    pub fn ok(account: &str, message: impl Into<String>) -> Self {
        Self { account: account.to_string(), success: true, message: message.into() }
    }

    pub fn failed(account: &str, message: impl Into<String>) -> Self {
        Self { account: account.to_string(), success: false, message: message.into() }
    }
}

/// Batch execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// One account at a time with a fixed pause between accounts.
    Sequential,
    /// All accounts at once; results are still collected in input order.
    Concurrent,
}

/// Run `task` once per credential and collect results in input order.
///
/// The task itself must never fail the batch: any per-account error is
/// expected to come back as a failed [`ExecResult`].
pub async fn run_batch<F, Fut>(
    accounts: &[Credential],
    mode: BatchMode,
    gap: Duration,
    task: &F,
) -> Vec<ExecResult>
where
    F: Fn(usize, Credential) -> Fut,
    Fut: Future<Output = ExecResult>,
{
    match mode {
        BatchMode::Concurrent => {
            debug!("Dispatching {} accounts concurrently", accounts.len());
            join_all(
                accounts
                    .iter()
                    .enumerate()
                    .map(|(idx, cred)| task(idx, cred.clone())),
            )
            .await
        }
        BatchMode::Sequential => {
            let mut results = Vec::with_capacity(accounts.len());
            for (idx, cred) in accounts.iter().enumerate() {
                results.push(task(idx, cred.clone()).await);
                // No pause after the last account.
                if idx + 1 < accounts.len() && !gap.is_zero() {
                    debug!("Sleeping {:?} before next account", gap);
                    sleep(gap).await;
                }
            }
            results
        }
    }
}
