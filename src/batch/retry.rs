//! Retry coordinator: re-runs only the failed accounts after a batch pass.

use std::future::Future;
use std::time::Duration;

use tracing::info;

use crate::Credential;

use super::runner::{run_batch, BatchMode, ExecResult};

/// Re-run failed accounts for up to `budget` passes.
///
/// Each pass sends exactly the currently-failed subset back through the
/// runner with the same mode and inter-account gap, then overwrites only
/// the slots that flipped to success. A success is never regressed; the
/// result list keeps its original ordering because slots are addressed by
/// their original index. Residual failures after the budget stay failed for
/// this run without aborting the process.
pub async fn retry_failed<F, Fut>(
    results: &mut [ExecResult],
    accounts: &[Credential],
    budget: u32,
    mode: BatchMode,
    gap: Duration,
    task: &F,
) where
    F: Fn(usize, Credential) -> Fut,
    Fut: Future<Output = ExecResult>,
{
    for pass in 1..=budget {
        let failed: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.success)
            .map(|(idx, _)| idx)
            .collect();

        if failed.is_empty() {
            break;
        }

        info!("Retry pass {}/{}: {} failed account(s)", pass, budget, failed.len());

        let subset: Vec<Credential> = failed.iter().map(|&idx| accounts[idx].clone()).collect();
        let retried = run_batch(&subset, mode, gap, task).await;

        for (&orig_idx, result) in failed.iter().zip(retried) {
            if result.success {
                info!("Account {} recovered on retry pass {}", orig_idx, pass);
                results[orig_idx] = result;
            }
        }
    }

    let residual = results.iter().filter(|r| !r.success).count();
    if residual > 0 {
        info!("{} account(s) still failed after {} retry pass(es)", residual, budget);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn creds(n: usize) -> Vec<Credential> {
        (0..n)
            .map(|i| Credential { user: format!("user{i}"), password: format!("pw{i}") })
            .collect()
    }

    #[tokio::test]
    async fn test_recovers_failure_with_single_pass() {
        // 3 accounts, one initial failure, budget 2: the failure recovers on
        // pass 1 and no second pass runs.
        let accounts = creds(3);
        let mut results = vec![
            ExecResult::ok("user0", "done"),
            ExecResult::failed("user1", "timeout"),
            ExecResult::ok("user2", "done"),
        ];

        let calls = AtomicU32::new(0);
        let task = |_: usize, c: Credential| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { ExecResult::ok(&c.user, "recovered") }
        };

        retry_failed(&mut results, &accounts, 2, BatchMode::Sequential, Duration::ZERO, &task).await;

        // Exactly one retry pass over exactly one account.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(results[1].message, "recovered");
    }

    #[tokio::test]
    async fn test_only_failed_accounts_are_retried() {
        let accounts = creds(3);
        let mut results = vec![
            ExecResult::failed("user0", "timeout"),
            ExecResult::ok("user1", "done"),
            ExecResult::failed("user2", "timeout"),
        ];

        let seen = Mutex::new(HashSet::new());
        let task = |_: usize, c: Credential| {
            seen.lock().unwrap().insert(c.user.clone());
            async move { ExecResult::ok(&c.user, "recovered") }
        };

        retry_failed(&mut results, &accounts, 3, BatchMode::Concurrent, Duration::ZERO, &task).await;

        let seen = seen.into_inner().unwrap();
        assert!(seen.contains("user0"));
        assert!(seen.contains("user2"));
        assert!(!seen.contains("user1"));
    }

    #[tokio::test]
    async fn test_never_regresses_success() {
        let accounts = creds(2);
        let mut results = vec![
            ExecResult::ok("user0", "done"),
            ExecResult::failed("user1", "timeout"),
        ];

        // Retries keep failing; the original success must survive untouched.
        let task = |_: usize, c: Credential| async move { ExecResult::failed(&c.user, "still down") };

        retry_failed(&mut results, &accounts, 3, BatchMode::Sequential, Duration::ZERO, &task).await;

        assert!(results[0].success);
        assert_eq!(results[0].message, "done");
        assert!(!results[1].success);
        // The failed slot keeps its original message: failures are not overwritten.
        assert_eq!(results[1].message, "timeout");
    }

    #[tokio::test]
    async fn test_budget_bounds_the_passes() {
        let accounts = creds(1);
        let mut results = vec![ExecResult::failed("user0", "timeout")];

        let calls = AtomicU32::new(0);
        let task = |_: usize, c: Credential| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { ExecResult::failed(&c.user, "still down") }
        };

        retry_failed(&mut results, &accounts, 2, BatchMode::Sequential, Duration::ZERO, &task).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!results[0].success);
    }

    #[tokio::test]
    async fn test_zero_budget_is_a_no_op() {
        let accounts = creds(1);
        let mut results = vec![ExecResult::failed("user0", "timeout")];

        let task = |_: usize, c: Credential| async move { ExecResult::ok(&c.user, "recovered") };
        retry_failed(&mut results, &accounts, 0, BatchMode::Sequential, Duration::ZERO, &task).await;

        assert!(!results[0].success);
    }
}
