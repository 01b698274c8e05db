//! Result aggregation and report formatting.

use chrono::{DateTime, FixedOffset};

use crate::batch::ExecResult;

/// Tallied outcome of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
}

impl Summary {
    /// Count successes and failures over the final result list.
    pub fn tally(results: &[ExecResult]) -> Self {
        let success = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            success,
            failure: results.len() - success,
        }
    }

    /// Fraction of successful accounts, 0.0 for an empty result set.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.success as f64 / self.total as f64
    }
}

/// Mask an account identifier for outbound reports.
///
/// Raw identifiers never leave the process inside a report payload.
pub fn mask_account(account: &str) -> String {
    if account.is_empty() {
        return "unknown".to_string();
    }

    // 11-digit phone number: keep prefix and suffix.
    if account.len() == 11 && account.chars().all(|c| c.is_ascii_digit()) {
        return format!("{}***{}", &account[..3], &account[7..]);
    }

    // Email: mask the local part, keep the domain.
    if let Some((local, domain)) = account.split_once('@') {
        let visible = if local.chars().count() >= 3 {
            local.chars().take(3).collect::<String>()
        } else {
            local.chars().take(1).collect::<String>()
        };
        return format!("{visible}***@{domain}");
    }

    if account.chars().count() > 3 {
        format!("{}***", account.chars().take(3).collect::<String>())
    } else {
        format!("{account}***")
    }
}

/// Build the notification title and body for a finished run.
///
/// When the result list reaches `max_detail`, the per-account section is
/// replaced with a pointer to the service logs.
pub fn build_report(
    results: &[ExecResult],
    now: DateTime<FixedOffset>,
    step_range: (u32, u32),
    max_detail: usize,
) -> (String, String) {
    let summary = Summary::tally(results);
    let date = now.format("%Y-%m-%d");
    let time = now.format("%H:%M:%S");

    let title = format!("{} succeeded, {} failed", summary.success, summary.failure);

    let mut body = format!(
        "{date} step sync report {time}\n\
         ====================\n\
         - Date: {date}\n\
         - Finished: {time}\n\
         - Step range: {}-{}\n\
         - Results: {} succeeded | {} failed\n\
         - Success rate: {:.1}%\n\n\
         Details:\n\
         ----------",
        step_range.0,
        step_range.1,
        summary.success,
        summary.failure,
        summary.success_rate() * 100.0,
    );

    if results.len() >= max_detail {
        body.push_str("\nFull per-account details are in the service logs.");
        return (title, body);
    }

    for (idx, result) in results.iter().enumerate() {
        let status = if result.success { "ok" } else { "FAILED" };
        body.push_str(&format!(
            "\n{}. [{}] account: {}\n   message: {}",
            idx + 1,
            status,
            mask_account(&result.account),
            result.message,
        ));
        if idx + 1 != results.len() {
            body.push_str("\n   ----------------");
        }
    }

    (title, body)
}
