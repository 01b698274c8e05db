//! Account batch execution: order-preserving runner plus the failed-account
//! retry coordinator.

mod retry;
mod runner;

pub use retry::retry_failed;
pub use runner::{run_batch, BatchMode, ExecResult};
