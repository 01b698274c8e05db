//! Run reporting: result aggregation, account masking, and notification
//! sinks.

mod sinks;
mod summary;

pub use sinks::{Notifier, SinkError};
pub use summary::{build_report, mask_account, Summary};
