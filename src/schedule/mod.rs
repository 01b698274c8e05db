//! Trigger scheduling: daily trigger hours, per-hour jitter windows, and the
//! idempotent "already fired this hour" marker.

mod gate;
mod marker;
mod trigger;

pub use gate::should_fire;
pub use marker::{MarkerError, RunMarker, MARKER_FILE};
pub use trigger::{DelayWindow, TriggerSchedule, DEFAULT_LOCAL_HOURS};
