//! Time gate: should a run fire right now?

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use super::{RunMarker, TriggerSchedule};

/// True iff `now` falls in a trigger hour that has not yet fired today.
///
/// No side effects: the marker is written by the caller only after the task
/// body completes. Because the caller polls every minute, the effective
/// trigger window is the full hour, not the exact minute.
pub fn should_fire(
    now: DateTime<FixedOffset>,
    schedule: &TriggerSchedule,
    marker: &RunMarker,
) -> bool {
    let hour = chrono::Timelike::hour(&now);

    if !schedule.contains(hour) {
        return false;
    }

    let date = now.format("%Y-%m-%d").to_string();
    if marker.has_fired(&date, hour) {
        debug!("Already fired today at {}:00, skipping", hour);
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 8, 28, hour, 5, 0)
            .unwrap()
    }

    #[test]
    fn test_fires_only_at_trigger_hours() {
        let schedule = TriggerSchedule::local(&[8, 12, 16, 18]);
        let marker = RunMarker::default();

        assert!(should_fire(at(8), &schedule, &marker));
        assert!(!should_fire(at(9), &schedule, &marker));
    }

    #[test]
    fn test_marked_hour_does_not_refire() {
        // Marker already holds today -> 12: hour 12 is spent, 16 still fires.
        let schedule = TriggerSchedule::local(&[8, 12, 16, 18]);
        let mut marker = RunMarker::default();
        marker.record("2026-08-28", 12);

        assert!(!should_fire(at(12), &schedule, &marker));
        assert!(should_fire(at(16), &schedule, &marker));
    }

    #[test]
    fn test_second_check_after_record_is_false() {
        let schedule = TriggerSchedule::local(&[8]);
        let mut marker = RunMarker::default();

        assert!(should_fire(at(8), &schedule, &marker));
        marker.record("2026-08-28", 8);
        assert!(!should_fire(at(8), &schedule, &marker));
    }
}
