//! Trigger schedule: the set of local hours at which a run may fire, plus
//! the jitter-delay window and fabricated step range for each hour.

use std::time::Duration;

use rand::Rng;

/// Default local trigger hours when `CRON_HOURS` is not configured.
pub const DEFAULT_LOCAL_HOURS: [u32; 4] = [8, 12, 16, 18];

/// Jitter window applied before a triggered run, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayWindow {
    pub min_ms: u64,
    pub max_ms: u64,
}

/// Per-hour jitter windows. Hours outside the table use the default.
const DELAY_TABLE: [(u32, DelayWindow); 4] = [
    (8, DelayWindow { min_ms: 4_000, max_ms: 6_000 }),
    (12, DelayWindow { min_ms: 10_000, max_ms: 14_000 }),
    (16, DelayWindow { min_ms: 19_000, max_ms: 23_000 }),
    (18, DelayWindow { min_ms: 25_000, max_ms: 30_000 }),
];

const DEFAULT_DELAY: DelayWindow = DelayWindow { min_ms: 18_000, max_ms: 25_000 };

/// Per-hour fabricated step-total ranges, default for unlisted hours.
const STEP_TABLE: [(u32, (u32, u32)); 4] = [
    (8, (4_000, 6_000)),
    (12, (10_000, 14_000)),
    (16, (19_000, 23_000)),
    (18, (25_000, 30_000)),
];

const DEFAULT_STEPS: (u32, u32) = (18_000, 25_000);

/// Ordered set of distinct local hours-of-day at which execution may fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSchedule {
    hours: Vec<u32>,
}

impl TriggerSchedule {
    /// Build from local hours. Out-of-range values are dropped; the result
    /// is deduplicated and sorted.
    pub fn local(hours: &[u32]) -> Self {
        let mut hours: Vec<u32> = hours.iter().copied().filter(|h| *h < 24).collect();
        hours.sort_unstable();
        hours.dedup();

        if hours.is_empty() {
            hours = DEFAULT_LOCAL_HOURS.to_vec();
        }

        Self { hours }
    }

    /// Build from UTC hours by applying a fixed offset.
    pub fn from_utc_hours(utc_hours: &[u32], offset_hours: i32) -> Self {
        let local: Vec<u32> = utc_hours
            .iter()
            .filter(|h| **h < 24)
            .map(|h| (*h as i32 + offset_hours).rem_euclid(24) as u32)
            .collect();
        Self::local(&local)
    }

    /// The sorted local trigger hours.
    pub fn hours(&self) -> &[u32] {
        &self.hours
    }

    /// Whether the given local hour is a trigger hour.
    pub fn contains(&self, hour: u32) -> bool {
        self.hours.binary_search(&hour).is_ok()
    }

    /// Jitter window for the given hour.
    pub fn delay_window(hour: u32) -> DelayWindow {
        DELAY_TABLE
            .iter()
            .find(|(h, _)| *h == hour)
            .map(|(_, w)| *w)
            .unwrap_or(DEFAULT_DELAY)
    }

    /// Draw a random delay from the hour's jitter window.
    pub fn jitter_delay(hour: u32) -> Duration {
        let window = Self::delay_window(hour);
        let ms = rand::thread_rng().gen_range(window.min_ms..=window.max_ms);
        Duration::from_millis(ms)
    }

    /// Fabricated step-total range for the given hour.
    pub fn step_range(hour: u32) -> (u32, u32) {
        STEP_TABLE
            .iter()
            .find(|(h, _)| *h == hour)
            .map(|(_, r)| *r)
            .unwrap_or(DEFAULT_STEPS)
    }
}

impl Default for TriggerSchedule {
    fn default() -> Self {
        Self::local(&DEFAULT_LOCAL_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utc_conversion() {
        let schedule = TriggerSchedule::from_utc_hours(&[0, 4, 8, 10], 8);
        assert_eq!(schedule.hours(), &[8, 12, 16, 18]);
    }

    #[test]
    fn test_utc_conversion_wraps_midnight() {
        let schedule = TriggerSchedule::from_utc_hours(&[20, 23], 8);
        assert_eq!(schedule.hours(), &[4, 7]);

        let schedule = TriggerSchedule::from_utc_hours(&[2, 5], -5);
        assert_eq!(schedule.hours(), &[0, 21]);
    }

    #[test]
    fn test_conversion_is_idempotent() {
        let once = TriggerSchedule::from_utc_hours(&[22, 3, 3, 10], 8);
        let twice = TriggerSchedule::from_utc_hours(once.hours(), 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_dedupe_and_sort() {
        let schedule = TriggerSchedule::local(&[18, 8, 12, 8, 25]);
        assert_eq!(schedule.hours(), &[8, 12, 18]);
    }

    #[test]
    fn test_empty_falls_back_to_defaults() {
        let schedule = TriggerSchedule::local(&[]);
        assert_eq!(schedule.hours(), &DEFAULT_LOCAL_HOURS);
    }

    #[test]
    fn test_delay_window_fallback() {
        assert_eq!(
            TriggerSchedule::delay_window(8),
            DelayWindow { min_ms: 4_000, max_ms: 6_000 }
        );
        assert_eq!(TriggerSchedule::delay_window(3), DEFAULT_DELAY);
    }

    #[test]
    fn test_jitter_delay_within_window() {
        for _ in 0..50 {
            let delay = TriggerSchedule::jitter_delay(12);
            assert!(delay >= Duration::from_millis(10_000));
            assert!(delay <= Duration::from_millis(14_000));
        }
    }

    #[test]
    fn test_step_range() {
        assert_eq!(TriggerSchedule::step_range(18), (25_000, 30_000));
        assert_eq!(TriggerSchedule::step_range(7), DEFAULT_STEPS);
    }
}
