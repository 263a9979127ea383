//! Clock-time arithmetic on the diary night axis.
//!
//! Times are carried as minutes relative to the midnight that falls inside the
//! diary night: 23:30 is `-30.0`, 07:00 is `420.0`. Durations are plain
//! differences on that axis, so intervals that cross midnight need no carry
//! logic. [`ClockTime`] folds any axis value back onto a 24 hour dial.

use std::fmt;

pub const MINUTES_PER_DAY: f64 = 1440.0;

/// Clock times at or after this minute-of-day belong to the evening before.
pub const EVENING_CUTOFF_MIN: f64 = 18.0 * 60.0;

/// Wall-clock minute of day in `0..1440`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    minute_of_day: u16,
}

impl ClockTime {
    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self {
                minute_of_day: hour * 60 + minute,
            })
        } else {
            None
        }
    }

    /// Rounds to the nearest minute and wraps across midnight. Values that
    /// round up to 24:00 land on 00:00.
    pub fn from_night_minutes(minutes: f64) -> Self {
        let rounded = minutes.round().rem_euclid(MINUTES_PER_DAY);
        let minute_of_day = if rounded >= MINUTES_PER_DAY {
            0
        } else {
            rounded as u16
        };
        Self { minute_of_day }
    }

    pub fn hour(self) -> u16 {
        self.minute_of_day / 60
    }

    pub fn minute(self) -> u16 {
        self.minute_of_day % 60
    }

    pub fn minute_of_day(self) -> u16 {
        self.minute_of_day
    }

    /// Position of this clock time on the night axis.
    pub fn to_night_minutes(self) -> f64 {
        let m = f64::from(self.minute_of_day);
        if m >= EVENING_CUTOFF_MIN {
            m - MINUTES_PER_DAY
        } else {
            m
        }
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// Parses `HH:MM` or `HH:MM:SS`. Seconds are truncated.
pub fn parse_clock(raw: &str) -> Option<ClockTime> {
    let mut parts = raw.trim().split(':');
    let hour = parts.next()?.trim().parse::<u16>().ok()?;
    let minute = parts.next()?.trim().parse::<u16>().ok()?;
    if let Some(sec) = parts.next() {
        let sec = sec.trim().parse::<f64>().ok()?;
        if !(0.0..60.0).contains(&sec) {
            return None;
        }
    }
    if parts.next().is_some() {
        return None;
    }
    ClockTime::from_hm(hour, minute)
}

/// Clock string for a night-axis value.
pub fn format_clock(minutes: f64) -> String {
    ClockTime::from_night_minutes(minutes).to_string()
}

/// `HH:MM` rendering of a non-negative duration. Hours are not wrapped, so a
/// 25 hour interval prints as `25:00`.
pub fn format_duration(minutes: f64) -> String {
    let total = minutes.max(0.0).round() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}
