//! Basal profile: the scheduled baseline rate across one day.
//!
//! Supplied by the external profile provider and consumed here only to turn
//! percent-based temporary basals into absolute rates. Segments are keyed
//! by minute of day in UTC.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProfileError;

/// 30-minute granularity over 24 hours.
pub const MAX_BASAL_SEGMENTS: usize = 48;

const MINUTES_PER_DAY: u16 = 24 * 60;

/// One scheduled rate, in effect from `start_minute` until the next segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasalSegment {
    /// Minute of day (0–1439) at which this rate starts.
    pub start_minute: u16,
    /// Scheduled rate in U/h.
    pub rate: f64,
}

/// A validated daily basal schedule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasalProfile {
    segments: heapless::Vec<BasalSegment, MAX_BASAL_SEGMENTS>,
}

impl BasalProfile {
    /// A single rate for the whole day.
    pub fn flat(rate: f64) -> Result<Self, ProfileError> {
        Self::from_segments([BasalSegment {
            start_minute: 0,
            rate,
        }])
    }

    /// Build a profile, rejecting unordered, negative or overflowing input.
    pub fn from_segments(
        segments: impl IntoIterator<Item = BasalSegment>,
    ) -> Result<Self, ProfileError> {
        let mut out = heapless::Vec::new();
        let mut last_start: Option<u16> = None;

        for segment in segments {
            if !segment.rate.is_finite() || segment.rate < 0.0 {
                return Err(ProfileError::InvalidRate);
            }
            match last_start {
                None if segment.start_minute != 0 => {
                    return Err(ProfileError::MissingMidnightSegment);
                }
                Some(prev) if segment.start_minute <= prev => {
                    return Err(ProfileError::UnorderedSegments);
                }
                _ => {}
            }
            if segment.start_minute >= MINUTES_PER_DAY {
                return Err(ProfileError::UnorderedSegments);
            }
            out.push(segment)
                .map_err(|_| ProfileError::TooManySegments)?;
            last_start = Some(segment.start_minute);
        }

        if out.is_empty() {
            return Err(ProfileError::Empty);
        }
        Ok(Self { segments: out })
    }

    pub fn segments(&self) -> &[BasalSegment] {
        &self.segments
    }

    /// Scheduled rate (U/h) in effect at `at`.
    pub fn basal_at(&self, at: DateTime<Utc>) -> f64 {
        let minute = (at.hour() * 60 + at.minute()) as u16;
        self.segments
            .iter()
            .rev()
            .find(|s| s.start_minute <= minute)
            .map_or(0.0, |s| s.rate)
    }

    pub fn max_rate(&self) -> f64 {
        self.segments.iter().map(|s| s.rate).fold(0.0, f64::max)
    }

    pub fn min_rate(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.rate)
            .fold(f64::INFINITY, f64::min)
    }

    /// Insulin scheduled over a full day (U).
    pub fn daily_total(&self) -> f64 {
        let mut total = 0.0;
        for (i, segment) in self.segments.iter().enumerate() {
            let end = self
                .segments
                .get(i + 1)
                .map_or(MINUTES_PER_DAY, |next| next.start_minute);
            total += segment.rate * f64::from(end - segment.start_minute) / 60.0;
        }
        total
    }
}
