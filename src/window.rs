//! Recording window: the half-open interval `[start, end)` in which capture runs.

use chrono::{DateTime, FixedOffset};

use crate::error::{RecorderError, RecorderResult};

pub const TIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S %z";

pub fn parse_timestamp(value: &str) -> RecorderResult<DateTime<FixedOffset>> {
    DateTime::parse_from_str(value.trim(), TIME_FORMAT).map_err(|source| {
        RecorderError::InvalidTimestamp {
            value: value.to_string(),
            source,
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingWindow {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

impl RecordingWindow {
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> RecorderResult<Self> {
        if end <= start {
            return Err(RecorderError::InvalidWindow { start, end });
        }

        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> RecorderResult<Self> {
        Self::new(parse_timestamp(start)?, parse_timestamp(end)?)
    }

    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    pub fn end(&self) -> DateTime<FixedOffset> {
        self.end
    }

    /// `start <= now < end`. An instant exactly at `end` is outside.
    pub fn in_window(&self, now: DateTime<FixedOffset>) -> bool {
        self.start <= now && now < self.end
    }

    pub fn is_past_end(&self, now: DateTime<FixedOffset>) -> bool {
        now >= self.end
    }

    pub fn is_before_start(&self, now: DateTime<FixedOffset>) -> bool {
        now < self.start
    }
}
