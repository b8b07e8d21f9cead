use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Format of the hour stamps used by the upstream series (`2025-08-05T13:00`).
pub const HOUR_STAMP_FORMAT: &str = "%Y-%m-%dT%H:%M";

const ACCEPTED_FORMATS: [&str; 2] = [HOUR_STAMP_FORMAT, "%Y-%m-%dT%H:%M:%S"];

/// Parses an hour-truncated ISO-8601 local timestamp. Anything that is not on
/// a whole hour is rejected rather than rounded.
pub fn parse_hour_stamp(raw: &str) -> Result<NaiveDateTime, CoreError> {
    let raw = raw.trim();
    let parsed = ACCEPTED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| CoreError::Validation(format!("invalid timestamp '{raw}'")))?;

    if parsed.minute() != 0 || parsed.second() != 0 || parsed.nanosecond() != 0 {
        return Err(CoreError::Validation(format!(
            "timestamp '{raw}' is not aligned to the hour"
        )));
    }

    Ok(parsed)
}

pub fn format_hour_stamp(at: &NaiveDateTime) -> String {
    at.format(HOUR_STAMP_FORMAT).to_string()
}

/// Inclusive aggregation interval. Construction enforces `start <= end` and
/// hour alignment of both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, CoreError> {
        for at in [&start, &end] {
            if at.minute() != 0 || at.second() != 0 || at.nanosecond() != 0 {
                return Err(CoreError::Validation(format!(
                    "window bound {at} is not aligned to the hour"
                )));
            }
        }
        if start > end {
            return Err(CoreError::Validation(format!(
                "window start {} is after end {}",
                format_hour_stamp(&start),
                format_hour_stamp(&end)
            )));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, CoreError> {
        Self::new(parse_hour_stamp(start)?, parse_hour_stamp(end)?)
    }

    /// Builds a window from timeline slider offsets, counted in hours from `base`.
    pub fn from_hour_offsets(
        base: NaiveDateTime,
        start_hour: u32,
        end_hour: u32,
        max_hours: u32,
    ) -> Result<Self, CoreError> {
        if start_hour > max_hours || end_hour > max_hours {
            return Err(CoreError::Validation(format!(
                "timeline offsets {start_hour}..{end_hour} exceed {max_hours} hours"
            )));
        }
        Self::new(
            base + Duration::hours(i64::from(start_hour)),
            base + Duration::hours(i64::from(end_hour)),
        )
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end.date()
    }

    /// Hours between start and end.
    pub fn span_hours(&self) -> i64 {
        (self.end - self.start).num_hours()
    }

    /// Rejects windows spanning more than `max_hours`, the same range the
    /// timeline slider offers.
    pub fn limited_to(self, max_hours: u32) -> Result<Self, CoreError> {
        if self.span_hours() > i64::from(max_hours) {
            return Err(CoreError::Validation(format!(
                "window {} spans {} hours, more than {max_hours}",
                self,
                self.span_hours()
            )));
        }
        Ok(self)
    }

    pub fn hour_count(&self) -> usize {
        (self.span_hours() + 1) as usize
    }

    /// Every hour stamp in the window, both ends included, in ascending order.
    pub fn hour_stamps(&self) -> Vec<String> {
        let mut stamps = Vec::with_capacity(self.hour_count());
        let mut at = self.start;
        while at <= self.end {
            stamps.push(format_hour_stamp(&at));
            at += Duration::hours(1);
        }
        stamps
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}]",
            format_hour_stamp(&self.start),
            format_hour_stamp(&self.end)
        )
    }
}
