// src/temporal.rs
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Half-open date interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl TimeWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start >= end {
            return Err(Error::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Window spanning `[event + start_offset, event + end_offset)` days.
    pub fn around(event: NaiveDate, start_offset: i64, end_offset: i64) -> Result<Self> {
        Self::new(
            event + Duration::days(start_offset),
            event + Duration::days(end_offset),
        )
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// A capture timestamp falls in the window when its UTC calendar day does.
    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        self.contains_date(timestamp.date_naive())
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Which side of the event a composite describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Epoch {
    Pre,
    Post,
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Epoch::Pre => f.write_str("pre-event"),
            Epoch::Post => f.write_str("post-event"),
        }
    }
}

/// Pre- and post-event windows derived from one reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWindows {
    pub event: NaiveDate,
    pub pre: TimeWindow,
    pub post: TimeWindow,
}

impl EventWindows {
    pub fn around(event: NaiveDate, pre_offsets: (i64, i64), post_offsets: (i64, i64)) -> Result<Self> {
        Ok(Self {
            event,
            pre: TimeWindow::around(event, pre_offsets.0, pre_offsets.1)?,
            post: TimeWindow::around(event, post_offsets.0, post_offsets.1)?,
        })
    }

    /// Ten days either side of the event, the day before excluded from the pre window.
    pub fn standard(event: NaiveDate) -> Result<Self> {
        Self::around(event, (-10, -1), (0, 10))
    }

    pub fn window(&self, epoch: Epoch) -> TimeWindow {
        match epoch {
            Epoch::Pre => self.pre,
            Epoch::Post => self.post,
        }
    }
}
