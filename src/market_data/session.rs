// =============================================================================
// Trading sessions & time source
// =============================================================================
//
// A session is a fixed daily window anchored in a deployment-specific local
// timezone, e.g. 08:00 -> 07:45 the next day at UTC+7.  Both bounds refer to
// candle OPEN times and are inclusive, so the 07:45 candle (closing at 08:00)
// is the last bar of the session.
//
// The wall clock is only consulted to decide which session is "current";
// everything else is derived from candle timestamps.
// =============================================================================

use std::ops::Range;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::candle::Candle;

const MS_IN_D: i64 = 24 * 60 * 60 * 1000;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of "now" in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A frozen clock, for reproducible runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Session configuration
// ---------------------------------------------------------------------------

fn default_utc_offset_minutes() -> i32 {
    7 * 60
}

fn default_session_start() -> String {
    "08:00".to_string()
}

fn default_session_end() -> String {
    "07:45".to_string()
}

/// Serialisable session definition (part of the runtime config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Offset of the trading timezone from UTC, in minutes.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,

    /// Local open time of the first candle in a session, `HH:MM`.
    #[serde(default = "default_session_start")]
    pub start: String,

    /// Local open time of the last candle in a session, `HH:MM`. When not
    /// after `start`, the session ends on the following day.
    #[serde(default = "default_session_end")]
    pub end: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: default_utc_offset_minutes(),
            start: default_session_start(),
            end: default_session_end(),
        }
    }
}

impl SessionConfig {
    /// Parse into a ready-to-use schedule.
    pub fn schedule(&self) -> Result<SessionSchedule> {
        let offset = self
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .with_context(|| format!("invalid UTC offset: {} minutes", self.utc_offset_minutes))?;
        let start = NaiveTime::parse_from_str(&self.start, "%H:%M")
            .with_context(|| format!("invalid session start time '{}'", self.start))?;
        let end = NaiveTime::parse_from_str(&self.end, "%H:%M")
            .with_context(|| format!("invalid session end time '{}'", self.end))?;

        let mut span = end - start;
        if span <= Duration::zero() {
            span += Duration::days(1);
        }

        Ok(SessionSchedule {
            offset,
            start,
            span_ms: span.num_milliseconds(),
        })
    }
}

// ---------------------------------------------------------------------------
// Schedule & windows
// ---------------------------------------------------------------------------

/// Parsed session definition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSchedule {
    offset: FixedOffset,
    start: NaiveTime,
    span_ms: i64,
}

/// Inclusive range of candle open times belonging to one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl SessionSchedule {
    /// The session that started most recently at or before `now_ms`.
    ///
    /// Returns `None` only when `now_ms` is outside chrono's representable
    /// range.
    pub fn window_at(&self, now_ms: i64) -> Option<SessionWindow> {
        let local = DateTime::<Utc>::from_timestamp_millis(now_ms)?.with_timezone(&self.offset);
        let mut date = local.date_naive();
        if local.time() < self.start {
            date = date.pred_opt()?;
        }
        let start = self
            .offset
            .from_local_datetime(&date.and_time(self.start))
            .single()?
            .timestamp_millis();
        Some(SessionWindow {
            start_ms: start,
            end_ms: start + self.span_ms,
        })
    }
}

impl SessionWindow {
    /// The same window one day earlier.
    pub fn previous(&self) -> Self {
        Self {
            start_ms: self.start_ms - MS_IN_D,
            end_ms: self.end_ms - MS_IN_D,
        }
    }

    /// Index range of `candles` (oldest-first) whose open time falls inside
    /// this window. May be empty.
    pub fn slice_indices(&self, candles: &[Candle]) -> Range<usize> {
        let lo = candles.partition_point(|c| c.timestamp < self.start_ms);
        let hi = candles.partition_point(|c| c.timestamp <= self.end_ms);
        lo..hi.max(lo)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
