//! Canonical real-time arrival result.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::domain::{BilingualText, Operator};

/// Number of arrival lines every result carries.
pub const ETA_LINE_COUNT: usize = 3;

/// One arrival line: a countdown or a sentinel state.
///
/// The sentinels are distinct on purpose; "no more departures today",
/// "this is the end of the line", and "the typhoon timetable is in force"
/// render differently even though none of them has a countdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EtaLine {
    Countdown {
        minutes: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remark: Option<BilingualText>,
    },
    NoSchedule,
    EndOfLine,
    TyphoonSchedule,
    ConnectionError,
}

/// The normalized answer to one ETA query.
///
/// Immutable once built. Carries its fetch time; callers polling on a
/// schedule treat results older than [`EtaQueryResult::STALE_AFTER`] as
/// stale and re-query.
#[derive(Debug, Clone)]
pub struct EtaQueryResult {
    pub operator: Operator,
    /// Exactly [`ETA_LINE_COUNT`] lines, 1-based via [`Self::line`].
    pub lines: Vec<EtaLine>,
    pub is_connection_error: bool,
    fetched_at: Instant,
}

impl EtaQueryResult {
    /// Age beyond which callers should re-query.
    pub const STALE_AFTER: Duration = Duration::from_secs(30);

    /// Build a result from 1-based sequence entries, padding gaps with
    /// [`EtaLine::NoSchedule`].
    pub fn from_entries(operator: Operator, entries: BTreeMap<u8, EtaLine>) -> Self {
        let lines = (1..=ETA_LINE_COUNT as u8)
            .map(|seq| entries.get(&seq).cloned().unwrap_or(EtaLine::NoSchedule))
            .collect();
        Self {
            operator,
            lines,
            is_connection_error: false,
            fetched_at: Instant::now(),
        }
    }

    /// The result for a failed or timed-out upstream call.
    pub fn connection_error(operator: Operator) -> Self {
        let mut lines = vec![EtaLine::NoSchedule; ETA_LINE_COUNT];
        lines[0] = EtaLine::ConnectionError;
        Self {
            operator,
            lines,
            is_connection_error: true,
            fetched_at: Instant::now(),
        }
    }

    /// The line at a 1-based sequence number.
    pub fn line(&self, seq: usize) -> &EtaLine {
        &self.lines[seq - 1]
    }

    /// Minutes until the next arrival, when the first line is a countdown.
    pub fn next_countdown_minutes(&self) -> Option<i64> {
        match self.line(1) {
            EtaLine::Countdown { minutes, .. } => Some(*minutes),
            _ => None,
        }
    }

    /// How long ago this result was fetched.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// Whether callers should discard this result and re-query.
    pub fn is_outdated(&self) -> bool {
        self.age() > Self::STALE_AFTER
    }
}

impl PartialEq for EtaQueryResult {
    /// Equality ignores the fetch timestamp.
    fn eq(&self, other: &Self) -> bool {
        self.operator == other.operator
            && self.lines == other.lines
            && self.is_connection_error == other.is_connection_error
    }
}
