// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Time windows for balance aggregation.
//!
//! A [`Window`] is what callers ask for ("today", "this month", a custom
//! range). Resolving it against the current time and the till's
//! [`Calendar`] yields a [`ResolvedWindow`] with concrete UTC bounds and a
//! [`WindowKey`] that identifies it in the balance cache.
//!
//! Calendar windows are keyed by the local date they start on, never by a
//! duration, so a "today" snapshot taken at 23:59 is a different cache entry
//! from the one asked for at 00:01 the next day.

use crate::error::LedgerError;
use chrono::{
    DateTime, Datelike, Days, FixedOffset, Months, NaiveDate, NaiveTime, Offset, TimeDelta, Utc,
    Weekday,
};
use std::fmt;
use std::str::FromStr;

/// Local-time rules of the till: its UTC offset and the day a week starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    offset: FixedOffset,
    week_start: Weekday,
}

impl Calendar {
    pub fn new(offset: FixedOffset, week_start: Weekday) -> Self {
        Self { offset, week_start }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn week_start(&self) -> Weekday {
        self.week_start
    }

    /// Local calendar date of an instant.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// UTC instant of local midnight starting `date`.
    pub fn start_of(&self, date: NaiveDate) -> DateTime<Utc> {
        let local = date.and_time(NaiveTime::MIN);
        let utc = local - TimeDelta::seconds(i64::from(self.offset.local_minus_utc()));
        DateTime::from_naive_utc_and_offset(utc, Utc)
    }

    fn week_of(&self, date: NaiveDate) -> NaiveDate {
        let back = (7 + date.weekday().num_days_from_monday()
            - self.week_start.num_days_from_monday())
            % 7;
        date - Days::new(u64::from(back))
    }
}

impl Default for Calendar {
    fn default() -> Self {
        Self::new(Utc.fix(), Weekday::Mon)
    }
}

/// A window requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Today,
    Week,
    Month,
    Year,
    AllTime,
    /// Custom `[start, end)` range.
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl Window {
    /// Resolves the window against `now` in the till's local calendar.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRange`] for a custom range whose start is
    /// not before its end.
    pub fn resolve(
        &self,
        now: DateTime<Utc>,
        calendar: &Calendar,
    ) -> Result<ResolvedWindow, LedgerError> {
        let today = calendar.local_date(now);

        let (key, start, end) = match *self {
            Self::Today => (WindowKey::Today(today), today, today + Days::new(1)),
            Self::Week => {
                let first = calendar.week_of(today);
                (WindowKey::Week(first), first, first + Days::new(7))
            }
            Self::Month => {
                let first = today - Days::new(u64::from(today.day0()));
                (
                    WindowKey::Month(first.year(), first.month()),
                    first,
                    first + Months::new(1),
                )
            }
            Self::Year => {
                let first = today - Days::new(u64::from(today.ordinal0()));
                (WindowKey::Year(first.year()), first, first + Months::new(12))
            }
            Self::AllTime => return Ok(ResolvedWindow::all_time()),
            Self::Range { start, end } => {
                if start >= end {
                    return Err(LedgerError::InvalidRange);
                }
                return Ok(ResolvedWindow {
                    key: WindowKey::Range(start, end),
                    start: Some(start),
                    end: Some(end),
                });
            }
        };

        Ok(ResolvedWindow {
            key,
            start: Some(calendar.start_of(start)),
            end: Some(calendar.start_of(end)),
        })
    }
}

impl FromStr for Window {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "today" => Ok(Self::Today),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "all-time" | "alltime" | "all" => Ok(Self::AllTime),
            other => Err(LedgerError::UnknownWindow(other.to_string())),
        }
    }
}

/// Cache identity of a resolved window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKey {
    /// Local date of the day.
    Today(NaiveDate),
    /// Local date the week starts on.
    Week(NaiveDate),
    Month(i32, u32),
    Year(i32),
    AllTime,
    Range(DateTime<Utc>, DateTime<Utc>),
}

impl WindowKey {
    /// Calendar windows roll over as time advances; their keys go out of date.
    pub fn is_rolling(&self) -> bool {
        matches!(
            self,
            Self::Today(_) | Self::Week(_) | Self::Month(..) | Self::Year(_)
        )
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Today(date) => write!(f, "today:{date}"),
            Self::Week(date) => write!(f, "week:{date}"),
            Self::Month(year, month) => write!(f, "month:{year}-{month:02}"),
            Self::Year(year) => write!(f, "year:{year}"),
            Self::AllTime => f.write_str("all-time"),
            Self::Range(start, end) => write!(f, "range:{start}..{end}"),
        }
    }
}

/// A window with concrete bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedWindow {
    pub key: WindowKey,
    /// Inclusive lower bound; `None` means no lower bound.
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound; `None` means no upper bound.
    pub end: Option<DateTime<Utc>>,
}

impl ResolvedWindow {
    pub const fn all_time() -> Self {
        Self {
            key: WindowKey::AllTime,
            start: None,
            end: None,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| at >= start) && self.end.is_none_or(|end| at < end)
    }

    /// Whether an event at `at` changes this window's snapshot.
    ///
    /// Events before the start still move the opening balance, so only the
    /// end bound matters.
    pub fn affected_by(&self, at: DateTime<Utc>) -> bool {
        self.end.is_none_or(|end| at < end)
    }

    /// End bound as reported to callers: open while the window is in progress.
    pub fn reported_end(&self) -> Option<DateTime<Utc>> {
        if self.key.is_rolling() { None } else { self.end }
    }
}
