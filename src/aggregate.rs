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

//! Period aggregation.
//!
//! Folds an ordered run of events into a [`BalanceSnapshot`] for one window:
//! everything before the window's start makes up the opening balance (the
//! closing balance of the preceding period, zero at the epoch), everything
//! inside `[start, end)` is the net movement, and later events are ignored.
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use rust_decimal_macros::dec;
//! use till_ledger::{aggregate, Calendar, EventLog, EventKind, NewEvent, Window};
//!
//! let log = EventLog::new();
//! log.append(NewEvent {
//!     kind: EventKind::Sale,
//!     amount: dec!(500.00),
//!     occurred_at: Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
//!     memo: None,
//! });
//!
//! let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
//! let window = Window::Today.resolve(now, &Calendar::default()).unwrap();
//! let snapshot = log.read(|events, _| aggregate(events, &window));
//! assert_eq!(snapshot.closing_balance, dec!(500.00));
//! ```

use crate::base::EventId;
use crate::event::LedgerEvent;
use crate::window::ResolvedWindow;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::borrow::Borrow;
use tracing::error;

/// Derived balance for one window.
///
/// `closing_balance` equals `opening_balance + net_movement`, saturating at
/// the limits of `Decimal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    /// Inclusive start; `None` for all-time.
    pub window_start: Option<DateTime<Utc>>,
    /// Exclusive end; `None` while the window is still in progress.
    pub window_end: Option<DateTime<Utc>>,
    pub opening_balance: Decimal,
    pub net_movement: Decimal,
    pub closing_balance: Decimal,
    /// Highest event id folded into this snapshot.
    pub as_of_event_id: Option<EventId>,
    /// Number of events inside the window.
    pub event_count: usize,
}

/// Aggregates `events` over `window`.
///
/// `events` must be sorted by [`LedgerEvent::position`], which is how the
/// [`EventLog`](crate::EventLog) hands them out.
pub fn aggregate<E>(events: &[E], window: &ResolvedWindow) -> BalanceSnapshot
where
    E: Borrow<LedgerEvent>,
{
    debug_assert!(
        events
            .windows(2)
            .all(|pair| pair[0].borrow().position() <= pair[1].borrow().position()),
        "events must be ordered by (occurred_at, id)"
    );

    let first = window.start.map_or(0, |start| {
        events.partition_point(|e| e.borrow().occurred_at() < start)
    });
    let last = window.end.map_or(events.len(), |end| {
        events.partition_point(|e| e.borrow().occurred_at() < end)
    });
    // A start past every event still leaves `first <= last`.
    let first = first.min(last);

    let (before, inside) = events[..last].split_at(first);

    let opening_balance = total(before);
    let net_movement = total(inside);
    let as_of_event_id = events[..last].iter().map(|e| e.borrow().id()).max();

    BalanceSnapshot {
        window_start: window.start,
        window_end: window.reported_end(),
        opening_balance,
        net_movement,
        closing_balance: opening_balance.saturating_add(net_movement),
        as_of_event_id,
        event_count: inside.len(),
    }
}

/// Sums signed amounts without ever panicking.
///
/// Adapter ceilings keep real histories far from `Decimal`'s range; should a
/// sum still overflow, it saturates and the overflow is logged.
fn total<E: Borrow<LedgerEvent>>(events: &[E]) -> Decimal {
    events
        .iter()
        .try_fold(Decimal::ZERO, |sum, e| sum.checked_add(e.borrow().amount()))
        .unwrap_or_else(|| {
            error!(events = events.len(), "balance sum overflowed; saturating");
            events
                .iter()
                .fold(Decimal::ZERO, |sum, e| sum.saturating_add(e.borrow().amount()))
        })
}
