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

//! Property-based tests for the cash ledger.
//!
//! These tests verify invariants that should hold for any sequence of
//! upstream events and withdrawals.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use till_ledger::{
    FixedClock, Ledger, LedgerConfig, RawEvent, Window, WithdrawalError, WithdrawalRequest,
    aggregate,
};

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a positive amount (0.01 to 1000.00, whole cents).
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=100_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn arb_kind() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("sale"), Just("sale"), Just("expense"), Just("damage")]
}

/// Minutes after the start of the test period, spread over two weeks.
fn arb_offset() -> impl Strategy<Value = i64> {
    0i64..(14 * 24 * 60)
}

fn arb_event() -> impl Strategy<Value = (&'static str, Decimal, i64)> {
    (arb_kind(), arb_amount(), arb_offset())
}

fn arb_window() -> impl Strategy<Value = Window> {
    prop_oneof![
        Just(Window::Today),
        Just(Window::Week),
        Just(Window::Month),
        Just(Window::Year),
        Just(Window::AllTime),
        (arb_offset(), 1i64..(7 * 24 * 60)).prop_map(|(start, len)| Window::Range {
            start: minute(start),
            end: minute(start + len),
        }),
    ]
}

// =============================================================================
// Helpers
// =============================================================================

fn minute(offset: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap() + TimeDelta::minutes(offset)
}

/// A ledger whose clock sits after every generated event.
fn make_ledger() -> Ledger {
    let clock = Arc::new(FixedClock::new(minute(15 * 24 * 60)));
    Ledger::with_clock(LedgerConfig::default(), clock).unwrap()
}

fn make_raw(amount: Decimal, offset: i64) -> RawEvent {
    RawEvent {
        amount: Some(amount.to_string()),
        occurred_at: minute(offset),
        memo: None,
    }
}

fn ingest_all(ledger: &Ledger, events: &[(&str, Decimal, i64)]) {
    for (kind, amount, offset) in events {
        ledger.ingest(&make_raw(*amount, *offset), kind).unwrap();
    }
}

fn closing(ledger: &Ledger, window: Window) -> Decimal {
    ledger.get_balance(window).unwrap().snapshot.closing_balance
}

// =============================================================================
// Aggregation Invariants
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Closing balance always equals opening balance plus net movement.
    #[test]
    fn closing_equals_opening_plus_net(
        events in prop::collection::vec(arb_event(), 0..40),
        window in arb_window(),
    ) {
        let ledger = make_ledger();
        ingest_all(&ledger, &events);

        let snapshot = ledger.get_balance(window).unwrap().snapshot;
        prop_assert_eq!(
            snapshot.closing_balance,
            snapshot.opening_balance + snapshot.net_movement
        );
    }

    /// All-time closing balance is the signed sum of every event.
    #[test]
    fn all_time_is_signed_sum(
        events in prop::collection::vec(arb_event(), 0..40),
    ) {
        let ledger = make_ledger();
        ingest_all(&ledger, &events);

        let expected: Decimal = events
            .iter()
            .map(|(kind, amount, _)| if *kind == "sale" { *amount } else { -*amount })
            .sum();
        prop_assert_eq!(closing(&ledger, Window::AllTime), expected);
    }

    /// Arrival order does not change any balance.
    #[test]
    fn arrival_order_independent(
        events in prop::collection::vec(arb_event(), 1..30),
        window in arb_window(),
    ) {
        let forward = make_ledger();
        ingest_all(&forward, &events);

        let mut reversed_events = events.clone();
        reversed_events.reverse();
        let reversed = make_ledger();
        ingest_all(&reversed, &reversed_events);

        let a = forward.get_balance(window).unwrap().snapshot;
        let b = reversed.get_balance(window).unwrap().snapshot;
        prop_assert_eq!(a.opening_balance, b.opening_balance);
        prop_assert_eq!(a.net_movement, b.net_movement);
        prop_assert_eq!(a.event_count, b.event_count);
    }

    /// Rolling windows ending now agree with all-time on the closing balance.
    #[test]
    fn rolling_windows_close_at_all_time_balance(
        events in prop::collection::vec(arb_event(), 0..30),
    ) {
        let ledger = make_ledger();
        ingest_all(&ledger, &events);

        let all_time = closing(&ledger, Window::AllTime);
        for window in [Window::Today, Window::Week, Window::Month, Window::Year] {
            prop_assert_eq!(closing(&ledger, window), all_time);
        }
    }
}

// =============================================================================
// Cache Invariants
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// A cached answer always equals a fresh aggregation over the log,
    /// however queries and (possibly backdated) events interleave.
    #[test]
    fn cached_balance_matches_direct_aggregate(
        steps in prop::collection::vec((arb_event(), arb_window()), 1..30),
    ) {
        let ledger = make_ledger();
        let now = minute(15 * 24 * 60);

        for ((kind, amount, offset), window) in steps {
            let cached = ledger.get_balance(window).unwrap().snapshot;
            let resolved = window.resolve(now, ledger.calendar()).unwrap();
            let direct = aggregate(ledger.events().as_slice(), &resolved);
            prop_assert_eq!(cached, direct);

            ledger.ingest(&make_raw(amount, offset), kind).unwrap();
        }
    }

    /// Repeating a query without new events is served from the cache.
    #[test]
    fn repeated_query_is_a_hit(
        events in prop::collection::vec(arb_event(), 0..20),
        window in arb_window(),
    ) {
        let ledger = make_ledger();
        ingest_all(&ledger, &events);

        let first = ledger.get_balance(window).unwrap();
        let recomputes = ledger.cache_stats().recomputes;
        let second = ledger.get_balance(window).unwrap();

        prop_assert_eq!(first, second);
        prop_assert_eq!(ledger.cache_stats().recomputes, recomputes);
    }
}

// =============================================================================
// Withdrawal Invariants
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// With only sales and withdrawals, the till never goes negative and a
    /// withdrawal succeeds exactly when the cash is there.
    #[test]
    fn withdrawals_never_overdraw(
        sales in prop::collection::vec(arb_amount(), 0..10),
        withdrawals in prop::collection::vec(arb_amount(), 1..15),
    ) {
        let ledger = make_ledger();
        for (i, amount) in sales.iter().enumerate() {
            ledger.ingest(&make_raw(*amount, i as i64), "sale").unwrap();
        }

        let mut expected: Decimal = sales.iter().copied().sum();
        for amount in withdrawals {
            match ledger.withdraw(WithdrawalRequest::new(amount)) {
                Ok(receipt) => {
                    prop_assert!(amount <= expected);
                    expected -= amount;
                    prop_assert_eq!(receipt.closing_balance, expected);
                }
                Err(WithdrawalError::InsufficientBalance { available, requested }) => {
                    prop_assert!(amount > expected);
                    prop_assert_eq!(available, expected);
                    prop_assert_eq!(requested, amount);
                }
                Err(err) => prop_assert!(false, "unexpected error: {}", err),
            }
            prop_assert!(closing(&ledger, Window::AllTime) >= Decimal::ZERO);
        }

        prop_assert_eq!(closing(&ledger, Window::AllTime), expected);
    }

    /// Withdrawal history lists exactly the committed amounts, newest first.
    #[test]
    fn withdrawal_history_matches_commits(
        sale in arb_amount(),
        withdrawals in prop::collection::vec(arb_amount(), 1..10),
    ) {
        let ledger = make_ledger();
        ledger.ingest(&make_raw(sale, 0), "sale").unwrap();

        let mut committed = Vec::new();
        for amount in withdrawals {
            if ledger.withdraw(WithdrawalRequest::new(amount)).is_ok() {
                committed.push(amount);
            }
        }
        committed.reverse();

        let listed: Vec<_> = ledger
            .list_withdrawals(None)
            .unwrap()
            .into_iter()
            .map(|w| w.amount)
            .collect();
        prop_assert_eq!(listed, committed);
    }
}
