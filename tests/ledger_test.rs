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

//! Ledger public API integration tests.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use till_ledger::{
    EventKind, FixedClock, Ledger, LedgerConfig, LedgerError, RawEvent, Window, WithdrawalError,
    WithdrawalRequest,
};

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, minute, 0).unwrap()
}

fn make_ledger(now: DateTime<Utc>) -> (Ledger, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(now));
    let ledger = Ledger::with_clock(LedgerConfig::default(), clock.clone()).unwrap();
    (ledger, clock)
}

fn make_raw(amount: &str, occurred_at: DateTime<Utc>) -> RawEvent {
    RawEvent {
        amount: Some(amount.to_string()),
        occurred_at,
        memo: None,
    }
}

fn closing(ledger: &Ledger, window: Window) -> Decimal {
    ledger.get_balance(window).unwrap().snapshot.closing_balance
}

#[test]
fn business_day_scenario() {
    let (ledger, clock) = make_ledger(at(1, 9, 0));
    ledger.ingest(&make_raw("500.00", at(1, 9, 0)), "sale").unwrap();
    ledger.ingest(&make_raw("50.00", at(1, 10, 0)), "expense").unwrap();

    clock.set(at(1, 11, 0));
    ledger
        .withdraw(WithdrawalRequest::new(dec!(100.00)).with_memo("Owner draw"))
        .unwrap();

    clock.set(at(1, 12, 0));
    let today = ledger.get_balance(Window::Today).unwrap();
    assert_eq!(today.snapshot.opening_balance, dec!(0));
    assert_eq!(today.snapshot.net_movement, dec!(350.00));
    assert_eq!(today.snapshot.closing_balance, dec!(350.00));
    assert_eq!(today.snapshot.event_count, 3);

    let withdrawals = ledger.list_withdrawals(None).unwrap();
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0].amount, dec!(100.00));
    assert_eq!(withdrawals[0].memo, "Owner draw");
    assert_eq!(withdrawals[0].occurred_at, at(1, 11, 0));
}

#[test]
fn withdrawal_of_exact_balance_leaves_zero() {
    let (ledger, _) = make_ledger(at(1, 12, 0));
    ledger.ingest(&make_raw("100.00", at(1, 9, 0)), "sale").unwrap();

    let receipt = ledger.withdraw(WithdrawalRequest::new(dec!(100.00))).unwrap();
    assert_eq!(receipt.closing_balance, dec!(0.00));
    assert_eq!(closing(&ledger, Window::AllTime), dec!(0.00));
}

#[test]
fn withdrawal_one_cent_over_balance_fails() {
    let (ledger, _) = make_ledger(at(1, 12, 0));
    ledger.ingest(&make_raw("100.00", at(1, 9, 0)), "sale").unwrap();

    let result = ledger.withdraw(WithdrawalRequest::new(dec!(100.01)));
    assert_eq!(
        result,
        Err(WithdrawalError::InsufficientBalance {
            available: dec!(100.00),
            requested: dec!(100.01),
        })
    );

    // Balance unchanged, nothing recorded
    assert_eq!(closing(&ledger, Window::AllTime), dec!(100.00));
    assert!(ledger.list_withdrawals(None).unwrap().is_empty());
}

#[test]
fn withdrawal_on_empty_till_fails() {
    let (ledger, _) = make_ledger(at(1, 12, 0));
    let result = ledger.withdraw(WithdrawalRequest::new(dec!(1.00)));
    assert!(matches!(
        result,
        Err(WithdrawalError::InsufficientBalance { .. })
    ));
    assert!(ledger.events().is_empty());
}

#[test]
fn receipt_balance_matches_queried_balance() {
    let (ledger, _) = make_ledger(at(1, 12, 0));
    ledger.ingest(&make_raw("80.00", at(1, 9, 0)), "sale").unwrap();

    let receipt = ledger.withdraw(WithdrawalRequest::new(dec!(30.00))).unwrap();
    assert_eq!(receipt.closing_balance, dec!(50.00));
    assert_eq!(closing(&ledger, Window::AllTime), receipt.closing_balance);
    assert_eq!(closing(&ledger, Window::Today), receipt.closing_balance);
}

#[test]
fn malformed_event_is_skipped_and_counted() {
    let (ledger, _) = make_ledger(at(1, 12, 0));
    ledger.ingest(&make_raw("200.00", at(1, 9, 0)), "sale").unwrap();
    assert!(ledger.ingest(&make_raw("abc", at(1, 9, 30)), "sale").is_err());
    ledger.ingest(&make_raw("20.00", at(1, 10, 0)), "damage").unwrap();

    let balance = ledger.get_balance(Window::AllTime).unwrap();
    assert_eq!(balance.snapshot.closing_balance, dec!(180.00));
    assert_eq!(balance.skipped_count, 1);
}

#[test]
fn unknown_kind_is_not_counted_as_skipped() {
    let (ledger, _) = make_ledger(at(1, 12, 0));
    let result = ledger.ingest(&make_raw("5.00", at(1, 9, 0)), "voucher");

    assert!(result.is_err());
    assert_eq!(ledger.skipped_count(), 0);
    assert!(ledger.events().is_empty());
}

#[test]
fn today_rolls_over_at_midnight() {
    let (ledger, clock) = make_ledger(at(1, 23, 59));
    ledger.ingest(&make_raw("40.00", at(1, 20, 0)), "sale").unwrap();

    let late = ledger.get_balance(Window::Today).unwrap();
    assert_eq!(late.snapshot.net_movement, dec!(40.00));

    clock.advance(TimeDelta::minutes(2));
    let early = ledger.get_balance(Window::Today).unwrap();
    assert_eq!(early.snapshot.window_start, Some(at(2, 0, 0)));
    assert_eq!(early.snapshot.opening_balance, dec!(40.00));
    assert_eq!(early.snapshot.net_movement, dec!(0));
    assert_eq!(early.snapshot.closing_balance, dec!(40.00));
}

#[test]
fn windows_agree_on_closing_balance() {
    // 2025-03-05 is a Wednesday; March 3rd starts the week.
    let (ledger, _) = make_ledger(at(5, 12, 0));
    ledger.ingest(&make_raw("100.00", at(1, 9, 0)), "sale").unwrap();
    ledger.ingest(&make_raw("50.00", at(4, 9, 0)), "sale").unwrap();
    ledger.ingest(&make_raw("10.00", at(5, 9, 0)), "expense").unwrap();

    let today = ledger.get_balance(Window::Today).unwrap().snapshot;
    let week = ledger.get_balance(Window::Week).unwrap().snapshot;
    let month = ledger.get_balance(Window::Month).unwrap().snapshot;

    assert_eq!(today.opening_balance, dec!(150.00));
    assert_eq!(today.net_movement, dec!(-10.00));
    assert_eq!(week.opening_balance, dec!(100.00));
    assert_eq!(week.net_movement, dec!(40.00));
    assert_eq!(month.opening_balance, dec!(0));
    assert_eq!(month.net_movement, dec!(140.00));

    for snapshot in [&today, &week, &month] {
        assert_eq!(snapshot.closing_balance, dec!(140.00));
        assert_eq!(
            snapshot.closing_balance,
            snapshot.opening_balance + snapshot.net_movement
        );
    }
}

#[test]
fn closed_range_is_stable_across_new_events() {
    let (ledger, _) = make_ledger(at(5, 12, 0));
    ledger.ingest(&make_raw("100.00", at(1, 9, 0)), "sale").unwrap();
    let range = Window::Range {
        start: at(1, 0, 0),
        end: at(2, 0, 0),
    };

    let first = ledger.get_balance(range).unwrap();
    ledger.ingest(&make_raw("30.00", at(5, 9, 0)), "sale").unwrap();
    ledger.withdraw(WithdrawalRequest::new(dec!(10.00))).unwrap();
    let second = ledger.get_balance(range).unwrap();

    assert_eq!(first, second);
    assert_eq!(second.snapshot.window_end, Some(at(2, 0, 0)));
}

#[test]
fn backdated_sale_reopens_closed_range() {
    let (ledger, _) = make_ledger(at(5, 12, 0));
    ledger.ingest(&make_raw("100.00", at(1, 9, 0)), "sale").unwrap();
    let range = Window::Range {
        start: at(1, 0, 0),
        end: at(2, 0, 0),
    };
    assert_eq!(closing(&ledger, range), dec!(100.00));

    // Sale recorded late for day 1
    ledger.ingest(&make_raw("25.00", at(1, 18, 0)), "sale").unwrap();
    assert_eq!(closing(&ledger, range), dec!(125.00));
    assert_eq!(closing(&ledger, Window::AllTime), dec!(125.00));
}

#[test]
fn repeated_queries_are_served_from_cache() {
    let (ledger, _) = make_ledger(at(1, 12, 0));
    ledger.ingest(&make_raw("10.00", at(1, 9, 0)), "sale").unwrap();

    for _ in 0..10 {
        closing(&ledger, Window::Today);
        closing(&ledger, Window::AllTime);
    }
    let stats = ledger.cache_stats();
    assert_eq!(stats.recomputes, 2);
    assert_eq!(stats.hits, 18);

    ledger.ingest(&make_raw("10.00", at(1, 10, 0)), "sale").unwrap();
    assert_eq!(closing(&ledger, Window::Today), dec!(20.00));
    assert_eq!(ledger.cache_stats().recomputes, 3);
}

#[test]
fn withdrawals_listed_newest_first_within_range() {
    let (ledger, clock) = make_ledger(at(1, 8, 0));
    ledger.ingest(&make_raw("1000.00", at(1, 8, 0)), "sale").unwrap();

    for (day, amount) in [(1, dec!(10.00)), (2, dec!(20.00)), (3, dec!(30.00))] {
        clock.set(at(day, 17, 0));
        ledger.withdraw(WithdrawalRequest::new(amount)).unwrap();
    }

    let all = ledger.list_withdrawals(None).unwrap();
    let amounts: Vec<_> = all.iter().map(|w| w.amount).collect();
    assert_eq!(amounts, vec![dec!(30.00), dec!(20.00), dec!(10.00)]);

    let today = ledger.list_withdrawals(Some(Window::Today)).unwrap();
    assert_eq!(today.len(), 1);
    assert_eq!(today[0].amount, dec!(30.00));

    let range = Window::Range {
        start: at(1, 0, 0),
        end: at(3, 0, 0),
    };
    let ranged = ledger.list_withdrawals(Some(range)).unwrap();
    assert_eq!(ranged.len(), 2);
    assert!(ranged[0].occurred_at > ranged[1].occurred_at);
}

#[test]
fn empty_range_is_rejected() {
    let (ledger, _) = make_ledger(at(1, 12, 0));
    let range = Window::Range {
        start: at(2, 0, 0),
        end: at(1, 0, 0),
    };
    assert_eq!(ledger.get_balance(range), Err(LedgerError::InvalidRange));
    assert_eq!(ledger.list_withdrawals(Some(range)), Err(LedgerError::InvalidRange));
}

#[test]
fn event_kinds_carry_their_sign() {
    let (ledger, _) = make_ledger(at(1, 12, 0));
    ledger.ingest(&make_raw("100.00", at(1, 9, 0)), "sale").unwrap();
    ledger.ingest(&make_raw("5.00", at(1, 9, 10)), "expense").unwrap();
    ledger.ingest(&make_raw("2.00", at(1, 9, 20)), "damage").unwrap();
    ledger.withdraw(WithdrawalRequest::new(dec!(3.00))).unwrap();

    let signs: Vec<_> = ledger
        .events()
        .iter()
        .map(|e| (e.kind(), e.amount()))
        .collect();
    assert_eq!(
        signs,
        vec![
            (EventKind::Sale, dec!(100.00)),
            (EventKind::Expense, dec!(-5.00)),
            (EventKind::Damage, dec!(-2.00)),
            (EventKind::Withdrawal, dec!(-3.00)),
        ]
    );
    assert_eq!(closing(&ledger, Window::AllTime), dec!(90.00));
}

#[test]
fn configured_offset_moves_local_midnight() {
    let config = LedgerConfig {
        utc_offset_minutes: -5 * 60,
        ..LedgerConfig::default()
    };
    // 03:00 UTC on the 2nd is still 22:00 on the 1st locally.
    let clock = Arc::new(FixedClock::new(at(2, 3, 0)));
    let ledger = Ledger::with_clock(config, clock).unwrap();
    ledger.ingest(&make_raw("10.00", at(1, 20, 0)), "sale").unwrap();

    let today = ledger.get_balance(Window::Today).unwrap().snapshot;
    assert_eq!(today.window_start, Some(at(1, 5, 0)));
    assert_eq!(today.net_movement, dec!(10.00));
}

#[test]
fn invalid_offset_is_rejected() {
    let config = LedgerConfig {
        utc_offset_minutes: 24 * 60,
        ..LedgerConfig::default()
    };
    assert!(Ledger::new(config).is_err());
}

#[test]
fn custom_range_queries_keep_cache_bounded() {
    let config = LedgerConfig {
        range_cache_slots: 16,
        ..LedgerConfig::default()
    };
    let clock = Arc::new(FixedClock::new(at(20, 12, 0)));
    let ledger = Ledger::with_clock(config, clock).unwrap();
    ledger.ingest(&make_raw("10.00", at(1, 9, 0)), "sale").unwrap();

    for n in 0..500 {
        let start = at(1, 0, 0) + TimeDelta::minutes(n);
        let range = Window::Range {
            start,
            end: start + TimeDelta::hours(12),
        };
        ledger.get_balance(range).unwrap();
    }
    assert_eq!(ledger.cache_stats().entries, 16);

    // Evicted ranges still answer correctly.
    let first = Window::Range {
        start: at(1, 0, 0),
        end: at(1, 12, 0),
    };
    assert_eq!(closing(&ledger, first), dec!(10.00));
}

#[test]
fn today_covers_the_whole_local_day() {
    let (ledger, _) = make_ledger(at(1, 12, 0));
    ledger.ingest(&make_raw("10.00", at(1, 9, 0)), "sale").unwrap();
    // Upstream reported a sale stamped later today than the ledger clock.
    ledger.ingest(&make_raw("5.00", at(1, 18, 0)), "sale").unwrap();

    let today = ledger.get_balance(Window::Today).unwrap().snapshot;
    assert_eq!(today.net_movement, dec!(15.00));
    assert_eq!(today.closing_balance, closing(&ledger, Window::AllTime));
}
