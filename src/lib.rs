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

//! # Till Ledger
//!
//! This library tracks a retail till's physical cash: sales coming in,
//! expenses, damage write-offs and withdrawals going out, and the balance
//! that results, queryable for today, this week, month or year, all time, or
//! any custom range.
//!
//! ## Core Components
//!
//! - [`Ledger`]: Ingests events, serves balances, authorizes withdrawals
//! - [`adapter`]: Normalizes upstream events into signed [`LedgerEvent`]s
//! - [`EventLog`]: Append-only event store ordered by occurrence
//! - [`aggregate()`]: Folds events into a [`BalanceSnapshot`] for a window
//! - [`BalanceCache`]: Per-window snapshot cache with lazy invalidation
//!
//! ## Example
//!
//! ```
//! use chrono::Utc;
//! use rust_decimal_macros::dec;
//! use till_ledger::{Ledger, RawEvent, Window, WithdrawalError, WithdrawalRequest};
//!
//! let ledger = Ledger::default();
//!
//! // Record a sale reported by the point of sale
//! let sale = RawEvent {
//!     amount: Some("100.00".into()),
//!     occurred_at: Utc::now(),
//!     memo: None,
//! };
//! ledger.ingest(&sale, "sale").unwrap();
//!
//! // Take some cash out
//! let receipt = ledger
//!     .withdraw(WithdrawalRequest::new(dec!(60.00)).with_memo("Supplier"))
//!     .unwrap();
//! assert_eq!(receipt.closing_balance, dec!(40.00));
//!
//! // The till never goes negative
//! let result = ledger.withdraw(WithdrawalRequest::new(dec!(60.00)));
//! assert!(matches!(result, Err(WithdrawalError::InsufficientBalance { .. })));
//!
//! let balance = ledger.get_balance(Window::AllTime).unwrap();
//! assert_eq!(balance.snapshot.closing_balance, dec!(40.00));
//! ```
//!
//! ## Thread Safety
//!
//! Balance queries run in parallel and share cached snapshots. Every append
//! goes through one writer lock per ledger, which is what makes the
//! withdrawal balance check and its append a single atomic step.

pub mod adapter;
mod aggregate;
mod base;
mod cache;
pub mod clock;
mod config;
pub mod error;
mod event;
mod event_log;
mod ledger;
mod window;

pub use adapter::{RawEvent, SourceKind};
pub use aggregate::{BalanceSnapshot, aggregate};
pub use base::{EventId, MAX_AMOUNT, MINOR_UNITS};
pub use cache::{BalanceCache, CacheStats};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::LedgerConfig;
pub use error::{ConfigError, EventError, LedgerError, MalformedReason, WithdrawalError};
pub use event::{EventKind, LedgerEvent, NewEvent};
pub use event_log::EventLog;
pub use ledger::{
    BalanceReport, IngestReport, Ledger, WithdrawalEntry, WithdrawalReceipt, WithdrawalRequest,
};
pub use window::{Calendar, ResolvedWindow, Window, WindowKey};
