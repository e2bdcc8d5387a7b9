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

//! Cash balance ledger.
//!
//! The [`Ledger`] is the central component: it ingests upstream events,
//! answers windowed balance queries through the [`BalanceCache`], and is the
//! only writer of withdrawal events.
//!
//! # Withdrawals
//!
//! [`Ledger::withdraw`] reads the all-time balance, rejects the request if it
//! would take the till below zero, and otherwise appends a withdrawal event.
//! The three steps run under the ledger's writer lock, the same lock every
//! append takes, so two withdrawals racing for the same cash can never both
//! succeed.
//!
//! # Thread Safety
//!
//! `Ledger` is `Send + Sync`; share it behind an [`Arc`]. Reads never take
//! the writer lock. Locks are per ledger, so separate tills never contend.

use crate::adapter::{RawEvent, normalize};
use crate::aggregate::{BalanceSnapshot, aggregate};
use crate::base::{EventId, fits_minor_units, within_ceiling};
use crate::cache::{BalanceCache, CacheStats};
use crate::clock::{Clock, SystemClock};
use crate::config::LedgerConfig;
use crate::error::{ConfigError, EventError, LedgerError, WithdrawalError};
use crate::event::{EventKind, LedgerEvent, NewEvent};
use crate::event_log::EventLog;
use crate::window::{Calendar, ResolvedWindow, Window, WindowKey};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

/// A request to take cash out of the till.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    /// Must be positive and in whole minor units.
    pub amount: Decimal,
    /// Reason for the withdrawal; a placeholder is used when absent or blank.
    pub memo: Option<String>,
}

impl WithdrawalRequest {
    pub fn new(amount: Decimal) -> Self {
        Self { amount, memo: None }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }
}

/// A committed withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WithdrawalReceipt {
    pub event: LedgerEvent,
    /// All-time balance immediately after the commit.
    pub closing_balance: Decimal,
}

/// One row of the withdrawal history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WithdrawalEntry {
    pub id: EventId,
    /// Amount taken out, as a positive magnitude.
    pub amount: Decimal,
    pub memo: String,
    pub occurred_at: DateTime<Utc>,
}

impl From<&LedgerEvent> for WithdrawalEntry {
    fn from(event: &LedgerEvent) -> Self {
        Self {
            id: event.id(),
            amount: event.amount().abs(),
            memo: event.memo().unwrap_or_default().to_string(),
            occurred_at: event.occurred_at(),
        }
    }
}

/// Balance for a window plus how many malformed upstream events were dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceReport {
    #[serde(flatten)]
    pub snapshot: BalanceSnapshot,
    pub skipped_count: u64,
}

/// Outcome of [`Ledger::ingest_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub skipped_malformed: usize,
    /// Kind tags that were not recognized, in arrival order.
    pub unknown_kinds: Vec<String>,
}

/// Cash balance ledger for a single till.
///
/// # Invariants
///
/// - Events are append-only; ids are assigned in append order.
/// - The all-time balance never goes negative because of a withdrawal.
/// - Every append invalidates the cached windows it can affect before the
///   writer lock is released.
#[derive(Debug)]
pub struct Ledger {
    log: EventLog,
    cache: BalanceCache,
    /// Serializes every append, and the check-then-append of withdrawals.
    writer: Mutex<()>,
    skipped: AtomicU64,
    calendar: Calendar,
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    /// Creates an empty ledger that reads the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOffset`] for an impossible UTC offset.
    pub fn new(config: LedgerConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an empty ledger that reads time from `clock`.
    pub fn with_clock(config: LedgerConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let calendar = config.calendar()?;
        Ok(Self::from_parts(config, calendar, clock))
    }

    fn from_parts(config: LedgerConfig, calendar: Calendar, clock: Arc<dyn Clock>) -> Self {
        Self {
            log: EventLog::new(),
            cache: BalanceCache::with_range_capacity(config.range_cache_slots),
            writer: Mutex::new(()),
            skipped: AtomicU64::new(0),
            calendar,
            config,
            clock,
        }
    }

    /// Normalizes and appends one upstream event.
    ///
    /// # Errors
    ///
    /// - [`EventError::MalformedEvent`] - the event is dropped and counted in
    ///   [`Ledger::skipped_count`].
    /// - [`EventError::UnknownEventKind`] - the event is dropped and logged as
    ///   an error.
    pub fn ingest(&self, raw: &RawEvent, source_kind: &str) -> Result<LedgerEvent, EventError> {
        let draft = match normalize(raw, source_kind) {
            Ok(draft) => draft,
            Err(EventError::MalformedEvent(reason)) => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                warn!(kind = source_kind, %reason, "dropping malformed upstream event");
                return Err(EventError::MalformedEvent(reason));
            }
            Err(err) => {
                error!(kind = source_kind, "upstream sent an unknown event kind");
                return Err(err);
            }
        };

        let _writer = self.writer.lock();
        let event = self.commit(draft);
        Ok(event)
    }

    /// Ingests a batch of `(source_kind, event)` pairs.
    ///
    /// Bad events are contained: each is reported and the rest still land.
    pub fn ingest_batch<I, S>(&self, events: I) -> IngestReport
    where
        I: IntoIterator<Item = (S, RawEvent)>,
        S: AsRef<str>,
    {
        let mut report = IngestReport::default();
        for (source_kind, raw) in events {
            match self.ingest(&raw, source_kind.as_ref()) {
                Ok(_) => report.accepted += 1,
                Err(EventError::MalformedEvent(_)) => report.skipped_malformed += 1,
                Err(EventError::UnknownEventKind(kind)) => report.unknown_kinds.push(kind),
            }
        }
        report
    }

    /// Returns the balance for `window`, served from the cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRange`] for an empty custom range.
    pub fn get_balance(&self, window: Window) -> Result<BalanceReport, LedgerError> {
        let resolved = window.resolve(self.clock.now(), &self.calendar)?;
        Ok(BalanceReport {
            snapshot: self.snapshot(&resolved),
            skipped_count: self.skipped_count(),
        })
    }

    /// Lists withdrawals, newest first, optionally limited to a window.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRange`] for an empty custom range.
    pub fn list_withdrawals(
        &self,
        range: Option<Window>,
    ) -> Result<Vec<WithdrawalEntry>, LedgerError> {
        let now = self.clock.now();
        let range = range
            .map(|window| window.resolve(now, &self.calendar))
            .transpose()?;

        Ok(self.log.read(|events, _| {
            events
                .iter()
                .rev()
                .filter(|e| e.kind() == EventKind::Withdrawal)
                .filter(|e| range.is_none_or(|w| w.contains(e.occurred_at())))
                .map(|e| WithdrawalEntry::from(&**e))
                .collect()
        }))
    }

    /// Withdraws cash, waiting up to the configured timeout for the writer lock.
    pub fn withdraw(&self, request: WithdrawalRequest) -> Result<WithdrawalReceipt, WithdrawalError> {
        self.withdraw_within(request, self.config.withdrawal_timeout())
    }

    /// Withdraws cash, waiting at most `timeout` for the writer lock.
    ///
    /// A timeout is reported before anything is appended. Once this returns
    /// `Ok` the event stands; callers that lose the receipt should re-query the
    /// balance instead of retrying.
    ///
    /// # Errors
    ///
    /// - [`WithdrawalError::InvalidAmount`] - amount not positive, above
    ///   [`MAX_AMOUNT`](crate::MAX_AMOUNT), or finer than a cent.
    /// - [`WithdrawalError::InsufficientBalance`] - the till would go negative.
    /// - [`WithdrawalError::Timeout`] - the writer lock was busy for too long.
    /// - [`WithdrawalError::ConcurrentWriteConflict`] - the log moved twice
    ///   between check and append.
    pub fn withdraw_within(
        &self,
        request: WithdrawalRequest,
        timeout: Duration,
    ) -> Result<WithdrawalReceipt, WithdrawalError> {
        let amount = request.amount;
        if amount <= Decimal::ZERO || !within_ceiling(amount) || !fits_minor_units(amount) {
            return Err(WithdrawalError::InvalidAmount);
        }
        let memo = request
            .memo
            .as_deref()
            .map(str::trim)
            .filter(|memo| !memo.is_empty())
            .unwrap_or(self.config.default_withdrawal_memo.as_str())
            .to_string();

        let Some(_writer) = self.writer.try_lock_for(timeout) else {
            warn!(%amount, ?timeout, "withdrawal timed out waiting for the writer lock");
            return Err(WithdrawalError::Timeout);
        };

        let all_time = ResolvedWindow::all_time();
        let mut retried = false;
        loop {
            let balance = self.snapshot(&all_time);
            let available = balance.closing_balance;
            let Some(closing_balance) = available
                .checked_sub(amount)
                .filter(|remaining| *remaining >= Decimal::ZERO)
            else {
                info!(%amount, %available, "withdrawal rejected: insufficient balance");
                return Err(WithdrawalError::InsufficientBalance {
                    available,
                    requested: amount,
                });
            };

            let draft = NewEvent {
                kind: EventKind::Withdrawal,
                amount: -amount,
                occurred_at: self.clock.now(),
                memo: Some(memo.clone()),
            };
            match self.log.append_after(balance.as_of_event_id, draft) {
                Ok(event) => {
                    self.cache.on_event(&event);
                    info!(
                        event_id = %event.id(),
                        %amount,
                        closing = %closing_balance,
                        "withdrawal committed"
                    );
                    return Ok(WithdrawalReceipt {
                        event: LedgerEvent::clone(&event),
                        closing_balance,
                    });
                }
                Err(WithdrawalError::ConcurrentWriteConflict) if !retried => {
                    warn!(%amount, "event log moved during withdrawal; re-checking once");
                    self.cache.invalidate(&WindowKey::AllTime);
                    retried = true;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Number of malformed upstream events dropped so far.
    pub fn skipped_count(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// All events in `(occurred_at, id)` order.
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.log
            .read(|events, _| events.iter().map(|e| LedgerEvent::clone(e)).collect())
    }

    pub fn event(&self, id: EventId) -> Option<LedgerEvent> {
        self.log.get(id).map(|e| LedgerEvent::clone(&e))
    }

    /// Discards every cached snapshot; the next queries recompute from the log.
    pub fn rebuild_cache(&self) {
        self.cache.invalidate_all();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Appends under the writer lock held by the caller.
    fn commit(&self, draft: NewEvent) -> LedgerEvent {
        let event = self.log.append(draft);
        self.cache.on_event(&event);
        info!(
            event_id = %event.id(),
            kind = %event.kind(),
            amount = %event.amount(),
            "event appended"
        );
        LedgerEvent::clone(&event)
    }

    fn snapshot(&self, window: &ResolvedWindow) -> BalanceSnapshot {
        self.cache
            .get(window, |w| self.log.read(|events, _| aggregate(events, w)))
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::from_parts(
            LedgerConfig::default(),
            Calendar::default(),
            Arc::new(SystemClock),
        )
    }
}
