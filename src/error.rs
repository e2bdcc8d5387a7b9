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

//! Error types for event ingestion, balance queries and withdrawals.

use rust_decimal::Decimal;
use thiserror::Error;

/// Why an upstream event could not be normalized.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// Amount field is missing or blank
    #[error("missing amount")]
    MissingAmount,

    /// Amount does not parse as a decimal number
    #[error("non-numeric amount")]
    NonNumericAmount,

    /// Upstream amounts are magnitudes and must not be negative
    #[error("negative amount")]
    NegativeAmount,

    /// Amount has digits below the currency's minor unit
    #[error("amount finer than the currency's minor unit")]
    SubMinorUnit,

    /// Amount above [`MAX_AMOUNT`](crate::MAX_AMOUNT)
    #[error("amount above the per-event ceiling")]
    AmountTooLarge,
}

/// Errors raised while normalizing upstream events.
///
/// These are contained per event: one bad event never blocks the rest of a
/// batch from being ingested.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Bad upstream data; the event is dropped and counted
    #[error("malformed event: {0}")]
    MalformedEvent(MalformedReason),

    /// Upstream sent a kind the ledger does not know
    #[error("unknown event kind: {0:?}")]
    UnknownEventKind(String),
}

/// Errors returned by the withdrawal authorizer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalError {
    /// Amount is zero, negative, above the ceiling, or finer than the minor unit
    #[error("invalid amount (must be positive whole minor units)")]
    InvalidAmount,

    /// Withdrawal would take the till below zero
    #[error("insufficient balance: {requested} requested, {available} available")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    /// The event log moved between the balance check and the append
    #[error("concurrent write conflict")]
    ConcurrentWriteConflict,

    /// The writer lock was not acquired in time; nothing was committed
    #[error("timed out waiting to commit withdrawal")]
    Timeout,
}

/// Errors returned by balance and withdrawal-history queries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Custom range whose start is not before its end
    #[error("invalid range (start must be before end)")]
    InvalidRange,

    /// Window name not recognized
    #[error("unknown window: {0:?}")]
    UnknownWindow(String),
}

/// Errors raised while loading a [`LedgerConfig`](crate::LedgerConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// UTC offset outside what a real time zone can have
    #[error("invalid UTC offset: {0} minutes")]
    InvalidOffset(i32),
}
