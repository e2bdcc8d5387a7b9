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

//! Event source adapter.
//!
//! Upstream subsystems (sales, expenses, damage write-offs) hand the ledger a
//! minimal event shape plus a tag naming the producing subsystem. The adapter
//! turns that into a canonical [`NewEvent`], applying the sign convention so
//! the rest of the ledger only ever sees signed amounts.
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use rust_decimal_macros::dec;
//! use till_ledger::adapter::{normalize, RawEvent};
//!
//! let raw = RawEvent {
//!     amount: Some("50.00".into()),
//!     occurred_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
//!     memo: Some("Cleaning supplies".into()),
//! };
//! let event = normalize(&raw, "expense").unwrap();
//! assert_eq!(event.amount, dec!(-50.00));
//! ```

use crate::base::{fits_minor_units, within_ceiling};
use crate::error::{EventError, MalformedReason};
use crate::event::{EventKind, NewEvent};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// Subsystems allowed to feed events into the ledger.
///
/// Withdrawals are deliberately absent: only the authorizer creates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Sale,
    Expense,
    Damage,
}

impl SourceKind {
    pub fn event_kind(self) -> EventKind {
        match self {
            Self::Sale => EventKind::Sale,
            Self::Expense => EventKind::Expense,
            Self::Damage => EventKind::Damage,
        }
    }
}

impl FromStr for SourceKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sale" => Ok(Self::Sale),
            "expense" => Ok(Self::Expense),
            "damage" => Ok(Self::Damage),
            _ => Err(EventError::UnknownEventKind(s.trim().to_string())),
        }
    }
}

/// Upstream event as received from a producing subsystem.
///
/// The amount stays textual so a non-numeric value reaches [`normalize`] and
/// is reported as malformed instead of failing somewhere in deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub amount: Option<String>,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub memo: Option<String>,
}

/// Normalizes an upstream event into canonical form.
///
/// # Errors
///
/// - [`EventError::UnknownEventKind`] - `source_kind` names no known subsystem.
/// - [`EventError::MalformedEvent`] - amount missing, non-numeric, negative,
///   above [`MAX_AMOUNT`](crate::MAX_AMOUNT), or finer than the minor unit.
pub fn normalize(raw: &RawEvent, source_kind: &str) -> Result<NewEvent, EventError> {
    let kind = source_kind.parse::<SourceKind>()?.event_kind();
    let magnitude = parse_magnitude(raw.amount.as_deref())?;

    let amount = if kind.is_outflow() {
        -magnitude
    } else {
        magnitude
    };

    Ok(NewEvent {
        kind,
        amount,
        occurred_at: raw.occurred_at,
        memo: raw
            .memo
            .as_deref()
            .map(str::trim)
            .filter(|memo| !memo.is_empty())
            .map(str::to_string),
    })
}

fn parse_magnitude(amount: Option<&str>) -> Result<Decimal, EventError> {
    let malformed = EventError::MalformedEvent;

    let text = amount
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or(malformed(MalformedReason::MissingAmount))?;

    let magnitude = Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|_| malformed(MalformedReason::NonNumericAmount))?;

    if magnitude.is_sign_negative() && !magnitude.is_zero() {
        return Err(malformed(MalformedReason::NegativeAmount));
    }
    if !within_ceiling(magnitude) {
        return Err(malformed(MalformedReason::AmountTooLarge));
    }
    if !fits_minor_units(magnitude) {
        return Err(malformed(MalformedReason::SubMinorUnit));
    }
    Ok(magnitude)
}
