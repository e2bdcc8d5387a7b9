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

//! Core identifier and money types shared across the ledger.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of fractional digits in the till currency.
///
/// Every amount the ledger accepts is a whole number of minor units (cents),
/// so decimal addition over any number of events is exact.
pub const MINOR_UNITS: u32 = 2;

/// Largest magnitude a single event or withdrawal may carry.
///
/// A trillion currency units per event keeps any realistic history many
/// orders of magnitude below `Decimal::MAX`.
pub const MAX_AMOUNT: Decimal = dec!(1000000000000);

/// Unique identifier for a ledger event.
///
/// Assigned by the event log at append time from a strictly increasing
/// sequence starting at 1, so the id is also the event's sequence position.
/// Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returns `true` if `amount` has no digits below the currency's minor unit.
pub fn fits_minor_units(amount: Decimal) -> bool {
    amount.normalize().scale() <= MINOR_UNITS
}

/// Returns `true` if `amount` is within [`MAX_AMOUNT`] in either direction.
pub fn within_ceiling(amount: Decimal) -> bool {
    amount.abs() <= MAX_AMOUNT
}
