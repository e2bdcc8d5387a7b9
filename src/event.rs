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

//! Canonical ledger events.
//!
//! Every monetary movement that touches the till is recorded as one immutable
//! [`LedgerEvent`]. Sales are inflows and carry a positive amount; expenses,
//! damage write-offs and withdrawals are outflows and carry a negative one.

use crate::base::EventId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Sale,
    Expense,
    Damage,
    Withdrawal,
}

impl EventKind {
    /// Returns `true` for kinds that take cash out of the till.
    pub fn is_outflow(&self) -> bool {
        !matches!(self, Self::Sale)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Expense => "expense",
            Self::Damage => "damage",
            Self::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event content before the log stamps it with an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub kind: EventKind,
    /// Signed amount, already carrying the kind's sign.
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub memo: Option<String>,
}

impl NewEvent {
    pub(crate) fn into_event(self, id: EventId) -> LedgerEvent {
        LedgerEvent {
            id,
            kind: self.kind,
            amount: self.amount,
            occurred_at: self.occurred_at,
            memo: self.memo,
        }
    }
}

/// Immutable record of one monetary movement.
///
/// Once appended an event is never mutated or deleted; corrections are new
/// offsetting events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    id: EventId,
    kind: EventKind,
    amount: Decimal,
    occurred_at: DateTime<Utc>,
    memo: Option<String>,
}

impl LedgerEvent {
    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Signed amount: positive for inflows, negative for outflows.
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn memo(&self) -> Option<&str> {
        self.memo.as_deref()
    }

    /// Sort key used everywhere events are ordered: `occurred_at`, ties broken by id.
    pub fn position(&self) -> (DateTime<Utc>, EventId) {
        (self.occurred_at, self.id)
    }
}
