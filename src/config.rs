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

//! Ledger configuration.
//!
//! Every field has a default, so an empty TOML file (or no file at all) gives
//! a UTC till whose weeks start on Monday.
//!
//! ```toml
//! utc_offset_minutes = 600
//! week_start = "sunday"
//! withdrawal_timeout_ms = 2000
//! default_withdrawal_memo = "Owner draw"
//! range_cache_slots = 128
//! ```

use crate::cache::DEFAULT_RANGE_SLOTS;
use crate::error::ConfigError;
use crate::window::Calendar;
use chrono::{FixedOffset, Weekday};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Till's offset from UTC, used to find local midnight.
    pub utc_offset_minutes: i32,

    /// First day of the "week" window.
    pub week_start: Weekday,

    /// How long a withdrawal waits for the writer lock before giving up.
    pub withdrawal_timeout_ms: u64,

    /// Memo recorded when a withdrawal request carries none.
    pub default_withdrawal_memo: String,

    /// Custom-range balances kept in the cache before the least recently used
    /// is evicted.
    pub range_cache_slots: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            week_start: Weekday::Mon,
            withdrawal_timeout_ms: 5_000,
            default_withdrawal_memo: "Cash withdrawal".to_string(),
            range_cache_slots: DEFAULT_RANGE_SLOTS,
        }
    }
}

impl LedgerConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.calendar()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Builds the till's calendar.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOffset`] when the offset is a day or more.
    pub fn calendar(&self) -> Result<Calendar, ConfigError> {
        let offset = self
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::InvalidOffset(self.utc_offset_minutes))?;
        Ok(Calendar::new(offset, self.week_start))
    }

    pub fn withdrawal_timeout(&self) -> Duration {
        Duration::from_millis(self.withdrawal_timeout_ms)
    }
}
