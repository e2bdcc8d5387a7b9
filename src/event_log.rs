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

//! Append-only event log.
//!
//! Stores every [`LedgerEvent`] keyed by id and ordered by
//! `(occurred_at, id)`. Ids come from a single sequence advanced under the
//! write lock, so an id is also the event's position in append order.

use crate::base::EventId;
use crate::error::WithdrawalError;
use crate::event::{LedgerEvent, NewEvent};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Entries {
    /// Sorted by [`LedgerEvent::position`].
    ordered: Vec<Arc<LedgerEvent>>,
    last_id: Option<EventId>,
}

/// A thread-safe, append-only event store.
///
/// Combines a [`DashMap`] for O(1) lookup by id with a sorted vector for
/// window queries. Readers see a consistent view of events and the last
/// assigned id together.
#[derive(Debug, Default)]
pub struct EventLog {
    by_id: DashMap<EventId, Arc<LedgerEvent>>,
    entries: RwLock<Entries>,
    next_id: AtomicU64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event, assigning it the next id.
    pub fn append(&self, event: NewEvent) -> Arc<LedgerEvent> {
        let mut entries = self.entries.write();
        self.insert(&mut entries, event)
    }

    /// Appends an event only if no other event was appended since `expected`.
    ///
    /// `expected` is the last id the caller observed (`None` for an empty log).
    ///
    /// # Errors
    ///
    /// Returns [`WithdrawalError::ConcurrentWriteConflict`] if the log's tail
    /// has moved; nothing is appended in that case.
    pub fn append_after(
        &self,
        expected: Option<EventId>,
        event: NewEvent,
    ) -> Result<Arc<LedgerEvent>, WithdrawalError> {
        let mut entries = self.entries.write();
        if entries.last_id != expected {
            return Err(WithdrawalError::ConcurrentWriteConflict);
        }
        Ok(self.insert(&mut entries, event))
    }

    fn insert(&self, entries: &mut Entries, event: NewEvent) -> Arc<LedgerEvent> {
        let id = EventId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let event = Arc::new(event.into_event(id));

        // The new id is the largest so far, so it sorts after every event
        // with the same timestamp.
        let at = event.occurred_at();
        let index = entries.ordered.partition_point(|e| e.occurred_at() <= at);
        entries.ordered.insert(index, Arc::clone(&event));
        entries.last_id = Some(id);

        self.by_id.insert(id, Arc::clone(&event));
        event
    }

    /// Runs `f` over the ordered events and the last assigned id, under one read lock.
    pub fn read<R>(&self, f: impl FnOnce(&[Arc<LedgerEvent>], Option<EventId>) -> R) -> R {
        let entries = self.entries.read();
        f(&entries.ordered, entries.last_id)
    }

    pub fn get(&self, id: EventId) -> Option<Arc<LedgerEvent>> {
        self.by_id.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn last_id(&self) -> Option<EventId> {
        self.entries.read().last_id
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
