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

//! Balance cache.
//!
//! Memoizes one [`BalanceSnapshot`] per [`WindowKey`] so repeated "today" or
//! "all-time" queries do not rescan the event log.
//!
//! Staleness is tracked by event sequence position. Every cached entry keeps
//! an `invalidated_through` watermark; a new event raises it to the event's id
//! on every entry whose window the event can affect. A snapshot is fresh while
//! its `as_of_event_id` is at least the watermark. Recomputation is lazy: it
//! happens on the next [`BalanceCache::get`] for that window.
//!
//! Rolling windows keep one entry per kind: a new "today" retires yesterday's.
//! Custom ranges are kept up to a fixed number of entries, least recently
//! used first out, so arbitrary range queries cannot grow the cache (or the
//! per-append invalidation walk) without bound.
//!
//! # Concurrency
//!
//! Fresh entries are served under a shared read lock. A stale entry is
//! recomputed by exactly one reader holding the entry's upgradable lock;
//! other readers of the same window wait for it and return its result.
//! Different windows recompute in parallel.

use crate::aggregate::BalanceSnapshot;
use crate::event::LedgerEvent;
use crate::window::{ResolvedWindow, WindowKey};
use dashmap::DashMap;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Default number of custom-range entries kept.
pub const DEFAULT_RANGE_SLOTS: usize = 64;

#[derive(Debug)]
struct Slot {
    window: ResolvedWindow,
    invalidated_through: AtomicU64,
    last_used: AtomicU64,
    snapshot: RwLock<Option<BalanceSnapshot>>,
}

impl Slot {
    fn new(window: ResolvedWindow, tick: u64) -> Self {
        Self {
            window,
            invalidated_through: AtomicU64::new(0),
            last_used: AtomicU64::new(tick),
            snapshot: RwLock::new(None),
        }
    }

    fn fresh<'a>(&self, snapshot: &'a Option<BalanceSnapshot>) -> Option<&'a BalanceSnapshot> {
        let watermark = self.invalidated_through.load(Ordering::Acquire);
        snapshot
            .as_ref()
            .filter(|s| s.as_of_event_id.map_or(0, |id| id.0) >= watermark)
    }
}

/// Hit and recompute counters, mostly for tests and benchmarks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub recomputes: u64,
    pub entries: usize,
}

/// Per-window snapshot cache with lazy, sequence-based invalidation.
#[derive(Debug)]
pub struct BalanceCache {
    slots: DashMap<WindowKey, Arc<Slot>>,
    hits: AtomicU64,
    recomputes: AtomicU64,
    /// Logical clock for least-recently-used range eviction.
    tick: AtomicU64,
    range_capacity: usize,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::with_range_capacity(DEFAULT_RANGE_SLOTS)
    }

    /// Creates a cache that keeps at most `capacity` custom-range entries
    /// (at least one).
    pub fn with_range_capacity(capacity: usize) -> Self {
        Self {
            slots: DashMap::new(),
            hits: AtomicU64::new(0),
            recomputes: AtomicU64::new(0),
            tick: AtomicU64::new(0),
            range_capacity: capacity.max(1),
        }
    }

    /// Returns the snapshot for `window`, calling `compute` only if the cached
    /// one is missing or stale.
    pub fn get<F>(&self, window: &ResolvedWindow, compute: F) -> BalanceSnapshot
    where
        F: FnOnce(&ResolvedWindow) -> BalanceSnapshot,
    {
        let slot = self.slot(window);

        if let Some(snapshot) = slot.fresh(&slot.snapshot.read()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return snapshot.clone();
        }

        let guard = slot.snapshot.upgradable_read();
        // Another reader may have recomputed while we waited.
        if let Some(snapshot) = slot.fresh(&guard) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return snapshot.clone();
        }

        let snapshot = compute(&slot.window);
        self.recomputes.fetch_add(1, Ordering::Relaxed);
        debug!(
            window = %slot.window.key,
            as_of = ?snapshot.as_of_event_id,
            closing = %snapshot.closing_balance,
            "recomputed balance snapshot"
        );

        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
        *guard = Some(snapshot.clone());
        snapshot
    }

    /// Marks every entry the event can affect as stale.
    ///
    /// Open-ended windows are always affected. A bounded window is affected
    /// when the event occurred before its end, which includes backdated events
    /// landing in an already closed period.
    pub fn on_event(&self, event: &LedgerEvent) {
        let at = event.occurred_at();
        let id = event.id().0;
        for slot in self.slots.iter() {
            if slot.window.affected_by(at) {
                slot.invalidated_through.fetch_max(id, Ordering::AcqRel);
            }
        }
    }

    /// Drops the cached snapshot for one window.
    pub fn invalidate(&self, key: &WindowKey) {
        if let Some(slot) = self.slots.get(key).map(|slot| Arc::clone(slot.value())) {
            *slot.snapshot.write() = None;
        }
    }

    /// Drops every cached snapshot.
    pub fn invalidate_all(&self) {
        self.slots.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            recomputes: self.recomputes.load(Ordering::Relaxed),
            entries: self.slots.len(),
        }
    }

    fn slot(&self, window: &ResolvedWindow) -> Arc<Slot> {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        if let Some(slot) = self.slots.get(&window.key) {
            slot.last_used.fetch_max(tick, Ordering::Relaxed);
            return Arc::clone(slot.value());
        }

        // A new rolling key means its predecessor (yesterday's "today", last
        // month, ...) has aged out.
        if window.key.is_rolling() {
            let kind = mem::discriminant(&window.key);
            self.slots
                .retain(|key, _| mem::discriminant(key) != kind || *key == window.key);
        } else if matches!(window.key, WindowKey::Range(..)) {
            self.make_room_for_range();
        }

        let slot = self
            .slots
            .entry(window.key)
            .or_insert_with(|| Arc::new(Slot::new(*window, tick)));
        Arc::clone(slot.value())
    }

    /// Evicts least recently used ranges until one more fits.
    fn make_room_for_range(&self) {
        let mut ranges: Vec<(WindowKey, u64)> = self
            .slots
            .iter()
            .filter(|entry| matches!(entry.key(), WindowKey::Range(..)))
            .map(|entry| (*entry.key(), entry.value().last_used.load(Ordering::Relaxed)))
            .collect();
        if ranges.len() < self.range_capacity {
            return;
        }

        ranges.sort_unstable_by_key(|(_, used)| *used);
        let excess = ranges.len() + 1 - self.range_capacity;
        for (key, _) in ranges.into_iter().take(excess) {
            self.slots.remove(&key);
            debug!(window = %key, "evicted range snapshot");
        }
    }
}

impl Default for BalanceCache {
    fn default() -> Self {
        Self::new()
    }
}
