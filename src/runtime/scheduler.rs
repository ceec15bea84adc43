//! Effect scheduler
//!
//! Turns the effects returned by engine transitions into work that is due at
//! a given instant. Saves are debounced per store and combinatorics runs per
//! set; notifications fire on the next poll; only the newest preview request
//! survives. Time is always passed in, so the scheduler can be driven by a
//! real clock, a tokio timer or a test.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::engine::{Effect, StoreKind, Transition};
use crate::model::SetId;
use crate::settings::EngineSettings;

/// Trailing-edge debounce keyed by `K`. Rescheduling a key pushes its
/// deadline back.
#[derive(Debug, Clone)]
pub struct Debouncer<K: Ord> {
    deadlines: BTreeMap<K, Instant>,
}

impl<K: Ord + Clone> Default for Debouncer<K> {
    fn default() -> Self {
        Self {
            deadlines: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> Debouncer<K> {
    pub fn schedule(&mut self, key: K, now: Instant, delay: Duration) {
        self.deadlines.insert(key, now + delay);
    }

    /// Remove and return the keys whose deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Vec<K> {
        let due: Vec<K> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &due {
            self.deadlines.remove(key);
        }
        due
    }

    /// Remove and return every pending key.
    pub fn take_all(&mut self) -> Vec<K> {
        std::mem::take(&mut self.deadlines).into_keys().collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    pub fn cancel_all(&mut self) {
        self.deadlines.clear();
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.deadlines.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

/// Work that has come due.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DueWork {
    pub saves: Vec<StoreKind>,
    pub recompute: Vec<SetId>,
    pub notify_sets: bool,
    pub preview: Option<SetId>,
}

impl DueWork {
    pub fn is_empty(&self) -> bool {
        self.saves.is_empty() && self.recompute.is_empty() && !self.notify_sets && self.preview.is_none()
    }
}

/// Schedules the effects of engine transitions.
#[derive(Debug, Clone)]
pub struct EffectScheduler {
    settings: EngineSettings,
    saves: Debouncer<StoreKind>,
    recomputes: Debouncer<SetId>,
    notify_pending: bool,
    preview_pending: Option<SetId>,
    in_flight: BTreeSet<SetId>,
    /// Sets whose recomputation came due while one was already running.
    deferred: BTreeSet<SetId>,
}

impl EffectScheduler {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            saves: Debouncer::default(),
            recomputes: Debouncer::default(),
            notify_pending: false,
            preview_pending: None,
            in_flight: BTreeSet::new(),
            deferred: BTreeSet::new(),
        }
    }

    /// Queue the effects of one transition.
    pub fn schedule(&mut self, transition: Transition, now: Instant) {
        for effect in transition {
            match effect {
                Effect::Persist(store) => {
                    self.saves
                        .schedule(store, now, self.settings.save_debounce(store));
                }
                Effect::RecomputeCombinations(set_id) => {
                    self.recomputes
                        .schedule(set_id, now, self.settings.combinations_debounce());
                }
                Effect::NotifySetsChanged => self.notify_pending = true,
                Effect::RegeneratePreview(set_id) => {
                    if let Some(previous) = self.preview_pending.replace(set_id) {
                        debug!(set_id = %previous, "preview request superseded");
                    }
                }
            }
        }
    }

    /// Take the work due at `now`.
    ///
    /// A recomputation for a set that is still in flight is not returned; it
    /// is re-armed when the running one finishes.
    pub fn poll(&mut self, now: Instant) -> DueWork {
        let mut recompute = Vec::new();
        for set_id in self.recomputes.take_due(now) {
            if self.in_flight.contains(&set_id) {
                debug!(set_id = %set_id, "combinatorics already running, deferring");
                self.deferred.insert(set_id);
            } else {
                recompute.push(set_id);
            }
        }

        DueWork {
            saves: self.saves.take_due(now),
            recompute,
            notify_sets: std::mem::take(&mut self.notify_pending),
            preview: self.preview_pending.take(),
        }
    }

    /// Take all pending work regardless of deadlines.
    pub fn flush(&mut self) -> DueWork {
        let recompute = self
            .recomputes
            .take_all()
            .into_iter()
            .chain(std::mem::take(&mut self.deferred))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|set_id| !self.in_flight.contains(set_id))
            .collect();

        DueWork {
            saves: self.saves.take_all(),
            recompute,
            notify_sets: std::mem::take(&mut self.notify_pending),
            preview: self.preview_pending.take(),
        }
    }

    /// Drop every pending timer and request without running it.
    pub fn cancel_all(&mut self) {
        self.saves.cancel_all();
        self.recomputes.cancel_all();
        self.notify_pending = false;
        self.preview_pending = None;
        self.deferred.clear();
    }

    /// Mark a set's combinatorics run as started.
    pub fn begin_recompute(&mut self, set_id: &str) -> bool {
        self.in_flight.insert(set_id.to_string())
    }

    /// Mark a set's run as finished, re-arming it if a request was deferred.
    pub fn finish_recompute(&mut self, set_id: &str, now: Instant) {
        self.in_flight.remove(set_id);
        if self.deferred.remove(set_id) {
            self.recomputes.schedule(
                set_id.to_string(),
                now,
                self.settings.combinations_debounce(),
            );
        }
    }

    pub fn is_in_flight(&self, set_id: &str) -> bool {
        self.in_flight.contains(set_id)
    }

    /// Earliest instant at which `poll` may return work.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.saves.next_deadline(), self.recomputes.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// True when nothing is pending, ignoring runs already in flight.
    pub fn is_idle(&self) -> bool {
        self.saves.is_empty()
            && self.recomputes.is_empty()
            && self.deferred.is_empty()
            && !self.notify_pending
            && self.preview_pending.is_none()
    }

    pub fn is_save_pending(&self, store: StoreKind) -> bool {
        self.saves.is_pending(&store)
    }
}
