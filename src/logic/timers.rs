//! Timer handles: what can be scheduled, and the set of handles a tournament owns.

use crate::models::ParticipantId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Opaque handle returned by a [`Scheduler`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct TimerId(pub u64);

/// Every timer a tournament schedules.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "timer", content = "participant")]
pub enum TimerKind {
    LobbyAnnouncement,
    LobbyCountdown,
    PreparationCountdown,
    PreparationOver,
    BorderShrink,
    Expiration,
    NextDuel,
    DisconnectTimeout(ParticipantId),
}

/// A timer went off. Delivered back to the tournament that owns it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TimerFired {
    pub id: TimerId,
    pub kind: TimerKind,
}

/// Schedules wake-ups. Implementations never run tournament code themselves: they hand
/// [`TimerFired`] back to whoever owns the tournament.
pub trait Scheduler: Send + Sync {
    fn schedule_once(&self, kind: TimerKind, delay_ms: u64) -> TimerId;
    fn schedule_repeating(&self, kind: TimerKind, initial_delay_ms: u64, period_ms: u64) -> TimerId;
    /// Cancelling an unknown, fired or already cancelled timer is a no-op.
    fn cancel(&self, id: TimerId);
}

/// The handles one tournament currently owns.
#[derive(Debug, Default)]
pub struct TimerSet {
    live: HashMap<TimerId, (TimerKind, bool)>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn once(&mut self, scheduler: &dyn Scheduler, kind: TimerKind, delay_ms: u64) -> TimerId {
        let id = scheduler.schedule_once(kind, delay_ms);
        self.live.insert(id, (kind, false));
        id
    }

    pub fn repeating(
        &mut self,
        scheduler: &dyn Scheduler,
        kind: TimerKind,
        initial_delay_ms: u64,
        period_ms: u64,
    ) -> TimerId {
        let id = scheduler.schedule_repeating(kind, initial_delay_ms, period_ms);
        self.live.insert(id, (kind, true));
        id
    }

    /// Whether a fired timer is still ours. One-shot timers are forgotten here.
    pub fn fire(&mut self, fired: &TimerFired) -> bool {
        match self.live.get(&fired.id) {
            Some((kind, repeating)) if *kind == fired.kind => {
                if !*repeating {
                    self.live.remove(&fired.id);
                }
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self, scheduler: &dyn Scheduler, id: TimerId) {
        if self.live.remove(&id).is_some() {
            scheduler.cancel(id);
        }
    }

    /// Cancel every live timer of one kind.
    pub fn cancel_kind(&mut self, scheduler: &dyn Scheduler, kind: TimerKind) {
        let ids: Vec<TimerId> = self
            .live
            .iter()
            .filter(|(_, (k, _))| *k == kind)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            self.cancel(scheduler, id);
        }
    }

    /// Cancel everything. Each handle is cancelled exactly once; a second call does nothing.
    pub fn cancel_all(&mut self, scheduler: &dyn Scheduler) {
        for (id, _) in self.live.drain() {
            scheduler.cancel(id);
        }
    }

    pub fn is_live(&self, kind: TimerKind) -> bool {
        self.live.values().any(|(k, _)| *k == kind)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

#[derive(Debug)]
struct ManualEntry {
    kind: TimerKind,
    due_ms: u64,
    period_ms: Option<u64>,
}

#[derive(Debug, Default)]
struct ManualState {
    now_ms: u64,
    next_id: u64,
    entries: BTreeMap<TimerId, ManualEntry>,
    cancelled: Vec<TimerId>,
}

/// Virtual-clock scheduler for tests and simulations. Nothing fires until time is advanced.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn now_ms(&self) -> u64 {
        self.lock().now_ms
    }

    pub fn pending(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.lock().entries.contains_key(&id)
    }

    /// Ids passed to `cancel` that were still scheduled, in call order.
    pub fn cancelled(&self) -> Vec<TimerId> {
        self.lock().cancelled.clone()
    }

    /// Pop the earliest timer due at or before `until_ms`, moving the clock to its due time.
    pub fn pop_due(&self, until_ms: u64) -> Option<TimerFired> {
        let mut state = self.lock();
        let (id, due) = state
            .entries
            .iter()
            .filter(|(_, e)| e.due_ms <= until_ms)
            .min_by_key(|(id, e)| (e.due_ms, **id))
            .map(|(id, e)| (*id, e.due_ms))?;
        state.now_ms = state.now_ms.max(due);
        let (kind, period) = state.entries.get(&id).map(|e| (e.kind, e.period_ms))?;
        match period {
            Some(period) => {
                if let Some(entry) = state.entries.get_mut(&id) {
                    entry.due_ms = due.saturating_add(period.max(1));
                }
            }
            None => {
                state.entries.remove(&id);
            }
        }
        Some(TimerFired { id, kind })
    }

    /// Advance the clock by `ms`, handing every timer that comes due to `on_fire` in order.
    /// Timers scheduled from inside `on_fire` fire in the same pass when they come due in time.
    pub fn advance(&self, ms: u64, mut on_fire: impl FnMut(TimerFired)) {
        let target = self.now_ms() + ms;
        while let Some(fired) = self.pop_due(target) {
            on_fire(fired);
        }
        let mut state = self.lock();
        state.now_ms = state.now_ms.max(target);
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, kind: TimerKind, delay_ms: u64) -> TimerId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = TimerId(state.next_id);
        let due_ms = state.now_ms.saturating_add(delay_ms);
        state.entries.insert(
            id,
            ManualEntry {
                kind,
                due_ms,
                period_ms: None,
            },
        );
        id
    }

    fn schedule_repeating(&self, kind: TimerKind, initial_delay_ms: u64, period_ms: u64) -> TimerId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = TimerId(state.next_id);
        let due_ms = state.now_ms.saturating_add(initial_delay_ms);
        state.entries.insert(
            id,
            ManualEntry {
                kind,
                due_ms,
                period_ms: Some(period_ms),
            },
        );
        id
    }

    fn cancel(&self, id: TimerId) {
        let mut state = self.lock();
        if state.entries.remove(&id).is_some() {
            state.cancelled.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_timer_is_no_longer_ours() {
        let scheduler = ManualScheduler::new();
        let mut timers = TimerSet::new();
        let id = timers.once(&scheduler, TimerKind::NextDuel, 1000);
        assert!(timers.is_live(TimerKind::NextDuel));
        timers.cancel(&scheduler, id);
        timers.cancel(&scheduler, id);
        assert!(!timers.is_live(TimerKind::NextDuel));
        assert!(!timers.fire(&TimerFired { id, kind: TimerKind::NextDuel }));
        assert_eq!(scheduler.cancelled(), vec![id]);
    }

    #[test]
    fn repeating_timer_stays_registered() {
        let scheduler = ManualScheduler::new();
        let mut timers = TimerSet::new();
        timers.repeating(&scheduler, TimerKind::BorderShrink, 10, 10);
        let mut fired = Vec::new();
        scheduler.advance(35, |f| fired.push(f));
        assert_eq!(fired.len(), 3);
        assert!(fired.iter().all(|f| timers.fire(f)));
        assert!(timers.is_live(TimerKind::BorderShrink));
        timers.cancel_all(&scheduler);
        assert!(timers.is_empty());
        assert!(!timers.is_live(TimerKind::BorderShrink));
        assert_eq!(scheduler.pending(), 0);
    }
}
