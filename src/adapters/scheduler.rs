//! Tokio-backed scheduler: timers become sleeping tasks that post wake-ups on a channel.

use crate::logic::{Scheduler, TimerFired, TimerId, TimerKind};
use crate::models::TournamentId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A timer of one tournament went off.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScheduledWake {
    pub tournament: TournamentId,
    pub fired: TimerFired,
}

/// One scheduler per tournament; wake-ups from every tournament may share a channel.
/// Must be used from inside a tokio runtime.
pub struct TokioScheduler {
    tournament: TournamentId,
    tx: UnboundedSender<ScheduledWake>,
    next_id: AtomicU64,
    tasks: Arc<DashMap<TimerId, JoinHandle<()>>>,
}

impl TokioScheduler {
    pub fn new(tournament: TournamentId, tx: UnboundedSender<ScheduledWake>) -> Self {
        Self {
            tournament,
            tx,
            next_id: AtomicU64::new(1),
            tasks: Arc::new(DashMap::new()),
        }
    }

    fn next_id(&self) -> TimerId {
        TimerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, kind: TimerKind, delay_ms: u64) -> TimerId {
        let id = self.next_id();
        let wake = ScheduledWake {
            tournament: self.tournament,
            fired: TimerFired { id, kind },
        };
        let tx = self.tx.clone();
        let tasks = self.tasks.clone();
        // The task only forgets its handle once the handle has been stored.
        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let _ = registered_rx.await;
            tasks.remove(&id);
            if tx.send(wake).is_err() {
                log::debug!("timer {:?} fired after its receiver closed", id);
            }
        });
        self.tasks.insert(id, handle);
        let _ = registered_tx.send(());
        id
    }

    fn schedule_repeating(&self, kind: TimerKind, initial_delay_ms: u64, period_ms: u64) -> TimerId {
        let id = self.next_id();
        let wake = ScheduledWake {
            tournament: self.tournament,
            fired: TimerFired { id, kind },
        };
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(initial_delay_ms)).await;
            let mut interval = tokio::time::interval(Duration::from_millis(period_ms.max(1)));
            loop {
                interval.tick().await;
                if tx.send(wake).is_err() {
                    break;
                }
            }
        });
        self.tasks.insert(id, handle);
        id
    }

    fn cancel(&self, id: TimerId) {
        if let Some((_, handle)) = self.tasks.remove(&id) {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn cancelled_timer_never_wakes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tournament = uuid::Uuid::new_v4();
        let scheduler = TokioScheduler::new(tournament, tx);
        let kept = scheduler.schedule_once(TimerKind::NextDuel, 5);
        let dropped = scheduler.schedule_once(TimerKind::Expiration, 5);
        scheduler.cancel(dropped);
        scheduler.cancel(dropped);

        let wake = rx.recv().await;
        assert_eq!(
            wake,
            Some(ScheduledWake {
                tournament,
                fired: TimerFired {
                    id: kept,
                    kind: TimerKind::NextDuel
                }
            })
        );
        let late = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(late.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn immediate_timers_leave_nothing_behind() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = TokioScheduler::new(uuid::Uuid::new_v4(), tx);
        for _ in 0..64 {
            scheduler.schedule_once(TimerKind::NextDuel, 0);
        }
        for _ in 0..64 {
            assert!(rx.recv().await.is_some());
        }
        assert_eq!(scheduler.pending(), 0);
    }
}
