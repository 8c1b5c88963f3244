//! Disconnect continuity: per-participant disconnect counting and forfeiture timeouts.
//!
//! Safe to call from any thread. The timeout itself is only a [`TimerFired`] wake-up; the
//! tournament that receives it must win [`DisconnectContinuityService::claim_timeout`] before
//! forfeiting anyone.
//!
//! [`TimerFired`]: crate::logic::TimerFired

use crate::logic::timers::{Scheduler, TimerId, TimerKind};
use crate::models::ParticipantId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Disconnect history of one participant.
#[derive(Clone, Debug, PartialEq)]
pub struct DisconnectRecord {
    pub count: u32,
    pub last_disconnect_at: DateTime<Utc>,
    /// Back online since the last disconnect.
    pub reconnected: bool,
}

pub struct DisconnectContinuityService {
    max_disconnections: u32,
    max_offline_ms: u64,
    scheduler: Arc<dyn Scheduler>,
    records: DashMap<ParticipantId, DisconnectRecord>,
    pending: DashMap<ParticipantId, TimerId>,
}

impl DisconnectContinuityService {
    pub fn new(max_disconnections: u32, max_offline_ms: u64, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            max_disconnections,
            max_offline_ms,
            scheduler,
            records: DashMap::new(),
            pending: DashMap::new(),
        }
    }

    pub fn max_disconnections(&self) -> u32 {
        self.max_disconnections
    }

    /// Count a disconnect. Returns `false` once the participant is over the limit; no timeout
    /// is scheduled then. Otherwise the forfeiture timeout is (re)scheduled, replacing any
    /// pending one.
    pub fn track_disconnection(&self, participant: ParticipantId) -> bool {
        let count = {
            let mut record = self.records.entry(participant).or_insert_with(|| DisconnectRecord {
                count: 0,
                last_disconnect_at: Utc::now(),
                reconnected: false,
            });
            record.count += 1;
            record.last_disconnect_at = Utc::now();
            record.reconnected = false;
            record.count
        };
        log::debug!(
            "participant {} disconnected {} time(s) (max {})",
            participant,
            count,
            self.max_disconnections
        );
        if count > self.max_disconnections {
            log::debug!("participant {} exceeded the disconnect limit", participant);
            return false;
        }

        let timer = self
            .scheduler
            .schedule_once(TimerKind::DisconnectTimeout(participant), self.max_offline_ms);
        if let Some(previous) = self.pending.insert(participant, timer) {
            self.scheduler.cancel(previous);
        }
        true
    }

    /// Whether the participant is still within the disconnect limit.
    pub fn can_player_return(&self, participant: ParticipantId) -> bool {
        self.records
            .get(&participant)
            .map(|r| r.count <= self.max_disconnections)
            .unwrap_or(true)
    }

    /// Take ownership of a fired timeout. Only the timer currently pending for the participant
    /// can be claimed, and only once; a replaced or cancelled timer loses.
    pub fn claim_timeout(&self, participant: ParticipantId, timer: TimerId) -> bool {
        self.pending.remove_if(&participant, |_, pending| *pending == timer).is_some()
    }

    pub fn has_pending_timeout(&self, participant: ParticipantId) -> bool {
        self.pending.contains_key(&participant)
    }

    /// Cancel the pending timeout but keep the count: the limit holds for the whole match.
    pub fn clear_player_reconnected(&self, participant: ParticipantId) {
        if let Some((_, timer)) = self.pending.remove(&participant) {
            self.scheduler.cancel(timer);
            log::debug!("cancelled disconnect timeout for reconnected participant {}", participant);
        }
        if let Some(mut record) = self.records.get_mut(&participant) {
            record.reconnected = true;
        }
    }

    /// Forget the participant entirely (elimination, tournament end).
    pub fn clear_player(&self, participant: ParticipantId) {
        self.records.remove(&participant);
        if let Some((_, timer)) = self.pending.remove(&participant) {
            self.scheduler.cancel(timer);
        }
    }

    pub fn clear_all(&self) {
        let timers: Vec<TimerId> = self.pending.iter().map(|e| *e.value()).collect();
        self.pending.clear();
        for timer in timers {
            self.scheduler.cancel(timer);
        }
        self.records.clear();
    }

    pub fn disconnection_count(&self, participant: ParticipantId) -> u32 {
        self.records.get(&participant).map(|r| r.count).unwrap_or(0)
    }

    pub fn record(&self, participant: ParticipantId) -> Option<DisconnectRecord> {
        self.records.get(&participant).map(|r| r.value().clone())
    }
}
