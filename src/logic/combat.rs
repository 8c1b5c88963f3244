//! Combat attribution for stand-ins: who gets the kill when a stand-in falls.

use crate::models::ParticipantId;
use dashmap::DashMap;
use std::collections::HashMap;

/// Damage one attacker dealt to one stand-in owner.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AttackerTally {
    pub total: f64,
    pub last_hit_ms: u64,
}

#[derive(Clone, Debug, Default)]
struct CombatRecord {
    by_attacker: HashMap<ParticipantId, AttackerTally>,
    last_attacker: Option<(ParticipantId, u64)>,
}

/// Damage ledger keyed by stand-in owner. Timestamps are milliseconds supplied by the caller.
pub struct CombatAttributionService {
    timeout_window_ms: u64,
    records: DashMap<ParticipantId, CombatRecord>,
}

impl CombatAttributionService {
    pub fn new(timeout_window_ms: u64) -> Self {
        Self {
            timeout_window_ms,
            records: DashMap::new(),
        }
    }

    pub fn timeout_window_ms(&self) -> u64 {
        self.timeout_window_ms
    }

    /// Accumulate damage. The most recent hit becomes the last attacker regardless of amount;
    /// a hit delivered late with an older timestamp does not take the pointer back.
    pub fn record_damage(&self, owner: ParticipantId, attacker: ParticipantId, amount: f64, at_ms: u64) {
        let mut record = self.records.entry(owner).or_default();
        let tally = record.by_attacker.entry(attacker).or_default();
        tally.total += amount;
        tally.last_hit_ms = tally.last_hit_ms.max(at_ms);
        match record.last_attacker {
            Some((_, last_ms)) if last_ms > at_ms => {}
            _ => record.last_attacker = Some((attacker, at_ms)),
        }
        log::debug!("recorded {:.2} damage from {} to stand-in of {}", amount, attacker, owner);
    }

    /// Last attacker, if the last hit is within the window at `now_ms`.
    pub fn last_attacker(&self, owner: ParticipantId, now_ms: u64) -> Option<ParticipantId> {
        let record = self.records.get(&owner)?;
        let (attacker, at_ms) = record.last_attacker?;
        if now_ms.saturating_sub(at_ms) > self.timeout_window_ms {
            return None;
        }
        Some(attacker)
    }

    pub fn total_damage(&self, owner: ParticipantId) -> f64 {
        self.records
            .get(&owner)
            .map(|r| r.by_attacker.values().map(|t| t.total).sum())
            .unwrap_or(0.0)
    }

    pub fn damage_by(&self, owner: ParticipantId, attacker: ParticipantId) -> Option<AttackerTally> {
        self.records.get(&owner).and_then(|r| r.by_attacker.get(&attacker).copied())
    }

    pub fn clear(&self, owner: ParticipantId) {
        if self.records.remove(&owner).is_some() {
            log::debug!("cleared combat records for {}", owner);
        }
    }

    pub fn clear_all(&self) {
        self.records.clear();
    }
}
