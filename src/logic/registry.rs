//! Participant registry: who is active, who fell, who left, and their counters.

use crate::models::{
    EliminationReason, GroupId, GroupRef, Participant, ParticipantId, ParticipantStatus,
    RemovalReason, TournamentError,
};
use std::collections::{HashMap, HashSet};

/// Result of a successful elimination.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Elimination {
    /// Set when this elimination removed the last live member of the participant's group.
    pub group_defeated: Option<GroupId>,
}

/// Single source of truth for participant status within one tournament run.
#[derive(Clone, Debug, Default)]
pub struct ParticipantRegistry {
    records: HashMap<ParticipantId, Participant>,
    /// Active participants in join order.
    active: Vec<ParticipantId>,
    next_seat: usize,
    defeated_groups: HashSet<GroupId>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant with its group snapshot. A participant who left the lobby may join again.
    pub fn join(
        &mut self,
        id: ParticipantId,
        name: impl Into<String>,
        group: Option<GroupRef>,
    ) -> Result<(), TournamentError> {
        let seat = self.next_seat;
        match self.records.get_mut(&id) {
            Some(existing) => match existing.status {
                ParticipantStatus::Removed {
                    reason: RemovalReason::Left,
                } => {
                    existing.name = name.into();
                    existing.group = group;
                    existing.status = ParticipantStatus::Active;
                    existing.seat = seat;
                }
                _ => return Err(TournamentError::InvalidState),
            },
            None => {
                self.records.insert(id, Participant::new(id, name, group, seat));
            }
        }
        self.next_seat += 1;
        self.active.push(id);
        Ok(())
    }

    /// Voluntary exit. Only active participants can leave; returns whether anything changed.
    pub fn leave(&mut self, id: ParticipantId) -> bool {
        self.retire(id, RemovalReason::Left)
    }

    /// Take an active participant out of play without defeating them (trimmed, placed, left).
    pub fn retire(&mut self, id: ParticipantId, reason: RemovalReason) -> bool {
        if !self.is_active(id) {
            return false;
        }
        self.active.retain(|p| *p != id);
        if let Some(p) = self.records.get_mut(&id) {
            p.status = ParticipantStatus::Removed { reason };
        }
        true
    }

    /// Eliminate an active participant. Idempotent: `None` when already out.
    pub fn eliminate(&mut self, id: ParticipantId, reason: EliminationReason) -> Option<Elimination> {
        if !self.is_active(id) {
            return None;
        }
        self.active.retain(|p| *p != id);
        let group = match self.records.get_mut(&id) {
            Some(p) => {
                p.status = ParticipantStatus::Casualty { reason };
                p.group_id()
            }
            None => None,
        };
        let mut group_defeated = None;
        if let Some(g) = group {
            if self.live_member_count(g) == 0 && self.defeated_groups.insert(g) {
                group_defeated = Some(g);
            }
        }
        Some(Elimination { group_defeated })
    }

    /// Re-label the reason of a participant who is already a casualty.
    pub fn mark_casualty(&mut self, id: ParticipantId, reason: EliminationReason) -> bool {
        match self.records.get_mut(&id) {
            Some(p) if p.is_casualty() => {
                p.status = ParticipantStatus::Casualty { reason };
                true
            }
            _ => false,
        }
    }

    /// Bring a casualty back into play (third-place duel). Its group counts as alive again.
    pub fn revive(&mut self, id: ParticipantId) -> bool {
        let group = match self.records.get_mut(&id) {
            Some(p) if p.is_casualty() => {
                p.status = ParticipantStatus::Active;
                p.group_id()
            }
            _ => return false,
        };
        self.active.push(id);
        if let Some(g) = group {
            self.defeated_groups.remove(&g);
        }
        true
    }

    pub fn record_kill(&mut self, id: ParticipantId) {
        if let Some(p) = self.records.get_mut(&id) {
            p.add_kill();
        }
    }

    pub fn record_death(&mut self, id: ParticipantId) {
        if let Some(p) = self.records.get_mut(&id) {
            p.add_death();
        }
    }

    pub fn record_victory(&mut self, id: ParticipantId) {
        if let Some(p) = self.records.get_mut(&id) {
            p.add_victory();
        }
    }

    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn is_active(&self, id: ParticipantId) -> bool {
        self.records.get(&id).map(|p| p.is_active()).unwrap_or(false)
    }

    pub fn name_of(&self, id: ParticipantId) -> String {
        self.records
            .get(&id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn group_of(&self, id: ParticipantId) -> Option<GroupId> {
        self.records.get(&id).and_then(|p| p.group_id())
    }

    pub fn group_name(&self, group: GroupId) -> Option<String> {
        self.records
            .values()
            .filter_map(|p| p.group.as_ref())
            .find(|g| g.id == group)
            .map(|g| g.name.clone())
    }

    /// Active participant ids in join order.
    pub fn active_ids(&self) -> Vec<ParticipantId> {
        self.active.clone()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Active participants in join order.
    pub fn participants(&self) -> Vec<&Participant> {
        self.active.iter().filter_map(|id| self.records.get(id)).collect()
    }

    /// Every participant ever registered, by seat.
    pub fn all(&self) -> Vec<&Participant> {
        let mut all: Vec<&Participant> = self.records.values().collect();
        all.sort_by_key(|p| p.seat);
        all
    }

    pub fn casualties(&self) -> Vec<&Participant> {
        self.all().into_iter().filter(|p| p.is_casualty()).collect()
    }

    /// Kill counters of everyone who scored at least once.
    pub fn kill_counts(&self) -> HashMap<ParticipantId, u32> {
        self.records
            .values()
            .filter(|p| p.stats.kills > 0)
            .map(|p| (p.id, p.stats.kills))
            .collect()
    }

    /// Most kills; earliest seat wins ties.
    pub fn best_killer(&self) -> Option<(ParticipantId, u32)> {
        self.all()
            .into_iter()
            .filter(|p| p.stats.kills > 0)
            .fold(None, |best: Option<&Participant>, p| match best {
                Some(b) if b.stats.kills >= p.stats.kills => Some(b),
                _ => Some(p),
            })
            .map(|p| (p.id, p.stats.kills))
    }

    /// Live member count per group, groups in order of first appearance.
    pub fn group_counts(&self) -> Vec<(GroupId, usize)> {
        let mut counts: Vec<(GroupId, usize)> = Vec::new();
        for id in &self.active {
            let Some(group) = self.group_of(*id) else {
                continue;
            };
            match counts.iter_mut().find(|(g, _)| *g == group) {
                Some((_, n)) => *n += 1,
                None => counts.push((group, 1)),
            }
        }
        counts
    }

    pub fn live_groups(&self) -> Vec<GroupId> {
        self.group_counts().into_iter().map(|(g, _)| g).collect()
    }

    pub fn live_member_count(&self, group: GroupId) -> usize {
        self.active
            .iter()
            .filter(|id| self.group_of(**id) == Some(group))
            .count()
    }

    /// Every registered member of a group, by seat.
    pub fn members_of_group(&self, group: GroupId) -> Vec<&Participant> {
        self.all()
            .into_iter()
            .filter(|p| p.group_id() == Some(group))
            .collect()
    }

    /// Active participants minus the asking one.
    pub fn remaining_opponent_count(&self) -> usize {
        self.active.len().saturating_sub(1)
    }

    /// Live members of every group other than the participant's own.
    pub fn remaining_opponent_groups(&self, id: ParticipantId) -> usize {
        let own = self.group_of(id);
        self.group_counts()
            .into_iter()
            .filter(|(g, _)| Some(*g) != own)
            .map(|(_, n)| n)
            .sum()
    }
}
