//! Stand-in roster: at most one live stand-in per participant.

use crate::models::{ActorId, ParticipantId, StandInActor, TournamentError};
use std::collections::HashMap;

/// Effect of damage on a stand-in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DamageApplied {
    pub owner: ParticipantId,
    pub health: f64,
    pub defeated: bool,
}

/// Live stand-ins of one tournament, by owner.
#[derive(Clone, Debug, Default)]
pub struct StandInRoster {
    actors: HashMap<ParticipantId, StandInActor>,
}

impl StandInRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly spawned stand-in. A second one for the same owner is refused.
    pub fn register(&mut self, actor: StandInActor) -> Result<(), TournamentError> {
        if self.actors.contains_key(&actor.owner) {
            return Err(TournamentError::StandInAlreadyActive(actor.owner));
        }
        self.actors.insert(actor.owner, actor);
        Ok(())
    }

    pub fn is_active(&self, owner: ParticipantId) -> bool {
        self.actors.get(&owner).map(|a| a.alive).unwrap_or(false)
    }

    pub fn get(&self, owner: ParticipantId) -> Option<&StandInActor> {
        self.actors.get(&owner)
    }

    pub fn owner_of(&self, actor: ActorId) -> Option<ParticipantId> {
        self.actors
            .values()
            .find(|a| a.actor_id == actor)
            .map(|a| a.owner)
    }

    /// Subtract damage. A stand-in at zero health is marked dead but stays registered until taken.
    pub fn apply_damage(&mut self, actor: ActorId, amount: f64) -> Option<DamageApplied> {
        let stand_in = self
            .actors
            .values_mut()
            .find(|a| a.actor_id == actor && a.alive)?;
        stand_in.health -= amount;
        if stand_in.health <= 0.0 {
            stand_in.health = 0.0;
            stand_in.alive = false;
        }
        Some(DamageApplied {
            owner: stand_in.owner,
            health: stand_in.health,
            defeated: !stand_in.alive,
        })
    }

    /// Remove and return the owner's stand-in. Taking twice yields `None` the second time.
    pub fn take(&mut self, owner: ParticipantId) -> Option<StandInActor> {
        self.actors.remove(&owner)
    }

    pub fn owners(&self) -> Vec<ParticipantId> {
        self.actors.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}
