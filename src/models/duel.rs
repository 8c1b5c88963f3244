//! Duel, Entrant, and DuelKind for solo and group brackets.

use crate::models::participant::{GroupId, ParticipantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a duel.
pub type DuelId = Uuid;

/// The unit paired in a duel: a participant, or a whole group in group mode.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Entrant {
    Participant(ParticipantId),
    Group(GroupId),
}

/// Which kind of matchup a duel is.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuelKind {
    #[default]
    Regular,
    ThirdPlace,
    Final,
}

/// One bracket matchup: two opponents, or a single one for a bye.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Duel<T> {
    pub id: DuelId,
    pub opponents: Vec<T>,
    pub kind: DuelKind,
}

impl<T: Copy + Eq> Duel<T> {
    pub fn pair(first: T, second: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            opponents: vec![first, second],
            kind: DuelKind::Regular,
        }
    }

    pub fn bye(only: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            opponents: vec![only],
            kind: DuelKind::Regular,
        }
    }

    /// Two opponents still standing: this duel will be fought.
    pub fn is_contested(&self) -> bool {
        self.opponents.len() == 2
    }

    pub fn is_bye(&self) -> bool {
        self.opponents.len() == 1
    }

    pub fn is_empty(&self) -> bool {
        self.opponents.is_empty()
    }

    pub fn contains(&self, entrant: T) -> bool {
        self.opponents.contains(&entrant)
    }

    /// The opponent facing `entrant`, if any.
    pub fn other(&self, entrant: T) -> Option<T> {
        if !self.contains(entrant) {
            return None;
        }
        self.opponents.iter().copied().find(|o| *o != entrant)
    }

    /// Drop `entrant` from this duel. Returns whether it was present.
    pub fn remove(&mut self, entrant: T) -> bool {
        let before = self.opponents.len();
        self.opponents.retain(|o| *o != entrant);
        before != self.opponents.len()
    }
}
