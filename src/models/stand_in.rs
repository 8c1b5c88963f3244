//! Stand-in actors: substitutes for participants who drop mid-duel.

use crate::models::participant::ParticipantId;
use crate::models::world::Location;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Handle of a spawned stand-in entity in the host world.
pub type ActorId = Uuid;

/// A live substitute occupying a disconnected fighter's place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandInActor {
    pub owner: ParticipantId,
    pub actor_id: ActorId,
    pub location: Location,
    /// Mirrored from the owner at disconnect, then reduced by recorded damage.
    pub health: f64,
    pub alive: bool,
}

impl StandInActor {
    pub fn new(owner: ParticipantId, actor_id: ActorId, location: Location, health: f64) -> Self {
        Self {
            owner,
            actor_id,
            location,
            health,
            alive: health > 0.0,
        }
    }
}

/// Why a stand-in left the world.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DespawnReason {
    /// The owner reconnected and took their place back.
    OwnerRejoined,
    /// Health reached zero.
    ProxyDeath,
    /// The owner did not come back in time.
    Timeout,
    /// The tournament finished.
    MatchEnd,
    /// The owner was eliminated by other means.
    Eliminated,
}

impl DespawnReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DespawnReason::OwnerRejoined => "owner-rejoined",
            DespawnReason::ProxyDeath => "proxy-death",
            DespawnReason::Timeout => "timeout",
            DespawnReason::MatchEnd => "match-end",
            DespawnReason::Eliminated => "eliminated",
        }
    }
}

impl std::fmt::Display for DespawnReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
