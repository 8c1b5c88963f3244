//! Stand-in providers.

use super::StandInProvider;
use crate::models::{ActorId, CollaboratorError, DespawnReason, ParticipantId, Vitals};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Always unavailable; disconnecting fighters are eliminated on the spot.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableProvider;

impl StandInProvider for UnavailableProvider {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn spawn(&self, owner: ParticipantId, _vitals: &Vitals, _appearance: &str) -> Result<ActorId, CollaboratorError> {
        Err(CollaboratorError::new(
            "stand-in",
            format!("no provider can spawn a stand-in for {}", owner),
        ))
    }

    fn despawn(&self, _owner: ParticipantId, _actor: ActorId, _reason: DespawnReason) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// A spawned virtual actor, as the provider sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct VirtualActor {
    pub owner: ParticipantId,
    pub vitals: Vitals,
    pub appearance: String,
}

/// In-memory provider: actors exist only as records. Used by the HTTP host and in tests.
#[derive(Debug, Default)]
pub struct VirtualProvider {
    actors: DashMap<ActorId, VirtualActor>,
    despawned: DashMap<ActorId, DespawnReason>,
}

impl VirtualProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor(&self, actor: ActorId) -> Option<VirtualActor> {
        self.actors.get(&actor).map(|a| a.value().clone())
    }

    pub fn live_count(&self) -> usize {
        self.actors.len()
    }

    pub fn despawn_reason(&self, actor: ActorId) -> Option<DespawnReason> {
        self.despawned.get(&actor).map(|r| *r)
    }
}

impl StandInProvider for VirtualProvider {
    fn name(&self) -> &str {
        "virtual"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn spawn(&self, owner: ParticipantId, vitals: &Vitals, appearance: &str) -> Result<ActorId, CollaboratorError> {
        let id = Uuid::new_v4();
        self.actors.insert(
            id,
            VirtualActor {
                owner,
                vitals: vitals.clone(),
                appearance: appearance.to_string(),
            },
        );
        log::debug!("spawned virtual stand-in {} for {} at {}", id, owner, vitals.location);
        Ok(id)
    }

    fn despawn(&self, owner: ParticipantId, actor: ActorId, reason: DespawnReason) -> Result<(), CollaboratorError> {
        if self.actors.remove(&actor).is_some() {
            self.despawned.insert(actor, reason);
            log::debug!("despawned virtual stand-in {} of {} ({})", actor, owner, reason);
        }
        Ok(())
    }
}

/// First available provider among `candidates`, else [`UnavailableProvider`].
pub fn resolve_provider(candidates: Vec<Arc<dyn StandInProvider>>) -> Arc<dyn StandInProvider> {
    for provider in candidates {
        if provider.is_available() {
            log::info!("Using {} for stand-ins", provider.name());
            return provider;
        }
    }
    log::info!("No stand-in provider available, disconnecting fighters will be eliminated");
    Arc::new(UnavailableProvider)
}
