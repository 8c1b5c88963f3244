//! Collaborator boundary: what the tournament needs from the outside world, and the
//! context object that carries those collaborators into a tournament.

mod groups;
mod scheduler;
mod stand_in;
mod store;

pub use groups::InMemoryGroupDirectory;
pub use scheduler::{ScheduledWake, TokioScheduler};
pub use stand_in::{resolve_provider, UnavailableProvider, VirtualActor, VirtualProvider};
pub use store::{CsvPlacementStore, MemoryPlacementStore};

use crate::logic::{rules_for, CombatAttributionService, DisconnectContinuityService, RuleSet, Scheduler};
use crate::models::{
    ActorId, Audience, CollaboratorError, DespawnReason, Gate, GroupId, GroupRef, Location,
    Notice, ParticipantId, PlacementRecord, PrizeAward, TournamentConfig, TournamentEvent, Vitals,
};
use std::sync::Arc;

/// The host world: movement, health, commands, presentation and lifecycle events.
pub trait ArenaHost: Send + Sync {
    /// External veto. Returning `false` cancels the gated step.
    fn approve(&self, _gate: Gate) -> bool {
        true
    }
    fn teleport(&self, participant: ParticipantId, destination: &Location) -> Result<(), CollaboratorError>;
    /// Position and health right now; used when a fighter drops.
    fn vitals(&self, participant: ParticipantId) -> Result<Vitals, CollaboratorError>;
    /// Put a returning participant back where their stand-in was.
    fn restore(&self, participant: ParticipantId, vitals: &Vitals) -> Result<(), CollaboratorError>;
    /// Full health, effects cleared.
    fn heal(&self, participant: ParticipantId) -> Result<(), CollaboratorError>;
    fn run_command(&self, command: &str) -> Result<(), CollaboratorError>;
    fn set_border(&self, center: &Location, size: u32, damage: f64) -> Result<(), CollaboratorError>;
    fn reset_border(&self) -> Result<(), CollaboratorError>;
    fn give_prize(&self, award: &PrizeAward) -> Result<(), CollaboratorError>;
    fn notify(&self, audience: Audience, notice: Notice);
    fn emit(&self, event: TournamentEvent);
}

/// Group (clan, faction) membership lookups.
pub trait GroupDirectory: Send + Sync {
    fn group_of(&self, participant: ParticipantId) -> Result<Option<GroupRef>, CollaboratorError>;
    fn is_leader_or_officer(&self, group: GroupId, participant: ParticipantId) -> bool;
}

/// Spawns substitute combat entities for dropped fighters.
pub trait StandInProvider: Send + Sync {
    fn name(&self) -> &str;
    fn is_available(&self) -> bool;
    fn spawn(&self, owner: ParticipantId, vitals: &Vitals, appearance: &str) -> Result<ActorId, CollaboratorError>;
    fn despawn(&self, owner: ParticipantId, actor: ActorId, reason: DespawnReason) -> Result<(), CollaboratorError>;
}

/// Persists final placements, once per finished tournament.
pub trait PlacementStore: Send + Sync {
    fn record_winners(&self, record: &PlacementRecord) -> Result<(), CollaboratorError>;
}

/// Everything a tournament run needs, built once and handed to its constructor.
pub struct ArenaContext {
    pub config: TournamentConfig,
    pub scheduler: Arc<dyn Scheduler>,
    pub continuity: Arc<DisconnectContinuityService>,
    pub combat: Arc<CombatAttributionService>,
    pub groups: Option<Arc<dyn GroupDirectory>>,
    pub stand_ins: Arc<dyn StandInProvider>,
    pub host: Arc<dyn ArenaHost>,
    pub store: Arc<dyn PlacementStore>,
    pub rules: Box<dyn RuleSet>,
}

impl ArenaContext {
    /// Context with ledgers sized from the config, no group directory, no stand-ins,
    /// in-memory placements and the configured rule set.
    pub fn new(config: TournamentConfig, scheduler: Arc<dyn Scheduler>, host: Arc<dyn ArenaHost>) -> Self {
        let continuity = Arc::new(DisconnectContinuityService::new(
            config.stand_in.max_disconnections,
            config.stand_in.max_offline_ms,
            scheduler.clone(),
        ));
        let combat = Arc::new(CombatAttributionService::new(config.stand_in.combat_timeout_ms));
        let rules = rules_for(&config.rules);
        Self {
            config,
            scheduler,
            continuity,
            combat,
            groups: None,
            stand_ins: Arc::new(UnavailableProvider),
            host,
            store: Arc::new(MemoryPlacementStore::new()),
            rules,
        }
    }

    pub fn with_groups(mut self, groups: Arc<dyn GroupDirectory>) -> Self {
        self.groups = Some(groups);
        self
    }

    pub fn with_stand_ins(mut self, provider: Arc<dyn StandInProvider>) -> Self {
        self.stand_ins = provider;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn PlacementStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_rules(mut self, rules: Box<dyn RuleSet>) -> Self {
        self.rules = rules;
        self
    }
}
