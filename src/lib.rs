//! Elimination arena: single-elimination tournaments for a live multiplayer world.
//!
//! `models` holds the plain data, `logic` the tournament behaviour and `adapters` the
//! collaborator traits with their in-process implementations.

pub mod adapters;
pub mod logic;
pub mod models;

pub use adapters::{ArenaContext, ArenaHost, GroupDirectory, PlacementStore, StandInProvider};
pub use logic::{
    BracketEngine, CombatAttributionService, DisconnectContinuityService, ParticipantRegistry,
    RuleSet, Scheduler, TournamentLifecycle,
};
pub use models::{
    Entrant, EliminationReason, Participant, ParticipantId, TournamentConfig, TournamentError,
    TournamentId, TournamentState,
};
