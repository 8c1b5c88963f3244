//! Data structures for elimination tournaments: participants, duels, config, events.

mod config;
mod duel;
mod events;
mod participant;
mod stand_in;
mod tournament;
mod world;

pub use config::{ArenaLocations, BorderConfig, LobbyConfig, RuleKind, StandInConfig, TournamentConfig};
pub use duel::{Duel, DuelId, DuelKind, Entrant};
pub use events::{format_duration, Audience, Gate, Notice, PrizeAward, PrizeTier, TournamentEvent};
pub use participant::{
    EliminationReason, GroupId, GroupRef, Participant, ParticipantId, ParticipantStats,
    ParticipantStatus, RemovalReason,
};
pub use stand_in::{ActorId, DespawnReason, StandInActor};
pub use tournament::{
    CollaboratorError, PlacementRecord, Placements, TournamentError, TournamentId, TournamentState,
};
pub use world::{Location, Vitals, DEFAULT_MAX_HEALTH};
