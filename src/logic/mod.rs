//! Tournament behaviour: registry, bracket, ledgers, rule sets and the lifecycle that drives them.

mod bracket;
mod combat;
mod continuity;
mod lifecycle;
mod registry;
mod rules;
mod stand_in;
mod timers;

pub use bracket::{pair_up, trim_to_power_of_two, BracketEngine, DecidedDuel, LossOutcome, NextDuel, Round};
pub use combat::{AttackerTally, CombatAttributionService};
pub use continuity::{DisconnectContinuityService, DisconnectRecord};
pub use lifecycle::{
    DamageVerdict, DisconnectOutcome, JoinOutcome, JoinRejection, JoinRequest, ReconnectOutcome,
    TournamentLifecycle,
};
pub use registry::{Elimination, ParticipantRegistry};
pub use rules::{rules_for, EliminationRules, HitCountRules, HitVerdict, PrizeGrant, RuleSet, Standings};
pub use stand_in::{DamageApplied, StandInRoster};
pub use timers::{ManualScheduler, Scheduler, TimerFired, TimerId, TimerKind, TimerSet};
