//! TournamentState, errors and placement records.

use crate::models::duel::Entrant;
use crate::models::participant::ParticipantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors that can occur during tournament operations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TournamentError {
    /// Lobby, exit or arena entrance locations are not configured.
    MissingLocations,
    /// Group mode needs a group directory and none was supplied.
    GroupProviderUnavailable,
    /// Configuration could not be read, parsed or validated.
    InvalidConfig(String),
    /// The host refused to open the lobby.
    LobbyVetoed,
    /// Tournament is not in a state that allows this action.
    InvalidState,
    /// Participant not found in this tournament.
    ParticipantNotFound(ParticipantId),
    /// A stand-in is already active for this participant.
    StandInAlreadyActive(ParticipantId),
}

impl std::fmt::Display for TournamentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TournamentError::MissingLocations => write!(f, "Not all arena locations are set"),
            TournamentError::GroupProviderUnavailable => {
                write!(f, "Cannot start a group based tournament without a group provider")
            }
            TournamentError::InvalidConfig(reason) => write!(f, "Invalid configuration: {}", reason),
            TournamentError::LobbyVetoed => write!(f, "The host refused to open the lobby"),
            TournamentError::InvalidState => write!(f, "Invalid state for this action"),
            TournamentError::ParticipantNotFound(id) => write!(f, "Participant {} not found", id),
            TournamentError::StandInAlreadyActive(id) => {
                write!(f, "A stand-in is already active for participant {}", id)
            }
        }
    }
}

impl std::error::Error for TournamentError {}

/// Failure reported by an external collaborator (host, stand-in provider, group directory, store).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CollaboratorError {
    pub collaborator: &'static str,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.collaborator, self.message)
    }
}

impl std::error::Error for CollaboratorError {}

/// Unique identifier for a tournament run.
pub type TournamentId = Uuid;

/// Current phase of the tournament.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TournamentState {
    /// Participants may join; announcements count down to the start.
    #[default]
    Lobby,
    /// Fighters of the next duel are in the arena, waiting for the countdown.
    Preparation,
    /// A duel is being fought (or the next one is about to be prepared).
    Battle,
    /// Terminal.
    Finished { cancelled: bool },
}

impl TournamentState {
    pub fn is_finished(&self) -> bool {
        matches!(self, TournamentState::Finished { .. })
    }
}

/// Bracket outcome so far. Entrants are groups in group mode.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Placements {
    pub first: Option<Entrant>,
    pub second: Option<Entrant>,
    pub third: Option<Entrant>,
}

/// One persisted row per finished tournament.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacementRecord {
    pub tournament: String,
    pub first: Option<String>,
    pub second: Option<String>,
    pub third: Option<String>,
    pub killer: Option<String>,
    pub killer_kills: Option<u32>,
    pub first_group: Option<String>,
    pub cancelled: bool,
    pub finished_at: DateTime<Utc>,
}
