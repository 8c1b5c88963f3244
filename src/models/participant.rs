//! Participant and group snapshot data structures.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a participant (stable player id supplied by the host).
pub type ParticipantId = Uuid;

/// Unique identifier for an external group (clan, faction...).
pub type GroupId = Uuid;

/// Group affiliation captured when the participant joined.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct GroupRef {
    pub id: GroupId,
    pub name: String,
}

/// Why a participant became a casualty.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EliminationReason {
    /// Died in combat (or their stand-in was defeated).
    Killed,
    /// Disconnected while not fighting.
    Disconnected,
    /// Left voluntarily after the lobby closed.
    Left,
    /// Did not reconnect before the offline deadline.
    Timeout,
    /// Came back after exceeding the disconnect limit.
    DisconnectLimitExceeded,
    /// Removed by an operator or another collaborator.
    Other(String),
}

impl EliminationReason {
    pub fn as_str(&self) -> &str {
        match self {
            EliminationReason::Killed => "killed",
            EliminationReason::Disconnected => "disconnected",
            EliminationReason::Left => "left",
            EliminationReason::Timeout => "timeout",
            EliminationReason::DisconnectLimitExceeded => "disconnect-limit-exceeded",
            EliminationReason::Other(reason) => reason,
        }
    }

    /// Parse the wire form used by the host adapter; unknown values become `Other`.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "killed" => EliminationReason::Killed,
            "disconnected" => EliminationReason::Disconnected,
            "left" => EliminationReason::Left,
            "timeout" => EliminationReason::Timeout,
            "disconnect-limit-exceeded" => EliminationReason::DisconnectLimitExceeded,
            other => EliminationReason::Other(other.to_string()),
        }
    }
}

/// Why a participant left the active set without being eliminated.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// Left while the lobby was open.
    Left,
    /// Trimmed to reach a power-of-two bracket; watches as a spectator.
    Trimmed,
    /// Finished with a placement (third place is decided before the final).
    Placed,
}

/// Where a participant currently stands. Exactly one of these at any time.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ParticipantStatus {
    Active,
    Casualty { reason: EliminationReason },
    Removed { reason: RemovalReason },
}

/// Statistics view of a participant (for API / display).
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ParticipantStats {
    pub kills: u32,
    pub deaths: u32,
    pub victories: u32,
}

/// A participant of one tournament run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    /// Snapshot taken at join time; later membership changes are ignored.
    pub group: Option<GroupRef>,
    pub status: ParticipantStatus,
    pub stats: ParticipantStats,
    /// Join order, used for tail trimming.
    pub seat: usize,
}

impl Participant {
    pub fn new(id: ParticipantId, name: impl Into<String>, group: Option<GroupRef>, seat: usize) -> Self {
        Self {
            id,
            name: name.into(),
            group,
            status: ParticipantStatus::Active,
            stats: ParticipantStats::default(),
            seat,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ParticipantStatus::Active
    }

    pub fn is_casualty(&self) -> bool {
        matches!(self.status, ParticipantStatus::Casualty { .. })
    }

    pub fn group_id(&self) -> Option<GroupId> {
        self.group.as_ref().map(|g| g.id)
    }

    /// Record a kill credited to this participant.
    pub fn add_kill(&mut self) {
        self.stats.kills += 1;
    }

    /// Record a death of this participant.
    pub fn add_death(&mut self) {
        self.stats.deaths += 1;
    }

    pub fn add_victory(&mut self) {
        self.stats.victories += 1;
    }
}
