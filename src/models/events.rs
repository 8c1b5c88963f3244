//! Notices shown to participants and events emitted to the host.

use crate::models::participant::{GroupId, ParticipantId};
use crate::models::stand_in::{ActorId, DespawnReason};
use serde::{Deserialize, Serialize};

/// Who a notice is addressed to.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "to", content = "ids")]
pub enum Audience {
    /// Every participant of the tournament.
    Tournament,
    Participant(ParticipantId),
    Participants(Vec<ParticipantId>),
}

/// Player-facing message. Rendering is the host's business; `Display` gives the default text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "notice")]
pub enum Notice {
    PlayerJoined { name: String },
    Objective,
    StartingGame {
        seconds: u64,
        minimum_groups: usize,
        minimum_players: usize,
        groups: usize,
        players: usize,
    },
    LobbyCountdown { seconds: u64 },
    NotEnoughPlaytime { missing: String },
    BlockedVersion,
    TeleportError,
    NoGroup,
    NotEnoughParticipants,
    Cancelled { by: String },
    KickedToAdjustDuels,
    WaitForYourTurn,
    WaitForThirdPlace,
    BattleForThirdPlace,
    FinalBattle,
    Countdown { seconds: u64 },
    Fight,
    PreparationOver,
    BorderShrinking,
    KilledBy {
        victim: String,
        victim_kills: u32,
        killer: String,
        killer_kills: u32,
    },
    DiedByHimself { victim: String },
    WatchToTheEnd,
    GroupDefeated { group: String },
    RemainingOpponents { players: usize, groups: usize },
    StandInSpawned { name: String },
    EliminatedDisconnectLimit { name: String },
    YouHaveLeft,
    HitCount { hits: u32, needed: u32 },
    GameExpired,
    WhoWon {
        first: String,
        second: String,
        third: String,
    },
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::PlayerJoined { name } => write!(f, "{} joined the tournament", name),
            Notice::Objective => write!(f, "Be the last one standing!"),
            Notice::StartingGame {
                seconds,
                minimum_groups,
                minimum_players,
                groups,
                players,
            } => write!(
                f,
                "Starting in {}s (minimum {} groups / {} players, now {} groups / {} players)",
                seconds, minimum_groups, minimum_players, groups, players
            ),
            Notice::LobbyCountdown { seconds } | Notice::Countdown { seconds } => write!(f, "{}", seconds),
            Notice::NotEnoughPlaytime { missing } => {
                write!(f, "You need {} more playtime to join", missing)
            }
            Notice::BlockedVersion => write!(f, "Your client version cannot join this tournament"),
            Notice::TeleportError => write!(f, "Could not teleport you to the lobby"),
            Notice::NoGroup => write!(f, "You must be in a group to join"),
            Notice::NotEnoughParticipants => write!(f, "Not enough participants, the tournament was cancelled"),
            Notice::Cancelled { by } => write!(f, "The tournament was cancelled by {}", by),
            Notice::KickedToAdjustDuels => write!(f, "You were moved to the spectators to even out the duels"),
            Notice::WaitForYourTurn => write!(f, "Wait for your turn"),
            Notice::WaitForThirdPlace => write!(f, "Wait for the third place fight"),
            Notice::BattleForThirdPlace => write!(f, "Battle for third place!"),
            Notice::FinalBattle => write!(f, "Final battle!"),
            Notice::Fight => write!(f, "Fight!"),
            Notice::PreparationOver => write!(f, "Preparation is over"),
            Notice::BorderShrinking => write!(f, "The border is shrinking"),
            Notice::KilledBy {
                victim,
                victim_kills,
                killer,
                killer_kills,
            } => write!(
                f,
                "{} ({} kills) was killed by {} ({} kills)",
                victim, victim_kills, killer, killer_kills
            ),
            Notice::DiedByHimself { victim } => write!(f, "{} died by himself", victim),
            Notice::WatchToTheEnd => write!(f, "Watch your group until the end"),
            Notice::GroupDefeated { group } => write!(f, "Group {} was defeated", group),
            Notice::RemainingOpponents { players, groups } => {
                write!(f, "Remaining opponents: {} players, {} in other groups", players, groups)
            }
            Notice::StandInSpawned { name } => write!(f, "{} disconnected, a stand-in took their place", name),
            Notice::EliminatedDisconnectLimit { name } => {
                write!(f, "{} was eliminated for disconnecting too many times", name)
            }
            Notice::YouHaveLeft => write!(f, "You have left the tournament"),
            Notice::HitCount { hits, needed } => write!(f, "Hits: {}/{}", hits, needed),
            Notice::GameExpired => write!(f, "The tournament expired"),
            Notice::WhoWon { first, second, third } => write!(
                f,
                "Winners: 1st {}, 2nd {}, 3rd {}",
                first, second, third
            ),
        }
    }
}

/// Checks the host may veto.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "gate", content = "participant")]
pub enum Gate {
    LobbyStart,
    BattleStart,
    Join(ParticipantId),
}

/// Lifecycle events for other plugins/services.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum TournamentEvent {
    LobbyStarted { tournament: String },
    BattleStarted { tournament: String },
    ParticipantDied {
        victim: ParticipantId,
        killer: Option<ParticipantId>,
    },
    PlayerExited { participant: ParticipantId },
    GroupDefeated {
        group: GroupId,
        last_member: ParticipantId,
    },
    StandInSpawned {
        owner: ParticipantId,
        actor: ActorId,
        health: f64,
    },
    StandInDespawned {
        owner: ParticipantId,
        actor: ActorId,
        reason: DespawnReason,
    },
    StandInDefeated {
        owner: ParticipantId,
        killer: Option<ParticipantId>,
    },
    PlayerWon { winners: Vec<ParticipantId> },
    GroupWon { group: GroupId },
    TournamentFinished { cancelled: bool },
}

/// Prize categories.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrizeTier {
    First,
    Second,
    Third,
    Killer,
}

/// One prize hand-out; in group mode leaders and officers are listed apart.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PrizeAward {
    pub tier: PrizeTier,
    pub group: Option<GroupId>,
    pub leaders: Vec<ParticipantId>,
    pub members: Vec<ParticipantId>,
}

/// `01h 02m 03s` style, hours and minutes omitted while zero.
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{:02}h ", hours));
    }
    if minutes > 0 || hours > 0 {
        out.push_str(&format!("{:02}m ", minutes));
    }
    out.push_str(&format!("{:02}s", seconds));
    out
}

#[cfg(test)]
mod tests {
    use super::format_duration;

    #[test]
    fn formats_only_needed_units() {
        assert_eq!(format_duration(5), "05s");
        assert_eq!(format_duration(65), "01m 05s");
        assert_eq!(format_duration(3600), "01h 00m 00s");
    }
}
