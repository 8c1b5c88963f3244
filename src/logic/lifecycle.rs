//! Tournament lifecycle: lobby, preparation, battle, finish.
//!
//! One [`TournamentLifecycle`] owns the registry, the bracket, the stand-in roster and every
//! timer handle of a single run. All inbound notifications (join, leave, death, disconnect,
//! reconnect, damage, timer wake-ups) go through its methods, which are meant to be called from
//! one task at a time.

use crate::adapters::ArenaContext;
use crate::logic::bracket::{BracketEngine, DecidedDuel, NextDuel, Round};
use crate::logic::registry::{Elimination, ParticipantRegistry};
use crate::logic::rules::{HitVerdict, PrizeGrant, Standings};
use crate::logic::stand_in::StandInRoster;
use crate::logic::timers::{TimerFired, TimerKind, TimerSet};
use crate::models::{
    format_duration, ActorId, Audience, CollaboratorError, DespawnReason, DuelKind,
    EliminationReason, Entrant, Gate, GroupRef, Location, Notice, Participant,
    ParticipantId, ParticipantStatus, PlacementRecord, Placements, PrizeAward, RemovalReason,
    StandInActor, TournamentConfig, TournamentError, TournamentEvent, TournamentId,
    TournamentState, Vitals, DEFAULT_MAX_HEALTH,
};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

const PLAYER_PLACEHOLDER: &str = "%player%";

/// A participant asking to join, with what the host knows about them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinRequest {
    pub id: ParticipantId,
    pub name: String,
    pub playtime_secs: u64,
    /// Skip the playtime requirement (permission held by the participant).
    pub bypass_playtime: bool,
    pub version_blocked: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum JoinRejection {
    NotInLobby,
    AlreadyJoined,
    Vetoed,
    NotEnoughPlaytime { missing_secs: u64 },
    VersionBlocked,
    NoGroup,
    TeleportFailed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum JoinOutcome {
    Joined,
    Rejected(JoinRejection),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum DisconnectOutcome {
    /// Not part of the run, or already handled.
    Ignored,
    /// Left the lobby, or dropped out of the third-place queue.
    Left,
    /// A stand-in holds the fighter's place until they return.
    StandIn { actor: ActorId },
    Eliminated,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ReconnectOutcome {
    /// Put back where the stand-in stood.
    Restored,
    /// Over the disconnect limit.
    Eliminated,
    /// No stand-in was holding a place for them.
    NotTracked,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum DamageVerdict {
    /// The target is not a stand-in of this tournament.
    NotStandIn,
    /// Damage not allowed; nothing recorded.
    Cancelled,
    Absorbed { health_left: f64 },
    Defeated {
        owner: ParticipantId,
        credited: Option<ParticipantId>,
    },
}

fn secs_to_ms(secs: u64) -> u64 {
    secs.saturating_mul(1000)
}

/// Border size after one shrink step, never below the final size.
fn next_border_size(current: u32, shrink: u32, final_size: u32) -> u32 {
    current.saturating_sub(shrink).max(final_size)
}

/// Commands with `%player%` run once per name; the others run once.
fn expand_commands(commands: &[String], names: &[String]) -> Vec<String> {
    let mut expanded = Vec::new();
    for command in commands {
        if command.contains(PLAYER_PLACEHOLDER) {
            for name in names {
                expanded.push(command.replace(PLAYER_PLACEHOLDER, name));
            }
        } else {
            expanded.push(command.clone());
        }
    }
    expanded
}

/// One elimination tournament run.
pub struct TournamentLifecycle {
    id: TournamentId,
    ctx: ArenaContext,
    state: TournamentState,
    /// A duel was decided and the next one has not started yet.
    between_duels: bool,
    registry: ParticipantRegistry,
    bracket: BracketEngine,
    roster: StandInRoster,
    timers: TimerSet,
    rng: StdRng,
    lobby_announcements_left: u32,
    lobby_countdown_secs: u64,
    preparation_countdown: u64,
    border_size: Option<u32>,
    /// Members to bring back for each entrant queued for the third-place duel.
    third_place_members: HashMap<Entrant, Vec<ParticipantId>>,
}

impl TournamentLifecycle {
    /// Open the lobby with a fresh tournament id.
    pub fn start(ctx: ArenaContext) -> Result<Self, TournamentError> {
        Self::start_with_id(Uuid::new_v4(), ctx)
    }

    /// Open the lobby.
    ///
    /// 1. Group mode needs a group directory, and every arena location must be set; otherwise
    ///    the tournament never exists.
    /// 2. The config is validated and the host may veto the lobby.
    /// 3. The first lobby announcement goes out right away; announcements repeat every
    ///    interval and the lobby closes after the last one.
    pub fn start_with_id(id: TournamentId, ctx: ArenaContext) -> Result<Self, TournamentError> {
        if ctx.config.group_mode && ctx.groups.is_none() {
            return Err(TournamentError::GroupProviderUnavailable);
        }
        if !ctx.config.locations_set() {
            return Err(TournamentError::MissingLocations);
        }
        ctx.config.validate()?;
        if !ctx.host.approve(Gate::LobbyStart) {
            return Err(TournamentError::LobbyVetoed);
        }

        let rng = match ctx.config.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut lifecycle = Self {
            id,
            state: TournamentState::Lobby,
            between_duels: false,
            registry: ParticipantRegistry::new(),
            bracket: BracketEngine::new(),
            roster: StandInRoster::new(),
            timers: TimerSet::new(),
            rng,
            lobby_announcements_left: ctx.config.lobby.announcement_times,
            lobby_countdown_secs: ctx.config.lobby.total_secs(),
            preparation_countdown: 0,
            border_size: None,
            third_place_members: HashMap::new(),
            ctx,
        };

        log::info!("Tournament {} ({}) opened its lobby", lifecycle.ctx.config.name, id);
        lifecycle.ctx.host.emit(TournamentEvent::LobbyStarted {
            tournament: lifecycle.ctx.config.name.clone(),
        });
        let total = lifecycle.ctx.config.lobby.total_secs();
        lifecycle.announce_lobby(total);
        let interval_ms = secs_to_ms(lifecycle.ctx.config.lobby.announcement_interval_secs);
        let scheduler = lifecycle.ctx.scheduler.clone();
        lifecycle
            .timers
            .repeating(scheduler.as_ref(), TimerKind::LobbyAnnouncement, interval_ms, interval_ms);
        lifecycle
            .timers
            .repeating(scheduler.as_ref(), TimerKind::LobbyCountdown, 1000, 1000);
        Ok(lifecycle)
    }

    // ---- queries ----

    pub fn id(&self) -> TournamentId {
        self.id
    }

    pub fn state(&self) -> TournamentState {
        self.state
    }

    pub fn config(&self) -> &TournamentConfig {
        &self.ctx.config
    }

    pub fn is_lobby(&self) -> bool {
        self.state == TournamentState::Lobby
    }

    pub fn is_preparation(&self) -> bool {
        self.state == TournamentState::Preparation
    }

    /// Whether the participant may fight right now.
    pub fn is_in_battle(&self, participant: ParticipantId) -> bool {
        let running = self.state == TournamentState::Battle && !self.between_duels;
        self.ctx
            .rules
            .is_in_battle(running, self.is_current_fighter(participant))
    }

    /// Members of the entrants of the duel being prepared or fought.
    pub fn current_fighters(&self) -> Vec<ParticipantId> {
        if !self.duel_running() {
            return Vec::new();
        }
        self.bracket
            .current_entrants()
            .into_iter()
            .flat_map(|e| self.live_members(e))
            .collect()
    }

    pub fn participants(&self) -> Vec<&Participant> {
        self.registry.participants()
    }

    pub fn casualties(&self) -> Vec<&Participant> {
        self.registry.casualties()
    }

    pub fn kill_counts(&self) -> HashMap<ParticipantId, u32> {
        self.registry.kill_counts()
    }

    pub fn remaining_opponent_count(&self) -> usize {
        self.registry.remaining_opponent_count()
    }

    pub fn placements(&self) -> &Placements {
        self.bracket.placements()
    }

    pub fn bracket(&self) -> &BracketEngine {
        &self.bracket
    }

    pub fn registry(&self) -> &ParticipantRegistry {
        &self.registry
    }

    pub fn stand_in(&self, owner: ParticipantId) -> Option<&StandInActor> {
        self.roster.get(owner)
    }

    /// Timers this tournament still owns.
    pub fn live_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn keep_inventory_on_death(&self, participant: ParticipantId) -> bool {
        self.ctx
            .rules
            .keep_inventory_on_death(self.is_current_fighter(participant), self.bracket.duel_count())
    }

    // ---- inbound notifications ----

    pub fn on_join(&mut self, request: JoinRequest) -> JoinOutcome {
        log::debug!("join request from {} ({})", request.name, request.id);
        if self.state != TournamentState::Lobby {
            return JoinOutcome::Rejected(JoinRejection::NotInLobby);
        }
        if self.registry.is_active(request.id) {
            return JoinOutcome::Rejected(JoinRejection::AlreadyJoined);
        }
        if !self.ctx.host.approve(Gate::Join(request.id)) {
            return JoinOutcome::Rejected(JoinRejection::Vetoed);
        }
        let minimum = self.ctx.config.minimum_playtime_secs;
        if !request.bypass_playtime && request.playtime_secs < minimum {
            let missing_secs = minimum - request.playtime_secs;
            self.tell(
                request.id,
                Notice::NotEnoughPlaytime {
                    missing: format_duration(missing_secs),
                },
            );
            return JoinOutcome::Rejected(JoinRejection::NotEnoughPlaytime { missing_secs });
        }
        if request.version_blocked {
            self.tell(request.id, Notice::BlockedVersion);
            return JoinOutcome::Rejected(JoinRejection::VersionBlocked);
        }

        let group = if self.ctx.config.group_mode {
            match self.lookup_group(request.id) {
                Some(group) => Some(group),
                None => {
                    self.tell(request.id, Notice::NoGroup);
                    return JoinOutcome::Rejected(JoinRejection::NoGroup);
                }
            }
        } else {
            None
        };

        let lobby = self.ctx.config.locations.lobby.clone();
        if let Some(lobby) = lobby {
            if let Err(e) = self.ctx.host.teleport(request.id, &lobby) {
                log::warn!("Could not teleport {} to the lobby: {}", request.name, e);
                self.tell(request.id, Notice::TeleportError);
                return JoinOutcome::Rejected(JoinRejection::TeleportFailed);
            }
        }
        if self.registry.join(request.id, request.name.clone(), group).is_err() {
            return JoinOutcome::Rejected(JoinRejection::AlreadyJoined);
        }
        self.heal(request.id);
        self.broadcast(Notice::PlayerJoined { name: request.name });
        self.tell(request.id, Notice::Objective);

        if self.registry.active_count() >= self.ctx.config.maximum_players {
            log::info!("Tournament {} is full, closing the lobby", self.ctx.config.name);
            self.end_lobby();
        }
        JoinOutcome::Joined
    }

    /// Voluntary leave. Returns whether the participant was part of the run.
    pub fn on_leave(&mut self, participant: ParticipantId) -> bool {
        log::debug!("{} left", participant);
        if self.state.is_finished() {
            return false;
        }
        if !self.registry.is_active(participant) {
            return self.drop_queued_member(participant, EliminationReason::Left);
        }
        self.tell(participant, Notice::YouHaveLeft);
        if self.state == TournamentState::Lobby {
            self.registry.leave(participant);
            self.teleport_to_exit(participant);
            return true;
        }
        if self.is_current_fighter(participant) {
            self.on_death(participant, None);
        } else {
            self.process_exit(participant, EliminationReason::Left);
        }
        true
    }

    /// A participant died, by `killer` or on their own.
    pub fn on_death(&mut self, victim: ParticipantId, killer: Option<ParticipantId>) {
        log::debug!("{} died (killer: {:?})", victim, killer);
        if !self.registry.is_active(victim) || self.state.is_finished() {
            return;
        }
        if self.state == TournamentState::Lobby {
            self.on_leave(victim);
            return;
        }
        let killer = killer.filter(|k| *k != victim && self.registry.contains(*k));

        self.registry.record_death(victim);
        if let Some(k) = killer {
            self.registry.record_kill(k);
        }
        self.ctx.host.emit(TournamentEvent::ParticipantDied { victim, killer });

        let victim_name = self.registry.name_of(victim);
        let notice = match killer {
            Some(k) => Notice::KilledBy {
                victim: victim_name,
                victim_kills: self.kills_of(victim),
                killer: self.registry.name_of(k),
                killer_kills: self.kills_of(k),
            },
            None => Notice::DiedByHimself { victim: victim_name },
        };
        self.broadcast(notice);
        if self.ctx.config.group_mode {
            self.tell(victim, Notice::WatchToTheEnd);
        }
        self.process_exit(victim, EliminationReason::Killed);
    }

    /// The participant's connection dropped.
    ///
    /// A current fighter is replaced by a stand-in when stand-ins are enabled, a provider is
    /// available and the disconnect limit is not exceeded. Every failure on that path ends in
    /// the same death a defeated stand-in would cause. Anyone else simply drops out.
    pub fn on_disconnect(&mut self, participant: ParticipantId) -> DisconnectOutcome {
        log::debug!("{} disconnected", participant);
        if self.state.is_finished() {
            return DisconnectOutcome::Ignored;
        }
        if !self.registry.is_active(participant) {
            return if self.drop_queued_member(participant, EliminationReason::Disconnected) {
                DisconnectOutcome::Left
            } else {
                DisconnectOutcome::Ignored
            };
        }
        if self.state == TournamentState::Lobby {
            self.registry.leave(participant);
            return DisconnectOutcome::Left;
        }
        if !self.is_current_fighter(participant) {
            self.process_exit(participant, EliminationReason::Disconnected);
            return DisconnectOutcome::Eliminated;
        }
        if let Some(stand_in) = self.roster.get(participant) {
            return DisconnectOutcome::StandIn {
                actor: stand_in.actor_id,
            };
        }

        if self.ctx.config.stand_in.enabled && self.ctx.stand_ins.is_available() {
            if !self.ctx.continuity.track_disconnection(participant) {
                let name = self.registry.name_of(participant);
                log::info!("{} exceeded the disconnect limit", name);
                self.broadcast(Notice::EliminatedDisconnectLimit { name });
                self.on_death(participant, None);
                return DisconnectOutcome::Eliminated;
            }
            match self.spawn_stand_in(participant) {
                Ok(actor) => return DisconnectOutcome::StandIn { actor },
                Err(e) => log::warn!(
                    "Could not spawn a stand-in for {}, eliminating: {}",
                    participant,
                    e
                ),
            }
        }
        self.on_death(participant, None);
        DisconnectOutcome::Eliminated
    }

    /// The participant is back online.
    pub fn on_reconnect(&mut self, participant: ParticipantId) -> ReconnectOutcome {
        log::debug!("{} reconnected", participant);
        if !self.registry.is_active(participant) || self.state.is_finished() {
            return ReconnectOutcome::NotTracked;
        }
        if !self.ctx.continuity.can_player_return(participant) {
            let name = self.registry.name_of(participant);
            self.tell(participant, Notice::EliminatedDisconnectLimit { name });
            self.eliminate(participant, EliminationReason::DisconnectLimitExceeded);
            return ReconnectOutcome::Eliminated;
        }
        let Some(stand_in) = self.roster.take(participant) else {
            self.ctx.continuity.clear_player_reconnected(participant);
            return ReconnectOutcome::NotTracked;
        };

        let vitals = Vitals {
            location: stand_in.location.clone(),
            health: stand_in.health.min(DEFAULT_MAX_HEALTH),
        };
        if let Err(e) = self.ctx.host.restore(participant, &vitals) {
            log::warn!("Could not restore {} at {}: {}", participant, vitals.location, e);
        }
        self.despawn(&stand_in, DespawnReason::OwnerRejoined);
        self.ctx.continuity.clear_player_reconnected(participant);
        self.ctx.combat.clear(participant);
        log::info!("{} took back their place from the stand-in", self.registry.name_of(participant));
        ReconnectOutcome::Restored
    }

    /// Damage dealt to a stand-in actor at `now_ms`.
    ///
    /// 1. Only active participants other than the owner may damage a stand-in.
    /// 2. The damage goes to the combat ledger before it is applied.
    /// 3. At zero health the kill is credited to the last attacker within the combat window,
    ///    or to this attacker, and the owner dies exactly as in a direct fight.
    pub fn on_damage(
        &mut self,
        actor: ActorId,
        attacker: ParticipantId,
        amount: f64,
        now_ms: u64,
    ) -> DamageVerdict {
        let Some(owner) = self.roster.owner_of(actor) else {
            return DamageVerdict::NotStandIn;
        };
        if attacker == owner
            || !self.registry.is_active(attacker)
            || !amount.is_finite()
            || amount <= 0.0
        {
            return DamageVerdict::Cancelled;
        }
        log::debug!("{} hit the stand-in of {} for {}", attacker, owner, amount);
        self.ctx.combat.record_damage(owner, attacker, amount, now_ms);
        let Some(applied) = self.roster.apply_damage(actor, amount) else {
            return DamageVerdict::Cancelled;
        };
        if !applied.defeated {
            return DamageVerdict::Absorbed {
                health_left: applied.health,
            };
        }

        let credited = self
            .ctx
            .combat
            .last_attacker(owner, now_ms)
            .or(Some(attacker));
        if let Some(stand_in) = self.roster.take(owner) {
            self.despawn(&stand_in, DespawnReason::ProxyDeath);
        }
        self.ctx.host.emit(TournamentEvent::StandInDefeated { owner, killer: credited });
        self.ctx.combat.clear(owner);
        self.on_death(owner, credited);
        DamageVerdict::Defeated { owner, credited }
    }

    /// A melee hit between two participants, before the host applies it.
    pub fn on_hit(&mut self, attacker: ParticipantId, victim: ParticipantId) -> HitVerdict {
        if attacker == victim || !self.is_in_battle(attacker) || !self.registry.is_active(victim) {
            return HitVerdict::Cancelled;
        }
        if self.ctx.config.group_mode {
            let own = self.registry.group_of(attacker);
            if own.is_some() && own == self.registry.group_of(victim) {
                return HitVerdict::Cancelled;
            }
        }
        let verdict = self.ctx.rules.on_hit(attacker, victim);
        if let HitVerdict::Absorbed { hits, needed } = verdict {
            self.tell(attacker, Notice::HitCount { hits, needed });
        }
        verdict
    }

    /// A timer went off. Wake-ups for timers that are no longer ours are dropped.
    pub fn on_timer(&mut self, fired: TimerFired) {
        log::debug!("timer {:?} fired for tournament {}", fired, self.id);
        if let TimerKind::DisconnectTimeout(participant) = fired.kind {
            self.disconnect_timeout(participant, fired);
            return;
        }
        if !self.timers.fire(&fired) {
            return;
        }
        match fired.kind {
            TimerKind::LobbyAnnouncement => self.lobby_announcement(),
            TimerKind::LobbyCountdown => self.lobby_countdown(),
            TimerKind::PreparationCountdown => self.preparation_countdown(),
            TimerKind::PreparationOver => self.preparation_over(),
            TimerKind::BorderShrink => self.shrink_border(),
            TimerKind::Expiration => {
                log::info!("Tournament {} expired", self.ctx.config.name);
                self.broadcast(Notice::GameExpired);
                self.finish(true);
            }
            TimerKind::NextDuel => self.start_next_duel(),
            TimerKind::DisconnectTimeout(_) => {}
        }
    }

    // ---- commands ----

    /// Remove a participant from play. Idempotent: returns whether anything changed.
    pub fn eliminate(&mut self, participant: ParticipantId, reason: EliminationReason) -> bool {
        log::debug!("eliminating {} ({})", participant, reason.as_str());
        if !self.registry.is_active(participant) || self.state.is_finished() {
            return false;
        }
        self.process_exit(participant, reason);
        true
    }

    pub fn cancel(&mut self, by: &str) -> Result<(), TournamentError> {
        if self.state.is_finished() {
            return Err(TournamentError::InvalidState);
        }
        log::info!("Tournament {} cancelled by {}", self.ctx.config.name, by);
        self.broadcast(Notice::Cancelled { by: by.to_string() });
        self.finish(true);
        Ok(())
    }

    // ---- lobby ----

    fn announce_lobby(&self, seconds: u64) {
        self.broadcast(Notice::StartingGame {
            seconds,
            minimum_groups: self.ctx.config.minimum_groups,
            minimum_players: self.ctx.config.minimum_players,
            groups: self.registry.live_groups().len(),
            players: self.registry.active_count(),
        });
    }

    fn lobby_announcement(&mut self) {
        if self.lobby_announcements_left == 0 {
            self.end_lobby();
            return;
        }
        let seconds =
            u64::from(self.lobby_announcements_left) * self.ctx.config.lobby.announcement_interval_secs;
        self.announce_lobby(seconds);
        self.lobby_announcements_left -= 1;
    }

    fn lobby_countdown(&mut self) {
        self.lobby_countdown_secs = self.lobby_countdown_secs.saturating_sub(1);
        self.broadcast(Notice::LobbyCountdown {
            seconds: self.lobby_countdown_secs,
        });
        if self.lobby_countdown_secs == 0 {
            self.timers
                .cancel_kind(self.ctx.scheduler.as_ref(), TimerKind::LobbyCountdown);
        }
    }

    /// Close the lobby and start the battle, or cancel.
    ///
    /// 1. The host may veto the battle start.
    /// 2. Minimum participants (and minimum groups in group mode) must have joined.
    /// 3. The rule set may move tail entrants to the spectators (power-of-two trim).
    /// 4. The expiration timer starts and the first duel is formed.
    fn end_lobby(&mut self) {
        if self.state != TournamentState::Lobby {
            return;
        }
        let scheduler = self.ctx.scheduler.clone();
        self.timers.cancel_kind(scheduler.as_ref(), TimerKind::LobbyAnnouncement);
        self.timers.cancel_kind(scheduler.as_ref(), TimerKind::LobbyCountdown);

        if !self.ctx.host.approve(Gate::BattleStart) {
            self.broadcast(Notice::Cancelled {
                by: "Server".to_string(),
            });
            self.finish(true);
            return;
        }
        let players = self.registry.active_count();
        let groups = self.registry.live_groups().len();
        let enough_groups = !self.ctx.config.group_mode || groups >= self.ctx.config.minimum_groups;
        if players < self.ctx.config.minimum_players || !enough_groups {
            log::info!(
                "Tournament {} cancelled: {} players, {} groups",
                self.ctx.config.name,
                players,
                groups
            );
            self.broadcast(Notice::NotEnoughParticipants);
            self.finish(true);
            return;
        }

        let pool = self.live_entrants();
        let trimmed = self.ctx.rules.on_lobby_end(&pool, &self.ctx.config);
        for entrant in trimmed {
            for member in self.live_members(entrant) {
                self.registry.retire(member, RemovalReason::Trimmed);
                self.tell(member, Notice::KickedToAdjustDuels);
            }
        }

        log::info!(
            "Tournament {} battle started with {} participants ({} rule set)",
            self.ctx.config.name,
            self.registry.active_count(),
            self.ctx.rules.name()
        );
        self.ctx.host.emit(TournamentEvent::BattleStarted {
            tournament: self.ctx.config.name.clone(),
        });
        let expiration_ms = secs_to_ms(self.ctx.config.expiration_secs);
        self.timers
            .once(scheduler.as_ref(), TimerKind::Expiration, expiration_ms);
        self.start_next_duel();
    }

    // ---- duels ----

    /// Form the next duel, teleport its fighters and start the preparation countdown.
    fn start_next_duel(&mut self) {
        if self.state.is_finished() {
            return;
        }
        self.between_duels = false;
        let live = self.live_entrants();
        let (duel, round) = match self.bracket.next_duel(&live, &mut self.rng) {
            NextDuel::Finished => {
                self.finish(false);
                return;
            }
            NextDuel::Ready { duel, round } => (duel, round),
        };

        match round {
            Some(Round::ThirdPlace { revived }) => {
                self.broadcast(Notice::BattleForThirdPlace);
                for entrant in revived {
                    for member in self.third_place_members.remove(&entrant).unwrap_or_default() {
                        self.registry.revive(member);
                    }
                }
            }
            Some(Round::Final { third_by_default }) => {
                self.broadcast(Notice::FinalBattle);
                if let Some(third) = third_by_default {
                    self.third_place_members.remove(&third);
                }
            }
            Some(Round::Regular) | None => {}
        }

        let entrances = self.ctx.config.locations.arena_entrances.clone();
        let mut fighters = Vec::new();
        for (i, entrant) in duel.opponents.iter().enumerate() {
            let members = self.live_members(*entrant);
            if !entrances.is_empty() {
                let entrance = &entrances[i % entrances.len()];
                for member in &members {
                    self.teleport(*member, entrance);
                }
            }
            fighters.extend(members);
        }
        log::info!(
            "Duel {} ({:?}) starting with {} fighters",
            duel.id,
            duel.kind,
            fighters.len()
        );

        let mut waiting: Vec<ParticipantId> = self
            .registry
            .active_ids()
            .into_iter()
            .filter(|p| !fighters.contains(p))
            .collect();
        waiting.extend(self.third_place_members.values().flatten().copied());
        if !waiting.is_empty() {
            self.ctx
                .host
                .notify(Audience::Participants(waiting), Notice::WaitForYourTurn);
        }
        self.start_preparation();
    }

    fn start_preparation(&mut self) {
        self.state = TournamentState::Preparation;
        self.start_border();
        let secs = self.ctx.config.preparation_secs;
        if secs == 0 {
            self.preparation_over();
            return;
        }
        self.preparation_countdown = secs;
        let scheduler = self.ctx.scheduler.clone();
        self.timers
            .repeating(scheduler.as_ref(), TimerKind::PreparationCountdown, 0, 1000);
        self.timers
            .once(scheduler.as_ref(), TimerKind::PreparationOver, secs_to_ms(secs));
    }

    fn preparation_countdown(&mut self) {
        let fighters = self.current_fighters();
        let seconds = self.preparation_countdown;
        if seconds == 0 {
            self.ctx.host.notify(Audience::Participants(fighters), Notice::Fight);
            self.timers
                .cancel_kind(self.ctx.scheduler.as_ref(), TimerKind::PreparationCountdown);
            return;
        }
        self.ctx
            .host
            .notify(Audience::Participants(fighters), Notice::Countdown { seconds });
        self.preparation_countdown -= 1;
    }

    fn preparation_over(&mut self) {
        if self.state != TournamentState::Preparation {
            return;
        }
        self.timers
            .cancel_kind(self.ctx.scheduler.as_ref(), TimerKind::PreparationCountdown);
        let fighters = self.current_fighters();
        self.ctx
            .host
            .notify(Audience::Participants(fighters.clone()), Notice::PreparationOver);
        let commands = self.ctx.config.commands_before_battle.clone();
        self.run_commands(&commands, &fighters);
        self.state = TournamentState::Battle;
    }

    fn start_border(&mut self) {
        let scheduler = self.ctx.scheduler.clone();
        self.timers.cancel_kind(scheduler.as_ref(), TimerKind::BorderShrink);
        let Some(border) = self.ctx.config.border.clone() else {
            return;
        };
        self.border_size = Some(border.initial_size);
        if let Err(e) = self
            .ctx
            .host
            .set_border(&border.center, border.initial_size, border.damage)
        {
            log::warn!("Could not set the arena border: {}", e);
        }
        if border.initial_size > border.final_size && border.shrink_size > 0 {
            let interval_ms = secs_to_ms(border.interval_secs);
            self.timers
                .repeating(scheduler.as_ref(), TimerKind::BorderShrink, interval_ms, interval_ms);
        }
    }

    fn shrink_border(&mut self) {
        let (Some(border), Some(current)) = (self.ctx.config.border.clone(), self.border_size) else {
            return;
        };
        let size = next_border_size(current, border.shrink_size, border.final_size);
        self.border_size = Some(size);
        if let Err(e) = self.ctx.host.set_border(&border.center, size, border.damage) {
            log::warn!("Could not shrink the arena border: {}", e);
        }
        self.ctx
            .host
            .notify(Audience::Participants(self.current_fighters()), Notice::BorderShrinking);
        if size <= border.final_size || size == current {
            self.timers
                .cancel_kind(self.ctx.scheduler.as_ref(), TimerKind::BorderShrink);
        }
    }

    fn stop_duel_timers(&mut self) {
        let scheduler = self.ctx.scheduler.clone();
        self.timers.cancel_kind(scheduler.as_ref(), TimerKind::PreparationCountdown);
        self.timers.cancel_kind(scheduler.as_ref(), TimerKind::PreparationOver);
        if self.border_size.take().is_some() {
            self.timers.cancel_kind(scheduler.as_ref(), TimerKind::BorderShrink);
            if let Err(e) = self.ctx.host.reset_border() {
                log::warn!("Could not reset the arena border: {}", e);
            }
        }
    }

    // ---- exits ----

    /// Take an active participant out of play and advance the bracket if that decided something.
    fn process_exit(&mut self, participant: ParticipantId, reason: EliminationReason) {
        let Some(elimination) = self.registry.eliminate(participant, reason) else {
            return;
        };
        if let Some(stand_in) = self.roster.take(participant) {
            self.despawn(&stand_in, DespawnReason::Eliminated);
        }
        self.ctx.continuity.clear_player(participant);
        self.ctx.combat.clear(participant);
        self.teleport_to_exit(participant);
        self.ctx.host.emit(TournamentEvent::PlayerExited { participant });
        if self.state == TournamentState::Lobby {
            return;
        }

        let commands = self.ctx.config.commands_after_battle.clone();
        self.run_commands(&commands, &[participant]);
        if let Some(group) = elimination.group_defeated {
            let name = self
                .registry
                .group_name(group)
                .unwrap_or_else(|| group.to_string());
            log::info!("Group {} was defeated", name);
            self.broadcast(Notice::GroupDefeated { group: name });
            self.ctx.host.emit(TournamentEvent::GroupDefeated {
                group,
                last_member: participant,
            });
        }
        self.handle_loss(participant, elimination);
        if !self.state.is_finished() {
            self.announce_remaining_opponents();
        }
    }

    /// Feed an exit to the bracket. In group mode only a defeated group loses.
    fn handle_loss(&mut self, participant: ParticipantId, elimination: Elimination) {
        if self.state.is_finished() {
            return;
        }
        let entrant = if self.ctx.config.group_mode {
            match elimination.group_defeated {
                Some(group) => Entrant::Group(group),
                None => return,
            }
        } else {
            Entrant::Participant(participant)
        };

        if !self.duel_running() {
            self.bracket.withdraw(entrant);
            if self.live_entrants().len() <= 1 {
                self.start_next_duel();
            }
            return;
        }
        let outcome = self.bracket.record_loss(entrant);
        if outcome.queued_for_third {
            let members = self.third_place_candidates(entrant);
            if members.is_empty() {
                self.bracket.drop_from_third_place_queue(entrant);
            } else {
                self.ctx.host.notify(
                    Audience::Participants(members.clone()),
                    Notice::WaitForThirdPlace,
                );
                self.third_place_members.insert(entrant, members);
            }
        }
        match outcome.decided {
            Some(decided) => self.duel_decided(decided),
            None if self.live_entrants().len() <= 1 => self.start_next_duel(),
            None => {}
        }
    }

    /// The winners of a decided duel are healed and moved on; the next duel follows after a delay.
    fn duel_decided(&mut self, decided: DecidedDuel) {
        log::info!("{:?} beat {:?} ({:?})", decided.winner, decided.loser, decided.kind);
        self.between_duels = true;
        self.stop_duel_timers();

        let winners = self.live_members(decided.winner);
        let commands = self.ctx.config.commands_after_battle.clone();
        for winner in &winners {
            self.heal(*winner);
        }
        self.run_commands(&commands, &winners);
        match decided.kind {
            DuelKind::ThirdPlace => {
                for winner in &winners {
                    self.teleport_to_exit(*winner);
                    self.registry.retire(*winner, RemovalReason::Placed);
                }
            }
            DuelKind::Regular => {
                if let Some(lobby) = self.ctx.config.locations.lobby.clone() {
                    for winner in &winners {
                        self.teleport(*winner, &lobby);
                    }
                }
            }
            DuelKind::Final => {}
        }

        if decided.kind == DuelKind::Final || self.live_entrants().len() <= 1 {
            self.start_next_duel();
            return;
        }
        let delay = self.ctx.config.next_duel_delay_ms;
        let scheduler = self.ctx.scheduler.clone();
        self.timers.cancel_kind(scheduler.as_ref(), TimerKind::NextDuel);
        self.timers.once(scheduler.as_ref(), TimerKind::NextDuel, delay);
    }

    /// Who comes back for the third-place duel: the participant, or the group members who fell
    /// fighting.
    fn third_place_candidates(&self, entrant: Entrant) -> Vec<ParticipantId> {
        match entrant {
            Entrant::Participant(p) => vec![p],
            Entrant::Group(group) => {
                let fallen: Vec<&Participant> = self
                    .registry
                    .members_of_group(group)
                    .into_iter()
                    .filter(|p| p.is_casualty())
                    .collect();
                let killed: Vec<ParticipantId> = fallen
                    .iter()
                    .filter(|p| {
                        p.status
                            == ParticipantStatus::Casualty {
                                reason: EliminationReason::Killed,
                            }
                    })
                    .map(|p| p.id)
                    .collect();
                if killed.is_empty() {
                    fallen.iter().map(|p| p.id).collect()
                } else {
                    killed
                }
            }
        }
    }

    /// A participant waiting for the third-place duel is gone. Returns whether they were queued.
    fn drop_queued_member(&mut self, participant: ParticipantId, reason: EliminationReason) -> bool {
        let Some(entrant) = self
            .third_place_members
            .iter()
            .find(|(_, members)| members.contains(&participant))
            .map(|(e, _)| *e)
        else {
            return false;
        };
        self.registry.mark_casualty(participant, reason);
        let emptied = match self.third_place_members.get_mut(&entrant) {
            Some(members) => {
                members.retain(|m| *m != participant);
                members.is_empty()
            }
            None => false,
        };
        if emptied {
            log::info!("{:?} dropped out of the third-place queue", entrant);
            self.third_place_members.remove(&entrant);
            self.bracket.drop_from_third_place_queue(entrant);
        }
        true
    }

    fn disconnect_timeout(&mut self, participant: ParticipantId, fired: TimerFired) {
        if !self.ctx.continuity.claim_timeout(participant, fired.id) {
            return;
        }
        log::info!("{} did not come back in time", self.registry.name_of(participant));
        if let Some(stand_in) = self.roster.take(participant) {
            self.despawn(&stand_in, DespawnReason::Timeout);
        }
        self.eliminate(participant, EliminationReason::Timeout);
    }

    fn announce_remaining_opponents(&self) {
        for participant in self.registry.active_ids() {
            self.tell(
                participant,
                Notice::RemainingOpponents {
                    players: self.registry.remaining_opponent_count(),
                    groups: self.registry.remaining_opponent_groups(participant),
                },
            );
        }
    }

    // ---- finish ----

    /// Tear everything down. Idempotent.
    ///
    /// 1. Every timer is cancelled once and every stand-in despawned.
    /// 2. Ledgers of all participants are cleared; remaining participants leave the arena.
    /// 3. Winners are processed unless the run was cancelled before any duel was decided.
    fn finish(&mut self, cancelled: bool) {
        if self.state.is_finished() {
            return;
        }
        self.state = TournamentState::Finished { cancelled };
        self.timers.cancel_all(self.ctx.scheduler.as_ref());
        for owner in self.roster.owners() {
            if let Some(stand_in) = self.roster.take(owner) {
                self.despawn(&stand_in, DespawnReason::MatchEnd);
            }
        }
        self.ctx.continuity.clear_all();
        self.ctx.combat.clear_all();
        let remaining = self.registry.active_ids();
        for participant in &remaining {
            self.teleport_to_exit(*participant);
        }
        let commands = self.ctx.config.commands_after_battle.clone();
        self.run_commands(&commands, &remaining);
        if let Err(e) = self.ctx.host.reset_border() {
            log::warn!("Could not reset the arena border: {}", e);
        }
        self.border_size = None;

        if !cancelled || self.bracket.decided_duels() > 0 {
            self.process_winners(cancelled);
        }
        log::info!(
            "Tournament {} finished (cancelled: {})",
            self.ctx.config.name,
            cancelled
        );
        self.ctx
            .host
            .emit(TournamentEvent::TournamentFinished { cancelled });
    }

    fn process_winners(&mut self, cancelled: bool) {
        let placements = self.bracket.placements().clone();
        let group_of = |e: Option<Entrant>| match e {
            Some(Entrant::Group(g)) => Some(g),
            _ => None,
        };
        let standings = Standings {
            first: self.placement_members(placements.first),
            first_group: group_of(placements.first),
            second: self.placement_members(placements.second),
            second_group: group_of(placements.second),
            third: self.placement_members(placements.third),
            third_group: group_of(placements.third),
            killer: self.registry.best_killer(),
        };

        for grant in self.ctx.rules.process_winners(&standings) {
            let award = self.award_for(&grant);
            if let Err(e) = self.ctx.host.give_prize(&award) {
                log::warn!("Could not give the {:?} prize: {}", grant.tier, e);
            }
        }
        for winner in &standings.first {
            self.registry.record_victory(*winner);
        }
        if let Some(group) = standings.first_group {
            self.ctx.host.emit(TournamentEvent::GroupWon { group });
        }
        if !standings.first.is_empty() {
            self.ctx.host.emit(TournamentEvent::PlayerWon {
                winners: standings.first.clone(),
            });
        }

        let first = self.entrant_name(placements.first);
        let second = self.entrant_name(placements.second);
        let third = self.entrant_name(placements.third);
        self.broadcast(Notice::WhoWon {
            first: first.clone().unwrap_or_else(|| "nobody".to_string()),
            second: second.clone().unwrap_or_else(|| "nobody".to_string()),
            third: third.clone().unwrap_or_else(|| "nobody".to_string()),
        });

        let record = PlacementRecord {
            tournament: self.ctx.config.name.clone(),
            first,
            second,
            third,
            killer: standings.killer.map(|(k, _)| self.registry.name_of(k)),
            killer_kills: standings.killer.map(|(_, kills)| kills),
            first_group: standings
                .first_group
                .and_then(|g| self.registry.group_name(g)),
            cancelled,
            finished_at: Utc::now(),
        };
        if let Err(e) = self.ctx.store.record_winners(&record) {
            log::warn!("Could not record the winners of {}: {}", record.tournament, e);
        }
    }

    /// Split winners into leaders and members when a group directory knows the group.
    fn award_for(&self, grant: &PrizeGrant) -> PrizeAward {
        let mut award = PrizeAward {
            tier: grant.tier,
            group: grant.group,
            leaders: Vec::new(),
            members: Vec::new(),
        };
        for winner in &grant.winners {
            let is_leader = match (grant.group, &self.ctx.groups) {
                (Some(group), Some(directory)) => directory.is_leader_or_officer(group, *winner),
                _ => false,
            };
            if is_leader {
                award.leaders.push(*winner);
            } else {
                award.members.push(*winner);
            }
        }
        award
    }

    // ---- helpers ----

    fn duel_running(&self) -> bool {
        matches!(
            self.state,
            TournamentState::Preparation | TournamentState::Battle
        ) && !self.between_duels
    }

    fn is_current_fighter(&self, participant: ParticipantId) -> bool {
        self.duel_running()
            && self.registry.is_active(participant)
            && self
                .entrant_of(participant)
                .map(|e| self.bracket.is_current(e))
                .unwrap_or(false)
    }

    fn entrant_of(&self, participant: ParticipantId) -> Option<Entrant> {
        if self.ctx.config.group_mode {
            self.registry.group_of(participant).map(Entrant::Group)
        } else {
            Some(Entrant::Participant(participant))
        }
    }

    /// Live entrants in join (or first appearance) order.
    fn live_entrants(&self) -> Vec<Entrant> {
        if self.ctx.config.group_mode {
            self.registry
                .live_groups()
                .into_iter()
                .map(Entrant::Group)
                .collect()
        } else {
            self.registry
                .active_ids()
                .into_iter()
                .map(Entrant::Participant)
                .collect()
        }
    }

    fn live_members(&self, entrant: Entrant) -> Vec<ParticipantId> {
        match entrant {
            Entrant::Participant(p) if self.registry.is_active(p) => vec![p],
            Entrant::Participant(_) => Vec::new(),
            Entrant::Group(group) => self
                .registry
                .active_ids()
                .into_iter()
                .filter(|p| self.registry.group_of(*p) == Some(group))
                .collect(),
        }
    }

    /// Everyone credited with a placement: fallen group members count, trimmed or departed ones don't.
    fn placement_members(&self, entrant: Option<Entrant>) -> Vec<ParticipantId> {
        match entrant {
            None => Vec::new(),
            Some(Entrant::Participant(p)) => vec![p],
            Some(Entrant::Group(group)) => self
                .registry
                .members_of_group(group)
                .into_iter()
                .filter(|p| {
                    !matches!(
                        p.status,
                        ParticipantStatus::Removed {
                            reason: RemovalReason::Trimmed | RemovalReason::Left
                        }
                    )
                })
                .map(|p| p.id)
                .collect(),
        }
    }

    fn entrant_name(&self, entrant: Option<Entrant>) -> Option<String> {
        match entrant? {
            Entrant::Participant(p) => Some(self.registry.name_of(p)),
            Entrant::Group(g) => Some(self.registry.group_name(g).unwrap_or_else(|| g.to_string())),
        }
    }

    fn kills_of(&self, participant: ParticipantId) -> u32 {
        self.registry
            .get(participant)
            .map(|p| p.stats.kills)
            .unwrap_or(0)
    }

    fn lookup_group(&self, participant: ParticipantId) -> Option<GroupRef> {
        let directory = self.ctx.groups.as_ref()?;
        match directory.group_of(participant) {
            Ok(group) => group,
            Err(e) => {
                log::warn!("Group lookup for {} failed: {}", participant, e);
                None
            }
        }
    }

    fn spawn_stand_in(&mut self, participant: ParticipantId) -> Result<ActorId, CollaboratorError> {
        let vitals = self.ctx.host.vitals(participant)?;
        let actor = self
            .ctx
            .stand_ins
            .spawn(participant, &vitals, &self.ctx.config.stand_in.appearance)?;
        let stand_in = StandInActor::new(participant, actor, vitals.location.clone(), vitals.health);
        if let Err(e) = self.roster.register(stand_in.clone()) {
            self.despawn(&stand_in, DespawnReason::Eliminated);
            return Err(CollaboratorError::new("stand-in", e.to_string()));
        }
        self.ctx.host.emit(TournamentEvent::StandInSpawned {
            owner: participant,
            actor,
            health: vitals.health,
        });
        let name = self.registry.name_of(participant);
        log::info!("{} disconnected mid-duel, {} stand-in {} took over", name, self.ctx.stand_ins.name(), actor);
        self.broadcast(Notice::StandInSpawned { name });
        Ok(actor)
    }

    fn despawn(&self, stand_in: &StandInActor, reason: DespawnReason) {
        if let Err(e) = self
            .ctx
            .stand_ins
            .despawn(stand_in.owner, stand_in.actor_id, reason)
        {
            log::warn!("Could not despawn stand-in {}: {}", stand_in.actor_id, e);
        }
        self.ctx.host.emit(TournamentEvent::StandInDespawned {
            owner: stand_in.owner,
            actor: stand_in.actor_id,
            reason,
        });
    }

    fn run_commands(&self, commands: &[String], participants: &[ParticipantId]) {
        if commands.is_empty() {
            return;
        }
        let names: Vec<String> = participants.iter().map(|p| self.registry.name_of(*p)).collect();
        for command in expand_commands(commands, &names) {
            if let Err(e) = self.ctx.host.run_command(&command) {
                log::warn!("Command '{}' failed: {}", command, e);
            }
        }
    }

    fn teleport(&self, participant: ParticipantId, destination: &Location) {
        if let Err(e) = self.ctx.host.teleport(participant, destination) {
            log::warn!("Could not teleport {} to {}: {}", participant, destination, e);
        }
    }

    fn teleport_to_exit(&self, participant: ParticipantId) {
        if let Some(exit) = &self.ctx.config.locations.exit {
            self.teleport(participant, exit);
        }
    }

    fn heal(&self, participant: ParticipantId) {
        if let Err(e) = self.ctx.host.heal(participant) {
            log::warn!("Could not heal {}: {}", participant, e);
        }
    }

    fn tell(&self, participant: ParticipantId, notice: Notice) {
        self.ctx.host.notify(Audience::Participant(participant), notice);
    }

    fn broadcast(&self, notice: Notice) {
        self.ctx.host.notify(Audience::Tournament, notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_shrinks_down_to_the_final_size() {
        assert_eq!(next_border_size(100, 30, 20), 70);
        assert_eq!(next_border_size(40, 30, 20), 20);
        assert_eq!(next_border_size(20, 30, 20), 20);
    }

    #[test]
    fn player_placeholder_runs_once_per_name() {
        let commands = vec!["give %player% bread".to_string(), "say done".to_string()];
        let names = vec!["ann".to_string(), "bob".to_string()];
        assert_eq!(
            expand_commands(&commands, &names),
            vec!["give ann bread", "give bob bread", "say done"]
        );
    }
}
