//! Shared fixtures: a recording host, a manual clock and a harness that drives one tournament.

#![allow(dead_code)]

use elimination_arena::adapters::{
    ArenaContext, ArenaHost, InMemoryGroupDirectory, MemoryPlacementStore, VirtualProvider,
};
use elimination_arena::logic::{
    CombatAttributionService, DisconnectContinuityService, JoinOutcome, JoinRequest,
    ManualScheduler, TournamentLifecycle,
};
use elimination_arena::models::{
    Audience, CollaboratorError, Gate, Location, Notice, ParticipantId, PrizeAward,
    TournamentConfig, TournamentEvent, TournamentState, Vitals, DEFAULT_MAX_HEALTH,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Host that remembers everything it was asked to do.
#[derive(Default)]
pub struct RecordingHost {
    pub notices: Mutex<Vec<(Audience, Notice)>>,
    pub events: Mutex<Vec<TournamentEvent>>,
    pub commands: Mutex<Vec<String>>,
    pub prizes: Mutex<Vec<PrizeAward>>,
    pub teleports: Mutex<Vec<(ParticipantId, Location)>>,
    pub restores: Mutex<Vec<(ParticipantId, Vitals)>>,
    pub borders: Mutex<Vec<u32>>,
    pub health: Mutex<HashMap<ParticipantId, f64>>,
    pub veto_lobby: AtomicBool,
    pub veto_battle: AtomicBool,
    pub vetoed_joins: Mutex<HashSet<ParticipantId>>,
    pub broken_teleports: Mutex<HashSet<ParticipantId>>,
}

impl RecordingHost {
    pub fn notices(&self) -> Vec<(Audience, Notice)> {
        self.notices.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<TournamentEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn prizes(&self) -> Vec<PrizeAward> {
        self.prizes.lock().unwrap().clone()
    }

    pub fn borders(&self) -> Vec<u32> {
        self.borders.lock().unwrap().clone()
    }

    pub fn count_notices(&self, pred: impl Fn(&Notice) -> bool) -> usize {
        self.notices.lock().unwrap().iter().filter(|(_, n)| pred(n)).count()
    }

    pub fn count_events(&self, pred: impl Fn(&TournamentEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    /// Notices addressed to exactly this participant.
    pub fn notices_to(&self, participant: ParticipantId) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| *a == Audience::Participant(participant))
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub fn last_teleport(&self, participant: ParticipantId) -> Option<Location> {
        self.teleports
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(p, _)| *p == participant)
            .map(|(_, l)| l.clone())
    }

    pub fn set_health(&self, participant: ParticipantId, health: f64) {
        self.health.lock().unwrap().insert(participant, health);
    }
}

impl ArenaHost for RecordingHost {
    fn approve(&self, gate: Gate) -> bool {
        match gate {
            Gate::LobbyStart => !self.veto_lobby.load(Ordering::SeqCst),
            Gate::BattleStart => !self.veto_battle.load(Ordering::SeqCst),
            Gate::Join(p) => !self.vetoed_joins.lock().unwrap().contains(&p),
        }
    }

    fn teleport(&self, participant: ParticipantId, destination: &Location) -> Result<(), CollaboratorError> {
        if self.broken_teleports.lock().unwrap().contains(&participant) {
            return Err(CollaboratorError::new("host", "teleport refused"));
        }
        self.teleports
            .lock()
            .unwrap()
            .push((participant, destination.clone()));
        Ok(())
    }

    fn vitals(&self, participant: ParticipantId) -> Result<Vitals, CollaboratorError> {
        let location = self
            .last_teleport(participant)
            .unwrap_or_else(|| location("arena-1"));
        let health = self
            .health
            .lock()
            .unwrap()
            .get(&participant)
            .copied()
            .unwrap_or(DEFAULT_MAX_HEALTH);
        Ok(Vitals { location, health })
    }

    fn restore(&self, participant: ParticipantId, vitals: &Vitals) -> Result<(), CollaboratorError> {
        self.restores
            .lock()
            .unwrap()
            .push((participant, vitals.clone()));
        Ok(())
    }

    fn heal(&self, participant: ParticipantId) -> Result<(), CollaboratorError> {
        self.health.lock().unwrap().insert(participant, DEFAULT_MAX_HEALTH);
        Ok(())
    }

    fn run_command(&self, command: &str) -> Result<(), CollaboratorError> {
        self.commands.lock().unwrap().push(command.to_string());
        Ok(())
    }

    fn set_border(&self, _center: &Location, size: u32, _damage: f64) -> Result<(), CollaboratorError> {
        self.borders.lock().unwrap().push(size);
        Ok(())
    }

    fn reset_border(&self) -> Result<(), CollaboratorError> {
        Ok(())
    }

    fn give_prize(&self, award: &PrizeAward) -> Result<(), CollaboratorError> {
        self.prizes.lock().unwrap().push(award.clone());
        Ok(())
    }

    fn notify(&self, audience: Audience, notice: Notice) {
        self.notices.lock().unwrap().push((audience, notice));
    }

    fn emit(&self, event: TournamentEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn location(name: &str) -> Location {
    Location::new(name, 0.0, 64.0, 0.0)
}

/// Solo config with every location set, a fixed shuffle seed and short timers.
pub fn base_config() -> TournamentConfig {
    let mut config = TournamentConfig::default();
    config.name = "spring cup".to_string();
    config.locations.lobby = Some(location("lobby"));
    config.locations.exit = Some(location("exit"));
    config.locations.arena_entrances = vec![location("arena-1"), location("arena-2")];
    config.preparation_secs = 3;
    config.next_duel_delay_ms = 500;
    config.shuffle_seed = Some(7);
    config
}

/// One tournament wired to recording and in-memory collaborators on a manual clock.
pub struct Harness {
    pub scheduler: Arc<ManualScheduler>,
    pub host: Arc<RecordingHost>,
    pub stand_ins: Arc<VirtualProvider>,
    pub store: Arc<MemoryPlacementStore>,
    pub groups: Arc<InMemoryGroupDirectory>,
    pub continuity: Arc<DisconnectContinuityService>,
    pub combat: Arc<CombatAttributionService>,
    pub tournament: TournamentLifecycle,
}

/// Collaborators before the tournament exists, for tests that need to tweak them first.
pub struct Parts {
    pub scheduler: Arc<ManualScheduler>,
    pub host: Arc<RecordingHost>,
    pub stand_ins: Arc<VirtualProvider>,
    pub store: Arc<MemoryPlacementStore>,
    pub groups: Arc<InMemoryGroupDirectory>,
}

impl Parts {
    pub fn new() -> Self {
        Self {
            scheduler: Arc::new(ManualScheduler::new()),
            host: Arc::new(RecordingHost::default()),
            stand_ins: Arc::new(VirtualProvider::new()),
            store: Arc::new(MemoryPlacementStore::new()),
            groups: Arc::new(InMemoryGroupDirectory::new()),
        }
    }

    pub fn context(&self, config: TournamentConfig) -> ArenaContext {
        ArenaContext::new(config, self.scheduler.clone(), self.host.clone())
            .with_groups(self.groups.clone())
            .with_stand_ins(self.stand_ins.clone())
            .with_store(self.store.clone())
    }

    pub fn start(self, config: TournamentConfig) -> Harness {
        let ctx = self.context(config);
        self.launch(ctx)
    }

    /// Start a tournament from a hand-built context sharing these parts' clock and host.
    pub fn launch(self, ctx: ArenaContext) -> Harness {
        let continuity = ctx.continuity.clone();
        let combat = ctx.combat.clone();
        let tournament = TournamentLifecycle::start(ctx).unwrap();
        Harness {
            scheduler: self.scheduler,
            host: self.host,
            stand_ins: self.stand_ins,
            store: self.store,
            groups: self.groups,
            continuity,
            combat,
            tournament,
        }
    }
}

/// Group-mode harness: each `(name, size)` becomes a group whose members join in order,
/// named `<group>1`, `<group>2`... The first member of each group leads it.
pub fn group_harness(groups: &[(&str, usize)]) -> (Harness, Vec<Vec<ParticipantId>>) {
    let parts = Parts::new();
    let mut config = base_config();
    config.group_mode = true;
    let mut members = Vec::new();
    for (name, size) in groups {
        let group = parts.groups.create_group(*name);
        let ids: Vec<ParticipantId> = (0..*size).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            if i == 0 {
                parts.groups.add_leader(group, *id);
            } else {
                parts.groups.add_member(group, *id);
            }
        }
        members.push(ids);
    }
    let mut h = parts.start(config);
    for ((name, _), ids) in groups.iter().zip(&members) {
        for (i, id) in ids.iter().enumerate() {
            h.join_with(*id, &format!("{}{}", name, i + 1));
        }
    }
    (h, members)
}

impl Harness {
    pub fn new(config: TournamentConfig) -> Self {
        Parts::new().start(config)
    }

    /// Move the clock, delivering every timer that comes due to the tournament.
    pub fn advance(&mut self, ms: u64) {
        let scheduler = self.scheduler.clone();
        let tournament = &mut self.tournament;
        scheduler.advance(ms, |fired| tournament.on_timer(fired));
    }

    pub fn join(&mut self, name: &str) -> ParticipantId {
        self.join_with(Uuid::new_v4(), name)
    }

    pub fn join_with(&mut self, id: ParticipantId, name: &str) -> ParticipantId {
        let outcome = self.tournament.on_join(JoinRequest {
            id,
            name: name.to_string(),
            ..JoinRequest::default()
        });
        assert_eq!(outcome, JoinOutcome::Joined, "{} could not join", name);
        id
    }

    pub fn join_many(&mut self, n: usize) -> Vec<ParticipantId> {
        (1..=n).map(|i| self.join(&format!("P{i}"))).collect()
    }

    /// Let the lobby run out.
    pub fn close_lobby(&mut self) {
        let total = self.tournament.config().lobby.total_secs() * 1000;
        self.advance(total);
    }

    /// Step the clock until `done` holds. Panics after ten simulated minutes.
    pub fn run_until(&mut self, done: impl Fn(&TournamentLifecycle) -> bool) {
        for _ in 0..6000 {
            if done(&self.tournament) {
                return;
            }
            self.advance(100);
        }
        panic!("condition not reached, state {:?}", self.tournament.state());
    }

    /// Step until the current duel is fighting.
    pub fn run_until_fight(&mut self) {
        self.run_until(|t| {
            t.state() == TournamentState::Battle
                && t.current_fighters().iter().any(|p| t.is_in_battle(*p))
        });
    }

    /// The two fighters of a solo duel, in duel order.
    pub fn duel(&self) -> (ParticipantId, ParticipantId) {
        let fighters = self.tournament.current_fighters();
        assert_eq!(fighters.len(), 2, "expected a solo duel, got {:?}", fighters);
        (fighters[0], fighters[1])
    }

    /// Fight the current solo duel out: the first fighter kills the second.
    pub fn fight(&mut self) -> (ParticipantId, ParticipantId) {
        self.run_until_fight();
        let (winner, loser) = self.duel();
        self.tournament.on_death(loser, Some(winner));
        (winner, loser)
    }

    pub fn name(&self, participant: ParticipantId) -> String {
        self.tournament.registry().name_of(participant)
    }
}
