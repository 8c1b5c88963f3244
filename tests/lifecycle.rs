//! Integration tests for the tournament lifecycle: lobby, preparation, battle, finish.

mod common;

use common::{base_config, group_harness, location, Harness, Parts};
use elimination_arena::adapters::ArenaContext;
use elimination_arena::logic::{
    DisconnectOutcome, EliminationRules, HitVerdict, JoinOutcome, JoinRejection, JoinRequest,
    PrizeGrant, RuleSet, Standings, TournamentLifecycle,
};
use elimination_arena::models::{
    Audience, BorderConfig, EliminationReason, Entrant, Notice, ParticipantStatus, PrizeTier,
    RemovalReason, RuleKind, TournamentError, TournamentEvent, TournamentState,
};
use std::sync::atomic::Ordering;
use uuid::Uuid;

fn request(name: &str) -> JoinRequest {
    JoinRequest {
        id: Uuid::new_v4(),
        name: name.to_string(),
        ..JoinRequest::default()
    }
}

fn countdowns(h: &Harness) -> Vec<u64> {
    h.host
        .notices()
        .into_iter()
        .filter_map(|(_, n)| match n {
            Notice::Countdown { seconds } => Some(seconds),
            _ => None,
        })
        .collect()
}

#[test]
fn start_refuses_missing_locations() {
    let parts = Parts::new();
    let mut config = base_config();
    config.locations.exit = None;
    assert!(matches!(
        TournamentLifecycle::start(parts.context(config)),
        Err(TournamentError::MissingLocations)
    ));
}

#[test]
fn group_mode_needs_a_group_directory() {
    let parts = Parts::new();
    let mut config = base_config();
    config.group_mode = true;
    let ctx = ArenaContext::new(config, parts.scheduler.clone(), parts.host.clone());
    assert!(matches!(
        TournamentLifecycle::start(ctx),
        Err(TournamentError::GroupProviderUnavailable)
    ));
    assert_eq!(parts.scheduler.pending(), 0);
}

#[test]
fn start_validates_config_and_honours_the_lobby_veto() {
    let parts = Parts::new();
    let mut config = base_config();
    config.minimum_players = 1;
    assert!(matches!(
        TournamentLifecycle::start(parts.context(config)),
        Err(TournamentError::InvalidConfig(_))
    ));

    let mut config = base_config();
    config.expiration_secs = u64::MAX / 100;
    assert!(matches!(
        TournamentLifecycle::start(parts.context(config)),
        Err(TournamentError::InvalidConfig(_))
    ));
    assert_eq!(parts.scheduler.pending(), 0);

    parts.host.veto_lobby.store(true, Ordering::SeqCst);
    assert!(matches!(
        TournamentLifecycle::start(parts.context(base_config())),
        Err(TournamentError::LobbyVetoed)
    ));
    assert!(parts.host.events().is_empty());
}

#[test]
fn join_policy_rejections() {
    let parts = Parts::new();
    let mut config = base_config();
    config.minimum_playtime_secs = 3600;
    let host = parts.host.clone();
    let mut h = parts.start(config);

    let mut newbie = request("newbie");
    newbie.playtime_secs = 600;
    assert_eq!(
        h.tournament.on_join(newbie.clone()),
        JoinOutcome::Rejected(JoinRejection::NotEnoughPlaytime { missing_secs: 3000 })
    );
    assert!(host.notices_to(newbie.id).contains(&Notice::NotEnoughPlaytime {
        missing: "50m 00s".to_string()
    }));
    newbie.bypass_playtime = true;
    assert_eq!(h.tournament.on_join(newbie.clone()), JoinOutcome::Joined);
    assert_eq!(
        h.tournament.on_join(newbie),
        JoinOutcome::Rejected(JoinRejection::AlreadyJoined)
    );

    let mut old_client = request("old client");
    old_client.playtime_secs = 7200;
    old_client.version_blocked = true;
    assert_eq!(
        h.tournament.on_join(old_client),
        JoinOutcome::Rejected(JoinRejection::VersionBlocked)
    );

    let mut banned = request("banned");
    banned.playtime_secs = 7200;
    host.vetoed_joins.lock().unwrap().insert(banned.id);
    assert_eq!(
        h.tournament.on_join(banned),
        JoinOutcome::Rejected(JoinRejection::Vetoed)
    );

    let mut stuck = request("stuck");
    stuck.playtime_secs = 7200;
    host.broken_teleports.lock().unwrap().insert(stuck.id);
    assert_eq!(
        h.tournament.on_join(stuck.clone()),
        JoinOutcome::Rejected(JoinRejection::TeleportFailed)
    );
    assert!(!h.tournament.registry().contains(stuck.id));
    assert_eq!(h.tournament.registry().active_count(), 1);
}

#[test]
fn group_mode_rejects_participants_without_a_group() {
    let (mut h, _) = group_harness(&[("red", 1), ("blue", 1)]);
    assert_eq!(
        h.tournament.on_join(request("loner")),
        JoinOutcome::Rejected(JoinRejection::NoGroup)
    );
}

#[test]
fn reaching_the_maximum_closes_the_lobby_early() {
    let mut config = base_config();
    config.maximum_players = 2;
    let mut h = Harness::new(config);
    h.join_many(2);
    assert_eq!(h.tournament.state(), TournamentState::Preparation);
    assert_eq!(
        h.tournament.on_join(request("late")),
        JoinOutcome::Rejected(JoinRejection::NotInLobby)
    );
}

#[test]
fn lobby_announces_then_cancels_without_enough_players() {
    let mut h = Harness::new(base_config());
    h.join("P1");
    h.close_lobby();

    assert_eq!(
        h.host
            .count_notices(|n| matches!(n, Notice::StartingGame { .. })),
        4
    );
    assert_eq!(h.tournament.state(), TournamentState::Finished { cancelled: true });
    assert_eq!(
        h.host
            .count_notices(|n| *n == Notice::NotEnoughParticipants),
        1
    );
    assert_eq!(h.scheduler.pending(), 0);
    assert_eq!(h.tournament.live_timers(), 0);
    assert!(h.store.records().is_empty());
}

#[test]
fn host_can_veto_the_battle() {
    let mut h = Harness::new(base_config());
    h.join_many(2);
    h.host.veto_battle.store(true, Ordering::SeqCst);
    h.close_lobby();
    assert_eq!(h.tournament.state(), TournamentState::Finished { cancelled: true });
    assert!(h.host.notices().contains(&(
        Audience::Tournament,
        Notice::Cancelled {
            by: "Server".to_string()
        }
    )));
}

#[test]
fn group_mode_needs_enough_groups() {
    let (mut h, _) = group_harness(&[("red", 3)]);
    h.close_lobby();
    assert_eq!(h.tournament.state(), TournamentState::Finished { cancelled: true });
    assert_eq!(
        h.host
            .count_notices(|n| *n == Notice::NotEnoughParticipants),
        1
    );
}

#[test]
fn preparation_counts_down_then_runs_commands() {
    let mut config = base_config();
    config.commands_before_battle = vec!["effect %player% speed".to_string(), "say go".to_string()];
    let mut h = Harness::new(config);
    let ids = h.join_many(2);
    h.close_lobby();

    assert_eq!(h.tournament.state(), TournamentState::Preparation);
    assert_eq!(countdowns(&h), vec![3]);
    assert!(ids.iter().all(|p| !h.tournament.is_in_battle(*p)));

    h.advance(3_000);
    assert_eq!(countdowns(&h), vec![3, 2, 1]);
    assert_eq!(h.host.count_notices(|n| *n == Notice::Fight), 1);
    assert_eq!(h.tournament.state(), TournamentState::Battle);
    assert!(ids.iter().all(|p| h.tournament.is_in_battle(*p)));

    let commands = h.host.commands();
    assert!(commands.contains(&"effect P1 speed".to_string()));
    assert!(commands.contains(&"effect P2 speed".to_string()));
    assert_eq!(commands.iter().filter(|c| *c == "say go").count(), 1);
}

#[test]
fn fighters_are_sent_to_the_entrances_in_turn() {
    let mut h = Harness::new(base_config());
    h.join_many(2);
    h.run_until_fight();
    let (a, b) = h.duel();
    assert_eq!(h.host.last_teleport(a), Some(location("arena-1")));
    assert_eq!(h.host.last_teleport(b), Some(location("arena-2")));
}

#[test]
fn only_current_fighters_are_in_battle() {
    let mut h = Harness::new(base_config());
    let ids = h.join_many(3);
    h.run_until_fight();
    let (a, b) = h.duel();
    let waiting = ids.into_iter().find(|p| *p != a && *p != b).unwrap();

    assert!(h.tournament.is_in_battle(a));
    assert!(h.tournament.is_in_battle(b));
    assert!(!h.tournament.is_in_battle(waiting));
    assert_eq!(h.tournament.on_hit(waiting, a), HitVerdict::Cancelled);
    assert_eq!(h.tournament.on_hit(a, b), HitVerdict::Allowed);
}

#[test]
fn hit_count_rules_absorb_hits_until_the_count_is_reached() {
    let mut config = base_config();
    config.rules = RuleKind::HitCount { hit_amount: 3 };
    let mut h = Harness::new(config);
    h.join_many(2);
    h.close_lobby();
    let (a, b) = h.duel();
    assert_eq!(h.tournament.on_hit(a, b), HitVerdict::Cancelled);

    h.run_until_fight();
    assert_eq!(h.tournament.on_hit(a, b), HitVerdict::Absorbed { hits: 1, needed: 3 });
    assert_eq!(h.tournament.on_hit(a, b), HitVerdict::Absorbed { hits: 2, needed: 3 });
    assert_eq!(h.tournament.on_hit(b, a), HitVerdict::Absorbed { hits: 1, needed: 3 });
    assert_eq!(h.tournament.on_hit(a, b), HitVerdict::Lethal);
    assert_eq!(
        h.host
            .notices_to(a)
            .iter()
            .filter(|n| matches!(n, Notice::HitCount { .. }))
            .count(),
        2
    );
}

#[test]
fn group_members_cannot_hit_each_other() {
    let (mut h, members) = group_harness(&[("red", 2), ("blue", 2)]);
    h.run_until_fight();
    assert_eq!(h.tournament.current_fighters().len(), 4);
    assert_eq!(h.tournament.on_hit(members[0][0], members[0][1]), HitVerdict::Cancelled);
    assert_eq!(h.tournament.on_hit(members[0][0], members[1][0]), HitVerdict::Allowed);
}

#[test]
fn leaving_the_lobby_allows_rejoining() {
    let mut h = Harness::new(base_config());
    let p = h.join("P1");
    assert!(h.tournament.on_leave(p));
    assert_eq!(
        h.tournament.registry().get(p).unwrap().status,
        ParticipantStatus::Removed {
            reason: RemovalReason::Left
        }
    );
    assert_eq!(h.host.last_teleport(p), Some(location("exit")));
    assert_eq!(h.tournament.registry().active_count(), 0);

    h.join_with(p, "P1");
    assert!(h.tournament.registry().is_active(p));
}

#[test]
fn a_fighter_leaving_mid_duel_loses_it() {
    let mut h = Harness::new(base_config());
    h.join_many(2);
    h.run_until_fight();
    let (a, b) = h.duel();
    assert!(h.tournament.on_leave(a));
    assert_eq!(h.tournament.placements().first, Some(Entrant::Participant(b)));
    assert_eq!(
        h.host
            .count_notices(|n| matches!(n, Notice::DiedByHimself { .. })),
        1
    );
}

#[test]
fn eliminate_is_idempotent() {
    let mut h = Harness::new(base_config());
    let ids = h.join_many(3);
    h.run_until_fight();
    let (a, b) = h.duel();
    let waiting = ids.into_iter().find(|p| *p != a && *p != b).unwrap();
    let reason = EliminationReason::Other("admin".to_string());

    assert!(h.tournament.eliminate(waiting, reason.clone()));
    let events = h.host.events().len();
    let commands = h.host.commands().len();
    assert!(!h.tournament.eliminate(waiting, reason.clone()));
    assert_eq!(h.host.events().len(), events);
    assert_eq!(h.host.commands().len(), commands);
    assert_eq!(
        h.tournament.registry().get(waiting).unwrap().status,
        ParticipantStatus::Casualty { reason }
    );

    // the bye is gone, so the running duel is now the final
    h.fight();
    assert_eq!(h.tournament.state(), TournamentState::Finished { cancelled: false });
    assert_eq!(h.tournament.placements().third, None);
}

#[test]
fn expiry_without_a_decided_duel_names_no_winners() {
    let mut config = base_config();
    config.expiration_secs = 60;
    let mut h = Harness::new(config);
    h.join_many(2);
    h.run_until_fight();
    h.advance(60_000);

    assert_eq!(h.tournament.state(), TournamentState::Finished { cancelled: true });
    assert_eq!(h.host.count_notices(|n| *n == Notice::GameExpired), 1);
    assert_eq!(
        h.host
            .count_notices(|n| matches!(n, Notice::WhoWon { .. })),
        0
    );
    assert!(h.store.records().is_empty());
    assert_eq!(
        h.host.count_events(|e| *e == TournamentEvent::TournamentFinished { cancelled: true }),
        1
    );
}

#[test]
fn expiry_after_a_decided_duel_still_records() {
    let mut config = base_config();
    config.expiration_secs = 60;
    let mut h = Harness::new(config);
    h.join_many(3);
    let (winner, _) = h.fight();
    h.advance(60_000);

    assert_eq!(h.tournament.state(), TournamentState::Finished { cancelled: true });
    let records = h.store.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].cancelled);
    assert_eq!(records[0].first, None);
    assert_eq!(records[0].killer, Some(h.name(winner)));
    assert_eq!(records[0].killer_kills, Some(1));
}

#[test]
fn cancel_finishes_once() {
    let mut h = Harness::new(base_config());
    h.join_many(2);
    assert_eq!(h.tournament.cancel("admin"), Ok(()));
    assert_eq!(h.tournament.state(), TournamentState::Finished { cancelled: true });
    assert_eq!(h.tournament.cancel("admin"), Err(TournamentError::InvalidState));
    assert_eq!(h.scheduler.pending(), 0);
    assert!(h.store.records().is_empty());
    assert_eq!(
        h.host.count_events(|e| matches!(e, TournamentEvent::TournamentFinished { .. })),
        1
    );
}

#[test]
fn border_shrinks_to_its_final_size() {
    let mut config = base_config();
    config.border = Some(BorderConfig {
        center: location("arena-center"),
        initial_size: 100,
        final_size: 40,
        shrink_size: 30,
        interval_secs: 5,
        damage: 0.5,
    });
    let mut h = Harness::new(config);
    h.join_many(2);
    h.close_lobby();
    h.advance(20_000);

    assert_eq!(h.host.borders(), vec![100, 70, 40]);
    assert_eq!(h.host.count_notices(|n| *n == Notice::BorderShrinking), 2);
}

#[test]
fn semifinal_fighters_keep_their_inventory() {
    let mut h = Harness::new(base_config());
    let ids = h.join_many(4);
    h.run_until_fight();
    let (a, b) = h.duel();
    let waiting: Vec<_> = ids.into_iter().filter(|p| *p != a && *p != b).collect();

    assert!(h.tournament.keep_inventory_on_death(a));
    assert!(h.tournament.keep_inventory_on_death(b));
    assert!(waiting.iter().all(|p| !h.tournament.keep_inventory_on_death(*p)));
}

/// Elimination without the best-killer prize.
struct PodiumOnly;

impl RuleSet for PodiumOnly {
    fn name(&self) -> &'static str {
        "podium only"
    }

    fn process_winners(&self, standings: &Standings) -> Vec<PrizeGrant> {
        EliminationRules
            .process_winners(standings)
            .into_iter()
            .filter(|g| g.tier != PrizeTier::Killer)
            .collect()
    }
}

#[test]
fn custom_rule_set_decides_the_prizes() {
    let parts = Parts::new();
    let ctx = parts.context(base_config()).with_rules(Box::new(PodiumOnly));
    let mut h = parts.launch(ctx);
    h.join_many(2);
    let (winner, _) = h.fight();

    assert_eq!(h.tournament.kill_counts().get(&winner), Some(&1));
    let tiers: Vec<PrizeTier> = h.host.prizes().iter().map(|p| p.tier).collect();
    assert_eq!(tiers, vec![PrizeTier::First, PrizeTier::Second]);
}

#[test]
fn finished_tournament_records_placements_and_prizes() {
    let mut config = base_config();
    config.commands_after_battle = vec!["clear %player%".to_string()];
    let mut h = Harness::new(config);
    h.join_many(2);
    let (winner, loser) = h.fight();

    assert_eq!(h.tournament.state(), TournamentState::Finished { cancelled: false });
    let records = h.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tournament, "spring cup");
    assert_eq!(records[0].first, Some(h.name(winner)));
    assert_eq!(records[0].second, Some(h.name(loser)));
    assert_eq!(records[0].third, None);
    assert!(!records[0].cancelled);

    let prizes = h.host.prizes();
    let tiers: Vec<PrizeTier> = prizes.iter().map(|p| p.tier).collect();
    assert_eq!(tiers, vec![PrizeTier::First, PrizeTier::Second, PrizeTier::Killer]);
    assert_eq!(prizes[0].members, vec![winner]);
    assert_eq!(h.tournament.registry().get(winner).unwrap().stats.victories, 1);
    assert_eq!(h.host.last_teleport(winner), Some(location("exit")));

    let commands = h.host.commands();
    assert!(commands.contains(&format!("clear {}", h.name(loser))));
    assert!(commands.contains(&format!("clear {}", h.name(winner))));
}

#[test]
fn fallen_members_share_their_groups_win() {
    let (mut h, members) = group_harness(&[("red", 2), ("blue", 2)]);
    h.run_until_fight();
    let (red, blue) = (&members[0], &members[1]);
    h.tournament.on_death(red[1], Some(blue[0]));
    assert!(h.host.notices_to(red[1]).contains(&Notice::WatchToTheEnd));
    h.tournament.on_death(blue[0], Some(red[0]));
    h.tournament.on_death(blue[1], Some(red[0]));

    assert_eq!(h.tournament.state(), TournamentState::Finished { cancelled: false });
    let first = &h.host.prizes()[0];
    assert_eq!(first.tier, PrizeTier::First);
    assert_eq!(first.leaders, vec![red[0]]);
    assert_eq!(first.members, vec![red[1]]);
    assert_eq!(
        h.host.count_events(|e| matches!(e, TournamentEvent::GroupWon { .. })),
        1
    );
    let records = h.store.records();
    assert_eq!(records[0].first, Some("red".to_string()));
    assert_eq!(records[0].first_group, Some("red".to_string()));
    assert_eq!(records[0].killer, Some("red1".to_string()));
}

#[test]
fn queued_loser_who_disconnects_drops_out_of_third_place() {
    let mut h = Harness::new(base_config());
    h.join_many(4);
    let (_, first_loser) = h.fight();
    assert_eq!(h.tournament.bracket().waiting_third_place().len(), 1);
    assert_eq!(
        h.host
            .count_notices(|n| *n == Notice::WaitForThirdPlace),
        1
    );

    assert_eq!(h.tournament.on_disconnect(first_loser), DisconnectOutcome::Left);
    assert!(h.tournament.bracket().waiting_third_place().is_empty());
    assert_eq!(
        h.tournament.registry().get(first_loser).unwrap().status,
        ParticipantStatus::Casualty {
            reason: EliminationReason::Disconnected
        }
    );

    let (_, second_loser) = h.fight();
    h.fight();
    assert_eq!(h.tournament.state(), TournamentState::Finished { cancelled: false });
    assert_eq!(
        h.tournament.placements().third,
        Some(Entrant::Participant(second_loser))
    );
    assert!(!h.tournament.registry().is_active(first_loser));
}

#[test]
fn walkover_advances_the_waiting_partner() {
    let mut h = Harness::new(base_config());
    let ids = h.join_many(4);
    h.run_until_fight();
    let (a, b) = h.duel();
    let waiting: Vec<_> = ids.into_iter().filter(|p| *p != a && *p != b).collect();

    assert!(h.tournament.eliminate(waiting[0], EliminationReason::Other("admin".to_string())));
    assert!(h.tournament.bracket().waiting_third_place().is_empty());
    assert!(h.tournament.is_in_battle(a));

    let (_, semi_loser) = h.fight();
    let (final_winner, final_loser) = h.fight();
    let placements = h.tournament.placements();
    assert_eq!(placements.third, Some(Entrant::Participant(semi_loser)));
    assert_eq!(placements.first, Some(Entrant::Participant(final_winner)));
    assert_eq!(placements.second, Some(Entrant::Participant(final_loser)));
    assert!([final_winner, final_loser].contains(&waiting[1]));
}

/// Four players; the first semifinal is decided and the next one has not started yet.
/// `exit` takes one fighter of the upcoming duel out during that gap.
fn exit_between_duels(exit: impl FnOnce(&mut Harness, Uuid)) {
    let mut h = Harness::new(base_config());
    h.join_many(4);
    let (semi_winner, semi_loser) = h.fight();
    assert!(h.tournament.current_fighters().is_empty());
    let upcoming: Vec<Uuid> = h
        .tournament
        .bracket()
        .current_duel()
        .unwrap()
        .opponents
        .iter()
        .filter_map(|e| match e {
            Entrant::Participant(p) => Some(*p),
            Entrant::Group(_) => None,
        })
        .collect();
    let (gone, partner) = (upcoming[0], upcoming[1]);

    exit(&mut h, gone);
    assert!(!h.tournament.registry().is_active(gone));
    assert_eq!(
        h.tournament.bracket().waiting_third_place(),
        &[Entrant::Participant(semi_loser)]
    );

    h.run_until_fight();
    let mut finalists = h.tournament.current_fighters();
    finalists.sort();
    let mut expected = vec![semi_winner, partner];
    expected.sort();
    assert_eq!(finalists, expected);
    assert_eq!(h.host.count_notices(|n| *n == Notice::BattleForThirdPlace), 0);

    let (first, second) = h.fight();
    assert_eq!(h.tournament.state(), TournamentState::Finished { cancelled: false });
    let placements = h.tournament.placements();
    assert_eq!(placements.first, Some(Entrant::Participant(first)));
    assert_eq!(placements.second, Some(Entrant::Participant(second)));
    assert_eq!(placements.third, Some(Entrant::Participant(semi_loser)));
    assert!(!h.tournament.registry().is_active(gone));
}

#[test]
fn leaving_before_the_next_duel_is_a_walkover() {
    exit_between_duels(|h, gone| {
        assert!(h.tournament.on_leave(gone));
        assert_eq!(
            h.tournament.registry().get(gone).unwrap().status,
            ParticipantStatus::Casualty {
                reason: EliminationReason::Left
            }
        );
    });
}

#[test]
fn disconnecting_before_the_next_duel_is_a_walkover() {
    exit_between_duels(|h, gone| {
        assert_eq!(h.tournament.on_disconnect(gone), DisconnectOutcome::Eliminated);
        assert_eq!(h.stand_ins.live_count(), 0);
    });
}

#[test]
fn eliminating_before_the_next_duel_is_a_walkover() {
    exit_between_duels(|h, gone| {
        assert!(h
            .tournament
            .eliminate(gone, EliminationReason::Other("admin".to_string())));
    });
}
