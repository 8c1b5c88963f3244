//! End-to-end runs: a full four-player bracket, trimming, group defeat and stand-in parity.

mod common;

use common::{base_config, group_harness, Harness};
use elimination_arena::logic::{DamageVerdict, DisconnectOutcome};
use elimination_arena::models::{
    Entrant, Notice, ParticipantStatus, PlacementRecord, RemovalReason, TournamentEvent,
    TournamentState,
};

/// Fight every remaining duel, first fighter winning. Returns (winner, loser) names per duel.
fn play_to_the_end(h: &mut Harness) -> Vec<(String, String)> {
    let mut duels = Vec::new();
    while !h.tournament.state().is_finished() {
        let (winner, loser) = h.fight();
        duels.push((h.name(winner), h.name(loser)));
    }
    duels
}

#[test]
fn four_players_play_semis_third_place_and_final() {
    let mut h = Harness::new(base_config());
    h.join_many(4);

    let (w1, l1) = h.fight();
    assert_eq!(h.tournament.bracket().waiting_third_place(), &[Entrant::Participant(l1)]);
    let (w2, l2) = h.fight();
    assert_eq!(h.tournament.bracket().waiting_third_place().len(), 2);

    let (t1, t2) = h.fight();
    assert_eq!(h.host.count_notices(|n| *n == Notice::BattleForThirdPlace), 1);
    let mut third_duel = vec![t1, t2];
    third_duel.sort();
    let mut losers = vec![l1, l2];
    losers.sort();
    assert_eq!(third_duel, losers);
    assert_eq!(
        h.tournament.registry().get(t1).unwrap().status,
        ParticipantStatus::Removed {
            reason: RemovalReason::Placed
        }
    );

    let (f1, f2) = h.fight();
    assert_eq!(h.host.count_notices(|n| *n == Notice::FinalBattle), 1);
    let mut finalists = vec![f1, f2];
    finalists.sort();
    let mut semi_winners = vec![w1, w2];
    semi_winners.sort();
    assert_eq!(finalists, semi_winners);

    assert_eq!(h.tournament.state(), TournamentState::Finished { cancelled: false });
    let placements = h.tournament.placements();
    assert_eq!(placements.first, Some(Entrant::Participant(f1)));
    assert_eq!(placements.second, Some(Entrant::Participant(f2)));
    assert_eq!(placements.third, Some(Entrant::Participant(t1)));
    assert!(h.host.notices().iter().any(|(_, n)| *n
        == Notice::WhoWon {
            first: h.name(f1),
            second: h.name(f2),
            third: h.name(t1),
        }));
}

#[test]
fn five_players_trim_the_last_joiner_to_the_spectators() {
    let mut config = base_config();
    config.power_of_two = true;
    let mut h = Harness::new(config);
    let ids = h.join_many(5);
    h.close_lobby();

    let spectator = ids[4];
    assert_eq!(
        h.tournament.registry().get(spectator).unwrap().status,
        ParticipantStatus::Removed {
            reason: RemovalReason::Trimmed
        }
    );
    assert!(h.host.notices_to(spectator).contains(&Notice::KickedToAdjustDuels));
    assert_eq!(h.tournament.registry().active_count(), 4);
    assert!(!h.tournament.casualties().iter().any(|p| p.id == spectator));

    let duels = play_to_the_end(&mut h);
    assert_eq!(duels.len(), 4);
    let spectator_name = h.name(spectator);
    assert!(duels
        .iter()
        .all(|(w, l)| *w != spectator_name && *l != spectator_name));
    let placements = h.tournament.placements().clone();
    for placed in [placements.first, placements.second, placements.third] {
        assert!(placed.is_some());
        assert_ne!(placed, Some(Entrant::Participant(spectator)));
    }
    assert!(h
        .host
        .prizes()
        .iter()
        .all(|p| !p.members.contains(&spectator)));
}

#[test]
fn group_defeat_fires_only_on_the_last_member() {
    let (mut h, members) = group_harness(&[("A", 3), ("B", 2)]);
    h.run_until_fight();
    let (a, b) = (&members[0], &members[1]);
    let defeats = |h: &Harness| {
        h.host
            .count_notices(|n| matches!(n, Notice::GroupDefeated { .. }))
    };

    h.tournament.on_death(a[0], Some(b[0]));
    assert_eq!(defeats(&h), 0);
    h.tournament.on_death(a[1], Some(b[0]));
    assert_eq!(defeats(&h), 0);
    assert_eq!(h.tournament.state(), TournamentState::Battle);
    h.tournament.on_death(a[2], Some(b[1]));
    assert_eq!(defeats(&h), 1);

    let last = a[2];
    assert_eq!(
        h.host.count_events(|e| matches!(
            e,
            TournamentEvent::GroupDefeated { last_member, .. } if *last_member == last
        )),
        1
    );
    assert_eq!(h.tournament.state(), TournamentState::Finished { cancelled: false });
    assert_eq!(h.store.records()[0].first, Some("B".to_string()));
}

/// Four players; in the first duel the second fighter goes down to the first, either through a
/// defeated stand-in or directly.
fn parity_run(through_stand_in: bool) -> (PlacementRecord, Vec<(String, String)>) {
    let mut h = Harness::new(base_config());
    h.join_many(4);
    h.run_until_fight();
    let (x, victim) = h.duel();

    if through_stand_in {
        let actor = match h.tournament.on_disconnect(victim) {
            DisconnectOutcome::StandIn { actor } => actor,
            other => panic!("expected a stand-in, got {:?}", other),
        };
        let t = 90_000;
        assert_eq!(
            h.tournament.on_damage(actor, x, 15.0, t),
            DamageVerdict::Absorbed { health_left: 5.0 }
        );
        assert_eq!(h.combat.last_attacker(victim, t + 100), Some(x));
        assert_eq!(
            h.tournament.on_damage(actor, x, 5.0, t + 100),
            DamageVerdict::Defeated {
                owner: victim,
                credited: Some(x)
            }
        );
    } else {
        h.tournament.on_death(victim, Some(x));
    }

    let mut duels = vec![(h.name(x), h.name(victim))];
    duels.extend(play_to_the_end(&mut h));
    let record = h.store.records().remove(0);
    (record, duels)
}

#[test]
fn defeated_stand_in_advances_the_bracket_like_a_real_death() {
    let (via_stand_in, duels_via_stand_in) = parity_run(true);
    let (direct, duels_direct) = parity_run(false);

    assert_eq!(duels_via_stand_in, duels_direct);
    assert_eq!(via_stand_in.first, direct.first);
    assert_eq!(via_stand_in.second, direct.second);
    assert_eq!(via_stand_in.third, direct.third);
    assert_eq!(via_stand_in.killer, direct.killer);
    assert_eq!(via_stand_in.killer_kills, direct.killer_kills);
}
