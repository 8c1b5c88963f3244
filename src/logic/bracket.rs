//! Single-elimination bracket: pairing, advancement, placements.

use crate::models::{Duel, DuelKind, Entrant, Placements};
use rand::seq::SliceRandom;
use rand::Rng;

/// What kind of round a freshly generated bracket is.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Round {
    Regular,
    /// The two queued semifinal losers fight; they must be brought back into play.
    ThirdPlace { revived: Vec<Entrant> },
    /// A single duel is left. A lone queued semifinal loser takes third without a fight.
    Final { third_by_default: Option<Entrant> },
}

/// Answer to "what happens next" after a duel resolves or the lobby closes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NextDuel {
    /// Fight this duel. `round` is set when a new bracket was generated for it.
    Ready {
        duel: Duel<Entrant>,
        round: Option<Round>,
    },
    /// One side (or nobody) is left.
    Finished,
}

/// A contested duel that just got a result.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DecidedDuel {
    pub winner: Entrant,
    pub loser: Entrant,
    pub kind: DuelKind,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LossOutcome {
    /// Set only when the loser was fighting the current duel.
    pub decided: Option<DecidedDuel>,
    /// The loser lost a semifinal and now waits for the third-place duel.
    pub queued_for_third: bool,
}

/// Bracket state for one tournament run.
#[derive(Clone, Debug, Default)]
pub struct BracketEngine {
    duels: Vec<Duel<Entrant>>,
    waiting_third_place: Vec<Entrant>,
    third_place_battle: bool,
    placements: Placements,
    rounds_generated: usize,
    decided_duels: usize,
}

fn is_power_of_two(x: usize) -> bool {
    x > 0 && (x & (x - 1)) == 0
}

/// Entrants to drop from the tail so the pool size becomes a power of two.
///
/// Walks down from the full size and stops at the first power of two (or at 2).
pub fn trim_to_power_of_two<T: Copy>(pool: &[T]) -> Vec<T> {
    let mut trimmed = Vec::new();
    let mut i = pool.len();
    while i > 2 && !is_power_of_two(i) {
        trimmed.push(pool[i - 1]);
        i -= 1;
    }
    trimmed
}

/// Pair consecutive entrants; an odd last entrant gets a bye.
pub fn pair_up<T: Copy + Eq>(pool: &[T]) -> Vec<Duel<T>> {
    pool.chunks(2)
        .map(|chunk| match chunk.get(1) {
            Some(second) => Duel::pair(chunk[0], *second),
            None => Duel::bye(chunk[0]),
        })
        .collect()
}

impl BracketEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_index(&self) -> Option<usize> {
        self.duels.iter().position(|d| d.is_contested())
    }

    /// First duel with two opponents still in it.
    pub fn current_duel(&self) -> Option<&Duel<Entrant>> {
        self.current_index().map(|i| &self.duels[i])
    }

    pub fn is_current(&self, entrant: Entrant) -> bool {
        self.current_duel().map(|d| d.contains(entrant)).unwrap_or(false)
    }

    pub fn current_entrants(&self) -> Vec<Entrant> {
        self.current_duel().map(|d| d.opponents.clone()).unwrap_or_default()
    }

    pub fn duels(&self) -> &[Duel<Entrant>] {
        &self.duels
    }

    pub fn duel_count(&self) -> usize {
        self.duels.len()
    }

    pub fn waiting_third_place(&self) -> &[Entrant] {
        &self.waiting_third_place
    }

    pub fn is_third_place_battle(&self) -> bool {
        self.third_place_battle
    }

    pub fn placements(&self) -> &Placements {
        &self.placements
    }

    pub fn rounds_generated(&self) -> usize {
        self.rounds_generated
    }

    /// Contested duels that ended with a winner.
    pub fn decided_duels(&self) -> usize {
        self.decided_duels
    }

    /// Drop a queued semifinal loser who is gone. Returns whether it was queued.
    pub fn drop_from_third_place_queue(&mut self, entrant: Entrant) -> bool {
        let before = self.waiting_third_place.len();
        self.waiting_third_place.retain(|e| *e != entrant);
        before != self.waiting_third_place.len()
    }

    /// Remove every entrant that is no longer live from the duels; emptied duels go away.
    ///
    /// In group mode a group can lose its last member outside of its duel, so liveness
    /// is re-checked here before a duel is treated as current.
    pub fn prune(&mut self, live: &[Entrant]) {
        for duel in &mut self.duels {
            duel.opponents.retain(|o| live.contains(o));
        }
        self.duels.retain(|d| !d.is_empty());
    }

    /// Record that `loser` is out of the bracket.
    ///
    /// 1. If it was fighting the current duel, that duel is decided: third place when the
    ///    third-place duel is running, first/second when it was the only duel left.
    /// 2. Losing a contested duel while two duels remain (a semifinal) queues the loser for
    ///    the third-place duel.
    /// 3. The loser is removed from every duel; a partner left alone advances like a bye.
    pub fn record_loss(&mut self, loser: Entrant) -> LossOutcome {
        let mut outcome = LossOutcome::default();
        let duel_count = self.duels.len();
        if let Some(idx) = self.current_index() {
            if let Some(winner) = self.duels[idx].other(loser) {
                let kind = if self.third_place_battle {
                    self.third_place_battle = false;
                    self.placements.third = Some(winner);
                    DuelKind::ThirdPlace
                } else if duel_count == 1 {
                    self.placements.first = Some(winner);
                    self.placements.second = Some(loser);
                    DuelKind::Final
                } else {
                    DuelKind::Regular
                };
                self.decided_duels += 1;
                outcome.decided = Some(DecidedDuel { winner, loser, kind });

                if duel_count == 2 && kind == DuelKind::Regular && self.waiting_third_place.len() < 2 {
                    self.waiting_third_place.push(loser);
                    outcome.queued_for_third = true;
                }
            }
        }
        self.withdraw(loser);
        outcome
    }

    /// Take an entrant out of every duel without deciding anything.
    ///
    /// Used while no duel is being fought: the entrant's partner gets a walkover and the
    /// entrant is never queued for third place.
    pub fn withdraw(&mut self, entrant: Entrant) {
        for duel in &mut self.duels {
            duel.remove(entrant);
        }
        self.duels.retain(|d| !d.is_empty());
    }

    /// Find or generate the next duel to fight.
    ///
    /// 1. With one live entrant or none, the bracket is over; a lone survivor is first place.
    /// 2. A contested duel left in the current bracket is fought next.
    /// 3. Two queued semifinal losers fight for third place before the final.
    /// 4. Otherwise the live pool is shuffled and paired into a new bracket.
    pub fn next_duel<R: Rng + ?Sized>(&mut self, live: &[Entrant], rng: &mut R) -> NextDuel {
        if live.len() <= 1 {
            if self.placements.first.is_none() {
                self.placements.first = live.first().copied();
            }
            self.duels.clear();
            return NextDuel::Finished;
        }

        self.prune(live);
        if let Some(duel) = self.current_duel() {
            return NextDuel::Ready {
                duel: duel.clone(),
                round: None,
            };
        }

        if self.waiting_third_place.len() == 2 {
            let revived = std::mem::take(&mut self.waiting_third_place);
            let mut duel = Duel::pair(revived[0], revived[1]);
            duel.kind = DuelKind::ThirdPlace;
            self.duels = vec![duel.clone()];
            self.third_place_battle = true;
            self.rounds_generated += 1;
            return NextDuel::Ready {
                duel,
                round: Some(Round::ThirdPlace { revived }),
            };
        }

        let mut pool = live.to_vec();
        pool.shuffle(rng);
        self.duels = pair_up(&pool);
        self.rounds_generated += 1;

        let round = if self.duels.len() == 1 {
            self.duels[0].kind = DuelKind::Final;
            let third_by_default = if self.waiting_third_place.len() == 1 {
                let third = self.waiting_third_place.remove(0);
                self.placements.third = Some(third);
                Some(third)
            } else {
                None
            };
            Round::Final { third_by_default }
        } else {
            Round::Regular
        };

        match self.current_duel() {
            Some(duel) => NextDuel::Ready {
                duel: duel.clone(),
                round: Some(round),
            },
            None => NextDuel::Finished,
        }
    }
}
