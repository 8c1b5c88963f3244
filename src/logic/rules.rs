//! Rule sets: the variant-specific hooks of an elimination tournament.

use crate::logic::bracket::trim_to_power_of_two;
use crate::models::{Entrant, GroupId, ParticipantId, PrizeTier, RuleKind, TournamentConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the host should do with a melee hit between two fighters.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum HitVerdict {
    /// Not allowed right now (not fighting, same group...).
    Cancelled,
    /// Apply the hit normally.
    Allowed,
    /// Count the hit but deal no damage.
    Absorbed { hits: u32, needed: u32 },
    /// The hit finishes the victim.
    Lethal,
}

/// Final standings, resolved to participants.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Standings {
    pub first: Vec<ParticipantId>,
    pub first_group: Option<GroupId>,
    pub second: Vec<ParticipantId>,
    pub second_group: Option<GroupId>,
    pub third: Vec<ParticipantId>,
    pub third_group: Option<GroupId>,
    pub killer: Option<(ParticipantId, u32)>,
}

/// One prize tier to hand out.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PrizeGrant {
    pub tier: PrizeTier,
    pub group: Option<GroupId>,
    pub winners: Vec<ParticipantId>,
}

/// Hooks a tournament variant can change. Defaults are the plain elimination rules.
pub trait RuleSet: Send {
    fn name(&self) -> &'static str;

    /// Entrants to move to the spectators before the first pairing.
    fn on_lobby_end(&mut self, pool: &[Entrant], config: &TournamentConfig) -> Vec<Entrant> {
        if config.power_of_two {
            trim_to_power_of_two(pool)
        } else {
            Vec::new()
        }
    }

    /// Fighting is allowed only for the current duel while the battle runs.
    fn is_in_battle(&self, battle_running: bool, current_fighter: bool) -> bool {
        battle_running && current_fighter
    }

    /// Semifinal fighters keep their items, they may still fight for third place.
    fn keep_inventory_on_death(&self, current_fighter: bool, duel_count: usize) -> bool {
        current_fighter && duel_count == 2
    }

    fn process_winners(&self, standings: &Standings) -> Vec<PrizeGrant> {
        let mut grants = Vec::new();
        let tiers = [
            (PrizeTier::First, standings.first_group, &standings.first),
            (PrizeTier::Second, standings.second_group, &standings.second),
            (PrizeTier::Third, standings.third_group, &standings.third),
        ];
        for (tier, group, winners) in tiers {
            if !winners.is_empty() {
                grants.push(PrizeGrant {
                    tier,
                    group,
                    winners: winners.clone(),
                });
            }
        }
        if let Some((killer, _)) = standings.killer {
            grants.push(PrizeGrant {
                tier: PrizeTier::Killer,
                group: None,
                winners: vec![killer],
            });
        }
        grants
    }

    fn on_hit(&mut self, _attacker: ParticipantId, _victim: ParticipantId) -> HitVerdict {
        HitVerdict::Allowed
    }
}

/// Plain single elimination.
#[derive(Clone, Debug, Default)]
pub struct EliminationRules;

impl RuleSet for EliminationRules {
    fn name(&self) -> &'static str {
        "elimination"
    }
}

/// Boxing: hits deal no damage until the attacker has landed `hit_amount` of them.
#[derive(Clone, Debug)]
pub struct HitCountRules {
    hit_amount: u32,
    hits: HashMap<ParticipantId, u32>,
}

impl HitCountRules {
    pub fn new(hit_amount: u32) -> Self {
        Self {
            hit_amount: hit_amount.max(1),
            hits: HashMap::new(),
        }
    }

    pub fn hits_of(&self, attacker: ParticipantId) -> u32 {
        self.hits.get(&attacker).copied().unwrap_or(0)
    }
}

impl RuleSet for HitCountRules {
    fn name(&self) -> &'static str {
        "hit_count"
    }

    fn on_lobby_end(&mut self, pool: &[Entrant], config: &TournamentConfig) -> Vec<Entrant> {
        self.hits.clear();
        if config.power_of_two {
            trim_to_power_of_two(pool)
        } else {
            Vec::new()
        }
    }

    fn on_hit(&mut self, attacker: ParticipantId, victim: ParticipantId) -> HitVerdict {
        let hits = self.hits.entry(attacker).or_insert(0);
        *hits += 1;
        if *hits < self.hit_amount {
            return HitVerdict::Absorbed {
                hits: *hits,
                needed: self.hit_amount,
            };
        }
        self.hits.remove(&attacker);
        self.hits.remove(&victim);
        log::debug!("hit count reached, {} finishes {}", attacker, victim);
        HitVerdict::Lethal
    }
}

/// Rule set for a configured kind.
pub fn rules_for(kind: &RuleKind) -> Box<dyn RuleSet> {
    match kind {
        RuleKind::Elimination => Box::new(EliminationRules),
        RuleKind::HitCount { hit_amount } => Box::new(HitCountRules::new(*hit_amount)),
    }
}
