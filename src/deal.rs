use crate::card::Card;
use crate::error::EstimateError;
use crate::game::CardVec;
use crate::probability::ProbabilityTable;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;

/// A full deal drawn from a posterior, with its importance weight.
#[derive(Clone, Debug, PartialEq)]
pub struct Deal {
    /// Current hand of every player.
    pub hands: Vec<CardVec>,
    /// Posterior probability of the deal over the probability of drawing it.
    pub weight: f64,
}

/// Draws deals of the free cards that follow a [`ProbabilityTable`].
///
/// Cards are handed out one at a time. Each goes to a holder with room left,
/// chosen in proportion to the holder's posterior probability for the card
/// times the room the holder has left, relative to the holder's average
/// probability. The proposal is not the posterior itself, so every deal
/// carries the ratio of the two as its weight.
#[derive(Clone, Debug)]
pub struct HandSampler {
    table: ProbabilityTable,
    cards: Vec<Card>,
    fixed: Vec<CardVec>,
    capacities: Vec<usize>,
    mean_probs: Vec<f64>,
}

impl HandSampler {
    /// `fixed` holds the cards every player is known to hold; `capacities`
    /// says how many free cards each holder, `Nobody` last, must receive.
    pub fn new(
        table: &ProbabilityTable,
        fixed: Vec<CardVec>,
        capacities: Vec<usize>,
    ) -> Result<HandSampler, EstimateError> {
        let player_count = table.player_count();
        if fixed.len() != player_count || capacities.len() != player_count + 1 {
            return Err(EstimateError::InputInconsistency(format!(
                "deal for {} players against a table of {player_count}",
                fixed.len()
            )));
        }
        let room = capacities.iter().sum::<usize>();
        if room != table.len() {
            return Err(EstimateError::InputInconsistency(format!(
                "holders take {room} cards but {} are free",
                table.len()
            )));
        }

        let mean_probs = table
            .expected_counts()
            .into_iter()
            .map(|count| count / table.len().max(1) as f64)
            .collect::<Vec<f64>>();

        // Cards most likely to stay out of play go first.
        let nobody = player_count;
        let mut cards = table.cards().collect::<Vec<Card>>();
        cards.sort_by(|&a, &b| {
            let p = |card| {
                table
                    .distribution(card)
                    .and_then(|d| d.get(nobody).copied())
                    .unwrap_or(0.0)
            };
            p(b).total_cmp(&p(a))
        });

        Ok(HandSampler {
            table: table.clone(),
            cards,
            fixed,
            capacities,
            mean_probs,
        })
    }

    pub fn player_count(&self) -> usize {
        self.fixed.len()
    }

    /// Cards `player` holds in every deal.
    pub fn fixed_hand(&self, player: usize) -> &[Card] {
        self.fixed.get(player).map(|hand| hand.as_slice()).unwrap_or(&[])
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Deal {
        let mut hands = self.fixed.clone();
        let mut remaining = self.capacities.clone();
        let mut proposal = vec![0.0; remaining.len()];
        let mut weight = 1.0;

        for &card in &self.cards {
            let dist = self.table.distribution(card).unwrap_or(&[]);
            let posterior = |holder: usize| dist.get(holder).copied().unwrap_or(0.0);

            for (holder, slot) in proposal.iter_mut().enumerate() {
                let mean = self.mean_probs[holder];
                *slot = if remaining[holder] == 0 || mean <= 0.0 {
                    0.0
                } else {
                    posterior(holder) * remaining[holder] as f64 / mean
                };
            }
            if proposal.iter().sum::<f64>() <= 0.0 {
                // every holder with room was ruled out; fill by room alone
                for (slot, &room) in proposal.iter_mut().zip(&remaining) {
                    *slot = room as f64;
                }
            }

            let Ok(choice) = WeightedIndex::new(&proposal) else {
                return Deal { hands, weight: 0.0 };
            };
            let holder = choice.sample(rng);
            let drawn = proposal[holder] / proposal.iter().sum::<f64>();
            weight *= posterior(holder) / drawn;

            remaining[holder] -= 1;
            if let Some(hand) = hands.get_mut(holder) {
                hand.push(card);
            }
        }

        Deal { hands, weight }
    }
}
