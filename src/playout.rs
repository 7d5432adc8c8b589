use crate::analysis::PREFERENCE_DECAY;
use crate::card::Card;
use crate::game::{CardVec, Rules, Table};
use crate::heuristic::order;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;

/// Average cost of opening with `card`, relative to the other players.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveCost {
    pub card: Card,
    /// Penalty the player collects minus the mean penalty of everyone else,
    /// over the rest of the hand. Lower is better.
    pub relative_cost: f64,
}

/// Picks a card from `hand` the way the likelihood model assumes players do:
/// the k-th card of [`order`] with probability proportional to `0.5^k`.
pub fn policy_card<R: Rng + ?Sized>(
    rules: &Rules,
    table: &Table,
    hand: &[Card],
    rng: &mut R,
) -> Option<Card> {
    let ordered = order(rules, table, hand);
    let weights = (0..ordered.len()).map(|rank| PREFERENCE_DECAY.powi(rank as i32));
    let choice = WeightedIndex::new(weights).ok()?;
    ordered.get(choice.sample(rng)).copied()
}

/// Plays out the rest of the hand from `table` and returns the penalty every
/// player collected.
///
/// `opening` fixes the first card of one player; every other choice follows
/// [`policy_card`]. Each round the chosen cards are placed lowest first.
pub fn simulate_playout<R: Rng + ?Sized>(
    rules: &Rules,
    mut table: Table,
    mut hands: Vec<CardVec>,
    opening: Option<(usize, Card)>,
    rng: &mut R,
) -> Vec<u32> {
    let mut costs = vec![0; hands.len()];
    let rounds = hands.iter().map(|hand| hand.len()).min().unwrap_or(0);

    for round in 0..rounds {
        let mut plays = Vec::with_capacity(hands.len());
        for (player, hand) in hands.iter_mut().enumerate() {
            let chosen = match opening {
                Some((opener, card)) if round == 0 && opener == player => Some(card),
                _ => policy_card(rules, &table, hand, rng),
            };
            let Some(card) = chosen else { continue };
            hand.retain(|c| *c != card);
            plays.push((card, player));
        }

        plays.sort();
        for (card, player) in plays {
            costs[player] += table.place(card, rules.max_row_len);
        }
    }

    costs
}

/// `costs[player]` minus the mean of everyone else's costs.
pub fn relative_cost(costs: &[u32], player: usize) -> f64 {
    let own = costs.get(player).copied().unwrap_or(0);
    let others = costs.len().saturating_sub(1);
    if others == 0 {
        return f64::from(own);
    }
    let rest = costs.iter().sum::<u32>() - own;
    f64::from(own) - f64::from(rest) / others as f64
}
