use crate::card::Card;
use crate::error::EstimateError;
use crate::game::{Rules, Table};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Coarse preference class of a play. Lower tiers are played first.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Tier {
    /// The card lands on a row that still has room.
    Slack = 1,
    /// The card is below every row.
    Open = 2,
    /// The card lands on a full row and takes it.
    Full = 3,
}

/// Sort key of a candidate play: tier first, then score, both ascending.
#[derive(Clone, Copy, Debug)]
pub struct Fitness {
    pub tier: Tier,
    pub score: f64,
}

impl Fitness {
    pub fn new(tier: Tier, score: f64) -> Fitness {
        Fitness { tier, score }
    }
}

impl Ord for Fitness {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tier
            .cmp(&other.tier)
            .then_with(|| self.score.total_cmp(&other.score))
    }
}

impl PartialOrd for Fitness {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Fitness {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Fitness {}

/// Scores how natural it is to play `card` on `table`.
///
/// A card that fits a row with room is scored by the row's weight times the
/// gap to the row's tail, spread over the remaining room. A card below every
/// row prefers higher values. A card that would take a full row is scored by
/// the negated gap, so wider gaps sort first within that tier.
pub fn fitness(rules: &Rules, table: &Table, card: Card) -> Fitness {
    let matched = table
        .match_row(card)
        .and_then(|row| row.last().map(|last| (row, last)));

    let Some((row, last)) = matched else {
        return Fitness::new(Tier::Open, -f64::from(card.value()));
    };

    let distance = f64::from(card.value() - last.value() - 1);
    let slack = row.slack(rules.max_row_len);
    if slack > 0 {
        let score = f64::from(row.weight()) * distance / slack as f64;
        Fitness::new(Tier::Slack, score)
    } else {
        Fitness::new(Tier::Full, -distance)
    }
}

/// Orders a hand from the most to the least natural card to play.
/// Cards with equal fitness keep their order in `hand`.
pub fn order(rules: &Rules, table: &Table, hand: &[Card]) -> Vec<Card> {
    let mut cards = hand.to_vec();
    cards.sort_by_cached_key(|&card| fitness(rules, table, card));
    cards
}

/// Like [`order`], but first checks that the table is well formed and that
/// the hand shares no card with it. Errors are labelled as round 0.
pub fn checked_order(
    rules: &Rules,
    table: &Table,
    hand: &[Card],
) -> Result<Vec<Card>, EstimateError> {
    table.validate(rules, 0)?;

    let mut distinct = HashSet::with_capacity(hand.len());
    for &card in hand {
        if table.contains(card) {
            return Err(EstimateError::MalformedTable {
                round: 0,
                reason: format!("hand card {} is already on the table", card.value()),
            });
        }
        if !distinct.insert(card) {
            return Err(EstimateError::InputInconsistency(format!(
                "card {} appears twice in the hand",
                card.value()
            )));
        }
    }

    Ok(order(rules, table, hand))
}

/// Position of `action` in [`order`] of `hand`, without building the order.
pub fn play_rank(rules: &Rules, table: &Table, hand: &[Card], action: Card) -> Option<usize> {
    let action_i = hand.iter().position(|&card| card == action)?;
    let target = fitness(rules, table, action);

    let rank = hand
        .iter()
        .enumerate()
        .filter(|&(i, &card)| {
            if i == action_i {
                return false;
            }
            match fitness(rules, table, card).cmp(&target) {
                Ordering::Less => true,
                Ordering::Equal => i < action_i,
                Ordering::Greater => false,
            }
        })
        .count();

    Some(rank)
}
