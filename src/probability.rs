use crate::card::Card;
use crate::error::EstimateError;
use crate::game::Holder;
use std::collections::BTreeMap;

/// What to do with a card that collected no evidence at all.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DegeneratePolicy {
    /// Fail with [`EstimateError::DegenerateCard`].
    #[default]
    Reject,
    /// Spread the card evenly over every holder.
    Uniform,
}

/// Weighted evidence per card and holder. Missing entries weigh zero.
#[derive(Clone, Debug, PartialEq)]
pub struct Accumulator {
    player_count: usize,
    weights: BTreeMap<Card, Vec<f64>>,
    samples: usize,
}

impl Accumulator {
    /// Starts an empty accumulator tracking `cards`.
    pub fn new<I: IntoIterator<Item = Card>>(cards: I, player_count: usize) -> Accumulator {
        let weights = cards
            .into_iter()
            .map(|card| (card, vec![0.0; player_count + 1]))
            .collect();

        Accumulator {
            player_count,
            weights,
            samples: 0,
        }
    }

    pub fn player_count(&self) -> usize {
        self.player_count
    }

    /// Number of samples folded in so far.
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn cards(&self) -> impl Iterator<Item = Card> + '_ {
        self.weights.keys().copied()
    }

    pub fn add(&mut self, card: Card, holder: Holder, weight: f64) {
        let width = self.player_count + 1;
        let slots = self
            .weights
            .entry(card)
            .or_insert_with(|| vec![0.0; width]);
        if let Some(slot) = slots.get_mut(holder.index(self.player_count)) {
            *slot += weight;
        }
    }

    pub(crate) fn count_sample(&mut self) {
        self.samples += 1;
    }

    pub fn weight(&self, card: Card, holder: Holder) -> f64 {
        self.weights
            .get(&card)
            .and_then(|slots| slots.get(holder.index(self.player_count)))
            .copied()
            .unwrap_or(0.0)
    }

    /// Total evidence for a card across every holder.
    pub fn total(&self, card: Card) -> f64 {
        self.weights
            .get(&card)
            .map(|slots| slots.iter().sum())
            .unwrap_or(0.0)
    }

    /// Adds another accumulator's evidence into this one.
    pub fn merge(&mut self, other: Accumulator) {
        self.samples += other.samples;
        for (card, slots) in other.weights {
            for (index, weight) in slots.into_iter().enumerate() {
                self.add(card, Holder::from_index(index, self.player_count), weight);
            }
        }
    }

    /// Cards whose total evidence is zero.
    pub fn degenerate_cards(&self) -> Vec<Card> {
        self.weights
            .iter()
            .filter(|(_, slots)| slots.iter().sum::<f64>() <= 0.0)
            .map(|(&card, _)| card)
            .collect()
    }

    /// Turns the evidence into per-card distributions over holders.
    ///
    /// This consumes the accumulator, so a second normalization of the same
    /// evidence is not possible.
    pub fn normalize(self, policy: DegeneratePolicy) -> Result<ProbabilityTable, EstimateError> {
        let degenerate = self.degenerate_cards();
        if !degenerate.is_empty() && policy == DegeneratePolicy::Reject {
            return Err(EstimateError::DegenerateCard { cards: degenerate });
        }

        let width = self.player_count + 1;
        let probs = self
            .weights
            .into_iter()
            .map(|(card, mut slots)| {
                let total = slots.iter().sum::<f64>();
                if total > 0.0 {
                    slots.iter_mut().for_each(|w| *w /= total);
                } else {
                    slots.iter_mut().for_each(|w| *w = 1.0 / width as f64);
                }
                (card, slots)
            })
            .collect();

        Ok(ProbabilityTable {
            player_count: self.player_count,
            probs,
            samples: self.samples,
        })
    }
}

/// Posterior probability of every holder for every free card.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbabilityTable {
    player_count: usize,
    probs: BTreeMap<Card, Vec<f64>>,
    samples: usize,
}

impl ProbabilityTable {
    pub fn player_count(&self) -> usize {
        self.player_count
    }

    /// Number of samples behind the estimate.
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    pub fn cards(&self) -> impl Iterator<Item = Card> + '_ {
        self.probs.keys().copied()
    }

    pub fn holders(&self) -> impl Iterator<Item = Holder> {
        Holder::all(self.player_count)
    }

    pub fn probability(&self, card: Card, holder: Holder) -> Option<f64> {
        self.distribution(card)
            .and_then(|slots| slots.get(holder.index(self.player_count)))
            .copied()
    }

    /// Probabilities of every holder for `card`, indexed like [`Holder::index`].
    pub fn distribution(&self, card: Card) -> Option<&[f64]> {
        self.probs.get(&card).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Card, Holder, f64)> + '_ {
        let player_count = self.player_count;
        self.probs.iter().flat_map(move |(&card, slots)| {
            slots
                .iter()
                .enumerate()
                .map(move |(index, &p)| (card, Holder::from_index(index, player_count), p))
        })
    }

    /// The holder most likely to have `card`.
    pub fn most_likely(&self, card: Card) -> Option<(Holder, f64)> {
        let slots = self.distribution(card)?;
        slots
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, &p)| (Holder::from_index(index, self.player_count), p))
    }

    /// Expected number of free cards each holder has, indexed like
    /// [`Holder::index`].
    pub fn expected_counts(&self) -> Vec<f64> {
        let mut counts = vec![0.0; self.player_count + 1];
        for slots in self.probs.values() {
            for (count, p) in counts.iter_mut().zip(slots) {
                *count += p;
            }
        }
        counts
    }

    /// Cards sorted from most to least likely to be held by `holder`.
    pub fn ranked_for(&self, holder: Holder) -> Vec<(Card, f64)> {
        let mut ranked = self
            .cards()
            .filter_map(|card| self.probability(card, holder).map(|p| (card, p)))
            .collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
    }
}
