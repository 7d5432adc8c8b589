use crate::card::Card;
use crate::deal::HandSampler;
use crate::error::EstimateError;
use crate::game::{CardVec, GameRecord, Holder, Rules};
use crate::heuristic::play_rank;
use crate::playout::{MoveCost, relative_cost, simulate_playout};
use crate::probability::{Accumulator, DegeneratePolicy, ProbabilityTable};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

pub const DEFAULT_SAMPLES: usize = 100_000;
pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_DEALS: usize = 10_000;

/// Chance that a player skips their current favourite card for the next one.
pub const PREFERENCE_DECAY: f64 = 0.5;

#[derive(Clone, Debug, PartialEq)]
pub struct EstimatorConfig {
    /// Number of deals to sample.
    pub samples: usize,
    /// Master seed. `None` draws one from the thread-local generator.
    pub seed: Option<u64>,
    /// Worker threads; 0 lets rayon decide.
    pub threads: usize,
    /// Deals per unit of parallel work. Results for a given seed depend on
    /// this value but not on `threads`.
    pub chunk_size: usize,
    pub degenerate: DegeneratePolicy,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            samples: DEFAULT_SAMPLES,
            seed: None,
            threads: num_cpus::get(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            degenerate: DegeneratePolicy::default(),
        }
    }
}

/// One hypothesized deal.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// Starting hand of every player.
    pub hands: Vec<CardVec>,
    /// Holder of each free card, in the order of [`Estimator::free_cards`].
    pub holders: Vec<Holder>,
}

/// Monte Carlo estimate of who holds each unseen card.
///
/// Every sample deals the unseen cards at random on top of what each player
/// is known to have played, then weighs the deal by how likely the recorded
/// plays are under the heuristic: a player's k-th preferred card is played
/// with probability `0.5^k`.
#[derive(Clone, Debug)]
pub struct Estimator {
    rules: Rules,
    record: GameRecord,
    config: EstimatorConfig,
    free: Vec<Card>,
    known: Vec<CardVec>,
    missing: Vec<usize>,
}

impl Estimator {
    pub fn new(
        rules: Rules,
        record: GameRecord,
        config: EstimatorConfig,
    ) -> Result<Estimator, EstimateError> {
        record.validate(&rules)?;

        let player_count = record.player_count();
        let seen = record.seen_cards();
        let free = rules
            .cards()
            .filter(|card| !seen.contains(card))
            .collect::<Vec<Card>>();

        let known = (0..player_count)
            .map(|player| record.known_cards(player))
            .collect::<Vec<CardVec>>();

        let mut missing = Vec::with_capacity(player_count);
        for (player, cards) in known.iter().enumerate() {
            if cards.len() > rules.hand_len {
                return Err(EstimateError::InputInconsistency(format!(
                    "player {player} is known to hold {} cards but a hand has {}",
                    cards.len(),
                    rules.hand_len
                )));
            }
            missing.push(rules.hand_len - cards.len());
        }

        let needed = missing.iter().sum::<usize>();
        if needed > free.len() {
            return Err(EstimateError::InputInconsistency(format!(
                "hands need {needed} more cards but only {} are unseen",
                free.len()
            )));
        }

        log::debug!(
            "{} unseen cards, {} dealt per sample to {} players",
            free.len(),
            needed,
            player_count
        );

        Ok(Estimator {
            rules,
            record,
            config,
            free,
            known,
            missing,
        })
    }

    pub fn record(&self) -> &GameRecord {
        &self.record
    }

    pub fn player_count(&self) -> usize {
        self.known.len()
    }

    /// Cards nobody has seen, in ascending order.
    pub fn free_cards(&self) -> &[Card] {
        &self.free
    }

    /// An empty accumulator over the free cards.
    pub fn new_accumulator(&self) -> Accumulator {
        Accumulator::new(self.free.iter().copied(), self.player_count())
    }

    /// Deals the free cards: every player gets their known cards plus a
    /// uniform draw without replacement up to a full hand.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Sample {
        let needed = self.missing.iter().sum::<usize>();
        let mut pool = (0..self.free.len()).collect::<Vec<usize>>();
        let (drawn, _) = pool.partial_shuffle(rng, needed);

        let mut holders = vec![Holder::Nobody; self.free.len()];
        let mut hands = self.known.clone();
        let mut draws = drawn.iter();
        for (player, &count) in self.missing.iter().enumerate() {
            for &free_i in draws.by_ref().take(count) {
                holders[free_i] = Holder::Player(player);
                hands[player].push(self.free[free_i]);
            }
        }

        Sample { hands, holders }
    }

    /// Probability of the recorded plays given the sampled hands.
    pub fn likelihood(&self, sample: &Sample) -> f64 {
        let mut hands = sample.hands.clone();
        let mut likelihood = 1.0;

        for round in &self.record.rounds {
            for (hand, &action) in hands.iter_mut().zip(&round.actions) {
                let Some(rank) = play_rank(&self.rules, &round.table, hand, action) else {
                    return 0.0;
                };
                likelihood *= PREFERENCE_DECAY.powi(rank as i32);
                hand.retain(|card| *card != action);
            }
        }

        likelihood
    }

    /// Draws `samples` deals from `rng` and folds their evidence into `acc`.
    pub fn accumulate<R: Rng + ?Sized>(&self, rng: &mut R, samples: usize, acc: &mut Accumulator) {
        self.accumulate_until(rng, samples, acc, &AtomicBool::new(false));
    }

    fn accumulate_until<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        samples: usize,
        acc: &mut Accumulator,
        cancel: &AtomicBool,
    ) {
        for _ in 0..samples {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let sample = self.sample(rng);
            let weight = self.likelihood(&sample);
            for (&card, &holder) in self.free.iter().zip(&sample.holders) {
                acc.add(card, holder, weight);
            }
            acc.count_sample();
        }
    }

    /// Samples the configured number of deals in parallel.
    pub fn run(&self) -> Result<Accumulator, EstimateError> {
        self.run_until(&AtomicBool::new(false))
    }

    /// Like [`Estimator::run`], stopping early once `cancel` is set. The flag
    /// is checked between samples.
    pub fn run_until(&self, cancel: &AtomicBool) -> Result<Accumulator, EstimateError> {
        let samples = self.config.samples;
        let chunk_size = self.config.chunk_size.max(1);
        let seed = self.config.seed.unwrap_or_else(|| rand::rng().random());

        let mut master = StdRng::seed_from_u64(seed);
        let plan = (0..samples.div_ceil(chunk_size))
            .map(|chunk| {
                let len = chunk_size.min(samples - chunk * chunk_size);
                (master.random::<u64>(), len)
            })
            .collect::<Vec<(u64, usize)>>();

        log::info!(
            "{:<24}{} deals in {} chunks (seed {})",
            "sampling",
            samples,
            plan.len(),
            seed
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map_err(|e| EstimateError::ThreadPool(e.to_string()))?;

        let partials = pool.install(|| {
            plan.par_iter()
                .enumerate()
                .map(|(chunk, &(chunk_seed, len))| {
                    let mut rng = StdRng::seed_from_u64(chunk_seed);
                    let mut acc = self.new_accumulator();
                    self.accumulate_until(&mut rng, len, &mut acc, cancel);
                    log::debug!("chunk {chunk} finished {} deals", acc.samples());
                    acc
                })
                .collect::<Vec<Accumulator>>()
        });

        let mut total = self.new_accumulator();
        for partial in partials {
            total.merge(partial);
        }

        if total.samples() < samples {
            log::warn!(
                "sampling stopped after {} of {} deals",
                total.samples(),
                samples
            );
        }
        log::info!("{:<24}{} deals", "sampled", total.samples());

        Ok(total)
    }

    /// Samples and normalizes in one go.
    pub fn estimate(&self) -> Result<ProbabilityTable, EstimateError> {
        self.run()?.normalize(self.config.degenerate)
    }

    pub fn estimate_until(&self, cancel: &AtomicBool) -> Result<ProbabilityTable, EstimateError> {
        self.run_until(cancel)?.normalize(self.config.degenerate)
    }

    /// Known cards `player` has not played yet.
    pub fn unplayed_cards(&self, player: usize) -> CardVec {
        let mut cards = self.known.get(player).cloned().unwrap_or_default();
        for round in &self.record.rounds {
            if let Some(action) = round.actions.get(player) {
                cards.retain(|card| *card != *action);
            }
        }
        cards
    }

    /// A sampler of current deals that follows `table`, an estimate for this
    /// record. Players start from their unplayed known cards and receive the
    /// free cards they are missing; the rest stays with nobody.
    pub fn hand_sampler(&self, table: &ProbabilityTable) -> Result<HandSampler, EstimateError> {
        if table.player_count() != self.player_count() || !table.cards().eq(self.free.iter().copied()) {
            return Err(EstimateError::InputInconsistency(
                "probability table does not cover this record's free cards".to_string(),
            ));
        }

        let fixed = (0..self.player_count())
            .map(|player| self.unplayed_cards(player))
            .collect::<Vec<CardVec>>();
        let needed = self.missing.iter().sum::<usize>();
        let mut capacities = self.missing.clone();
        capacities.push(self.free.len() - needed);

        HandSampler::new(table, fixed, capacities)
    }

    /// Ranks the observer's unplayed cards as the next play, best first.
    ///
    /// Draws `deals` deals from `table` and, for each candidate card, plays
    /// the rest of the hand out from the current table with that card as the
    /// observer's opening. Costs are averaged with the deals' weights.
    pub fn recommend<R: Rng + ?Sized>(
        &self,
        table: &ProbabilityTable,
        deals: usize,
        rng: &mut R,
    ) -> Result<Vec<MoveCost>, EstimateError> {
        let observer = self.record.observer.as_ref().ok_or_else(|| {
            EstimateError::InputInconsistency("ranking moves needs the observer's hand".to_string())
        })?;
        let current = self.record.current_table.as_ref().ok_or_else(|| {
            EstimateError::InputInconsistency("ranking moves needs the current table".to_string())
        })?;

        let sampler = self.hand_sampler(table)?;
        let options = sampler.fixed_hand(observer.player).to_vec();
        if options.is_empty() {
            return Ok(Vec::new());
        }

        log::info!(
            "{:<24}{} cards over {} deals",
            "ranking moves",
            options.len(),
            deals
        );

        let mut totals = vec![0.0; options.len()];
        let mut total_weight = 0.0;
        for _ in 0..deals {
            let deal = sampler.sample(rng);
            if deal.weight <= 0.0 {
                continue;
            }
            total_weight += deal.weight;
            for (total, &card) in totals.iter_mut().zip(&options) {
                let costs = simulate_playout(
                    &self.rules,
                    current.clone(),
                    deal.hands.clone(),
                    Some((observer.player, card)),
                    rng,
                );
                *total += relative_cost(&costs, observer.player) * deal.weight;
            }
        }

        if total_weight <= 0.0 {
            return Err(EstimateError::NoDeals(deals));
        }

        let mut ranked = options
            .into_iter()
            .zip(totals)
            .map(|(card, total)| MoveCost {
                card,
                relative_cost: total / total_weight,
            })
            .collect::<Vec<MoveCost>>();
        ranked.sort_by(|a, b| {
            a.relative_cost
                .total_cmp(&b.relative_cost)
                .then(a.card.cmp(&b.card))
        });
        Ok(ranked)
    }
}

/// Estimates holder probabilities for every unseen card of `record`.
pub fn card_probabilities(
    rules: &Rules,
    record: &GameRecord,
    config: EstimatorConfig,
) -> Result<ProbabilityTable, EstimateError> {
    Estimator::new(rules.clone(), record.clone(), config)?.estimate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Table;
    use std::collections::HashSet;

    fn example_record() -> GameRecord {
        GameRecord::from_values(
            &[
                vec![vec![20, 22, 26, 28], vec![30, 43, 52], vec![50, 63, 67, 82], vec![80, 85, 103]],
                vec![vec![31], vec![30, 43, 52, 64], vec![96], vec![80, 85, 103]],
            ],
            &[vec![29, 31, 64, 96, 86], vec![70, 100, 74, 34, 40]],
        )
        .unwrap()
    }

    fn config(samples: usize, seed: u64) -> EstimatorConfig {
        EstimatorConfig {
            samples,
            seed: Some(seed),
            threads: 2,
            chunk_size: 64,
            degenerate: DegeneratePolicy::Reject,
        }
    }

    fn tiny_rules() -> Rules {
        Rules {
            min_card: 1,
            max_card: 12,
            max_row_len: 5,
            hand_len: 2,
        }
    }

    #[test]
    fn free_cards_exclude_everything_seen() {
        let estimator =
            Estimator::new(Rules::default(), example_record(), config(1, 1)).unwrap();
        assert_eq!(estimator.free_cards().len(), 104 - 24);
        for card in [20, 103, 29, 86, 40, 31] {
            assert!(!estimator.free_cards().contains(&Card::new(card)));
        }
        assert_eq!(estimator.player_count(), 5);
    }

    #[test]
    fn samples_are_consistent_with_the_record() {
        let estimator =
            Estimator::new(Rules::default(), example_record(), config(1, 1)).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let sample = estimator.sample(&mut rng);
            let mut dealt = HashSet::new();
            for (player, hand) in sample.hands.iter().enumerate() {
                assert_eq!(hand.len(), 10);
                for known in estimator.record().known_cards(player) {
                    assert!(hand.contains(&known));
                }
                for &card in hand {
                    assert!(dealt.insert(card), "card {card:?} dealt twice");
                }
            }
            for (&card, &holder) in estimator.free_cards().iter().zip(&sample.holders) {
                match holder {
                    Holder::Player(p) => assert!(sample.hands[p].contains(&card)),
                    Holder::Nobody => assert!(!dealt.contains(&card)),
                }
            }
            let assigned = sample.holders.iter().filter(|h| **h != Holder::Nobody).count();
            assert_eq!(assigned, 40);

            let likelihood = estimator.likelihood(&sample);
            assert!(likelihood > 0.0 && likelihood <= 1.0);
        }
    }

    #[test]
    fn likelihood_decays_with_preference_rank() {
        let record = GameRecord::from_values(&[vec![vec![5]]], &[vec![3]]).unwrap();
        let estimator = Estimator::new(tiny_rules(), record, config(1, 1)).unwrap();
        let hand = |values: &[u8]| Sample {
            hands: vec![values.iter().copied().map(Card::new).collect()],
            holders: Vec::new(),
        };

        // 1 is below 3, so 3 is the favourite; 4 and 6 are both preferred to 3
        assert_eq!(estimator.likelihood(&hand(&[3, 1])), 1.0);
        assert_eq!(estimator.likelihood(&hand(&[3, 4])), 0.5);
        assert_eq!(estimator.likelihood(&hand(&[3, 6])), 0.5);
        assert_eq!(estimator.likelihood(&hand(&[1, 2])), 0.0);
    }

    #[test]
    fn rejects_more_rounds_than_cards_in_hand() {
        let rules = Rules {
            hand_len: 1,
            ..tiny_rules()
        };
        let record =
            GameRecord::from_values(&[vec![vec![5]], vec![vec![5, 7]]], &[vec![7], vec![8]])
                .unwrap();
        assert!(matches!(
            Estimator::new(rules, record, config(1, 1)),
            Err(EstimateError::InputInconsistency(_))
        ));
    }

    #[test]
    fn rejects_too_few_free_cards() {
        let rules = Rules {
            max_card: 6,
            hand_len: 3,
            ..tiny_rules()
        };
        let record = GameRecord::from_values(&[vec![vec![1]]], &[vec![2, 3]]).unwrap();
        assert!(matches!(
            Estimator::new(rules, record, config(1, 1)),
            Err(EstimateError::InputInconsistency(_))
        ));
    }

    #[test]
    fn observer_hand_is_never_free_or_dealt() {
        let record = example_record()
            .with_observer(0, &[29, 70, 1, 2, 3, 4, 5, 6, 7, 8])
            .with_current_table(Table::from_values(&[vec![31, 34], vec![64, 70]]));
        let estimator = Estimator::new(Rules::default(), record, config(1, 1)).unwrap();
        assert_eq!(estimator.free_cards().len(), 80 - 8);
        assert!(!estimator.free_cards().contains(&Card::new(1)));

        let sample = estimator.sample(&mut StdRng::seed_from_u64(3));
        assert_eq!(
            sample.hands[0].as_slice(),
            [29, 70, 1, 2, 3, 4, 5, 6, 7, 8].map(Card::new).as_slice()
        );
        let assigned = sample.holders.iter().filter(|h| **h != Holder::Nobody).count();
        assert_eq!(assigned, 32);
    }

    #[test]
    fn sequential_accumulation_counts_samples() {
        let estimator =
            Estimator::new(Rules::default(), example_record(), config(1, 1)).unwrap();
        let mut acc = estimator.new_accumulator();
        estimator.accumulate(&mut StdRng::seed_from_u64(11), 25, &mut acc);
        assert_eq!(acc.samples(), 25);
        for &card in estimator.free_cards() {
            assert!(acc.total(card) > 0.0);
        }
    }

    #[test]
    fn seeded_runs_do_not_depend_on_thread_count() {
        let single = EstimatorConfig {
            threads: 1,
            ..config(500, 42)
        };
        let many = EstimatorConfig {
            threads: 4,
            ..config(500, 42)
        };
        let a = Estimator::new(Rules::default(), example_record(), single)
            .unwrap()
            .estimate()
            .unwrap();
        let b = Estimator::new(Rules::default(), example_record(), many)
            .unwrap()
            .estimate()
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.samples(), 500);
    }

    #[test]
    fn cancelled_run_takes_no_samples() {
        let estimator =
            Estimator::new(Rules::default(), example_record(), config(500, 1)).unwrap();
        let cancel = AtomicBool::new(true);
        let acc = estimator.run_until(&cancel).unwrap();
        assert_eq!(acc.samples(), 0);
        assert!(matches!(
            estimator.estimate_until(&cancel),
            Err(EstimateError::DegenerateCard { .. })
        ));

        let uniform = EstimatorConfig {
            degenerate: DegeneratePolicy::Uniform,
            ..config(500, 1)
        };
        let estimator = Estimator::new(Rules::default(), example_record(), uniform).unwrap();
        let table = estimator.estimate_until(&cancel).unwrap();
        assert_eq!(table.len(), 80);
        assert_eq!(table.probability(Card::new(1), Holder::Nobody), Some(1.0 / 6.0));
    }

    /// Two players, hands of two, nothing played yet. The opponent surely
    /// holds 16 and 17; opening with 15 takes the full row [10..14], while
    /// opening with 31 leaves that row to the opponent.
    fn endgame() -> (Estimator, ProbabilityTable) {
        let rules = Rules {
            min_card: 10,
            max_card: 33,
            max_row_len: 5,
            hand_len: 2,
        };
        let mut record = GameRecord::new(Vec::new())
            .with_observer(0, &[15, 31])
            .with_current_table(Table::from_values(&[
                vec![10, 11, 12, 13, 14],
                vec![18, 19, 20, 21, 22],
                vec![23, 24, 25, 26, 27],
                vec![30],
            ]));
        record.players = vec!["me".to_string(), "them".to_string()];
        let estimator = Estimator::new(rules, record, config(1, 1)).unwrap();

        let mut acc = estimator.new_accumulator();
        for &card in estimator.free_cards() {
            let holder = if card.value() < 18 { Holder::Player(1) } else { Holder::Nobody };
            acc.add(card, holder, 1.0);
        }
        let table = acc.normalize(DegeneratePolicy::Reject).unwrap();
        (estimator, table)
    }

    #[test]
    fn unplayed_cards_drop_the_observer_actions() {
        let record = example_record().with_observer(0, &[29, 70, 1, 2, 3, 4, 5, 6, 7, 8]);
        let estimator = Estimator::new(Rules::default(), record, config(1, 1)).unwrap();
        assert_eq!(
            estimator.unplayed_cards(0).as_slice(),
            [1, 2, 3, 4, 5, 6, 7, 8].map(Card::new).as_slice()
        );
        assert!(estimator.unplayed_cards(1).is_empty());
    }

    #[test]
    fn hand_sampler_deals_current_hands() {
        let record = example_record()
            .with_observer(0, &[29, 70, 1, 2, 3, 4, 5, 6, 7, 8])
            .with_current_table(Table::from_values(&[vec![31, 34], vec![64, 70]]));
        let estimator = Estimator::new(Rules::default(), record, config(400, 2)).unwrap();
        let table = estimator.estimate().unwrap();
        let sampler = estimator.hand_sampler(&table).unwrap();

        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..20 {
            let deal = sampler.sample(&mut rng);
            assert_eq!(deal.hands.len(), 5);
            assert_eq!(deal.hands[0], estimator.unplayed_cards(0));
            for hand in &deal.hands[1..] {
                assert_eq!(hand.len(), 8);
                assert!(hand.iter().all(|card| estimator.free_cards().contains(card)));
            }
            assert!(deal.weight.is_finite() && deal.weight >= 0.0);
        }
    }

    #[test]
    fn hand_sampler_rejects_a_foreign_table() {
        let (estimator, _) = endgame();
        let other = Estimator::new(Rules::default(), example_record(), config(1, 1)).unwrap();
        let foreign = other.new_accumulator().normalize(DegeneratePolicy::Uniform).unwrap();
        assert!(matches!(
            estimator.hand_sampler(&foreign),
            Err(EstimateError::InputInconsistency(_))
        ));
    }

    #[test]
    fn recommend_avoids_taking_the_full_row() {
        let (estimator, table) = endgame();
        let ranked = estimator
            .recommend(&table, 50, &mut StdRng::seed_from_u64(3))
            .unwrap();

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].card, Card::new(31));
        assert!((ranked[0].relative_cost + 10.0).abs() < 1e-9, "{ranked:?}");
        assert_eq!(ranked[1].card, Card::new(15));
        assert!((8.0..=11.0).contains(&ranked[1].relative_cost), "{ranked:?}");
    }

    #[test]
    fn recommend_needs_observer_and_current_table() {
        let estimator =
            Estimator::new(Rules::default(), example_record(), config(200, 1)).unwrap();
        let table = estimator.estimate().unwrap();
        assert!(matches!(
            estimator.recommend(&table, 10, &mut StdRng::seed_from_u64(1)),
            Err(EstimateError::InputInconsistency(_))
        ));
    }

    #[test]
    fn rejects_table_card_out_of_range() {
        let record = GameRecord::from_values(&[vec![vec![0]]], &[vec![7, 8]]).unwrap();
        assert!(matches!(
            Estimator::new(Rules::default(), record, config(1, 1)),
            Err(EstimateError::MalformedTable { round: 0, .. })
        ));
    }
}
