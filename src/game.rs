use crate::card::{Card, total_weight};
use crate::error::EstimateError;
use smallvec::SmallVec;
use std::collections::HashSet;

pub type CardVec = SmallVec<[Card; 12]>;

/// Fixed parameters of the game being observed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rules {
    pub min_card: u8,
    pub max_card: u8,
    pub max_row_len: usize,
    pub hand_len: usize,
}

impl Default for Rules {
    fn default() -> Self {
        Rules {
            min_card: 1,
            max_card: 104,
            max_row_len: 5,
            hand_len: 10,
        }
    }
}

impl Rules {
    pub fn cards(&self) -> impl Iterator<Item = Card> + use<> {
        (self.min_card..=self.max_card).map(Card::new)
    }

    pub fn contains(&self, card: Card) -> bool {
        (self.min_card..=self.max_card).contains(&card.value())
    }
}

/// A pile of cards on the table, in play order.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Row {
    pub cards: CardVec,
}

impl Row {
    pub fn new<I: IntoIterator<Item = Card>>(cards: I) -> Row {
        Row {
            cards: cards.into_iter().collect(),
        }
    }

    pub fn from_values(values: &[u8]) -> Row {
        Row::new(values.iter().copied().map(Card::new))
    }

    pub fn last(&self) -> Option<Card> {
        self.cards.last().copied()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn weight(&self) -> u32 {
        total_weight(&self.cards)
    }

    /// Number of cards that still fit before the row is full.
    pub fn slack(&self, max_row_len: usize) -> usize {
        max_row_len.saturating_sub(self.cards.len())
    }
}

/// The rows on the table at the moment players choose their cards.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    pub fn new(rows: Vec<Row>) -> Table {
        Table { rows }
    }

    pub fn from_values<R: AsRef<[u8]>>(rows: &[R]) -> Table {
        Table::new(rows.iter().map(|r| Row::from_values(r.as_ref())).collect())
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn cards(&self) -> impl Iterator<Item = Card> + '_ {
        self.rows.iter().flat_map(|row| row.cards.iter().copied())
    }

    pub fn card_count(&self) -> usize {
        self.rows.iter().map(Row::len).sum()
    }

    pub fn contains(&self, card: Card) -> bool {
        self.cards().any(|c| c == card)
    }

    /// The row a card would be appended to: the row with the highest last
    /// card that is still below `card`.
    pub fn match_row(&self, card: Card) -> Option<&Row> {
        self.match_row_index(card).map(|i| &self.rows[i])
    }

    pub fn match_row_index(&self, card: Card) -> Option<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.last().is_some_and(|last| last < card))
            .max_by_key(|(_, row)| row.last())
            .map(|(i, _)| i)
    }

    /// Index of the lightest row; ties go to the first one.
    pub fn lightest_row(&self) -> Option<usize> {
        self.rows
            .iter()
            .enumerate()
            .min_by_key(|&(i, row)| (row.weight(), i))
            .map(|(i, _)| i)
    }

    /// Puts `card` on the table and returns the penalty it collects: the
    /// weight of the row it takes, or 0.
    ///
    /// A card goes on its matching row while that row has room. On a full
    /// row, or below every row (where the lightest row is taken), the row is
    /// picked up and `card` starts it afresh.
    pub fn place(&mut self, card: Card, max_row_len: usize) -> u32 {
        let target = match self.match_row_index(card) {
            Some(i) if self.rows[i].len() < max_row_len => {
                self.rows[i].cards.push(card);
                return 0;
            }
            Some(i) => i,
            None => match self.lightest_row() {
                Some(i) => i,
                None => {
                    self.rows.push(Row::new([card]));
                    return 0;
                }
            },
        };

        let taken = std::mem::replace(&mut self.rows[target], Row::new([card]));
        taken.weight()
    }

    /// Checks the row invariants; `round` only labels the error.
    pub fn validate(&self, rules: &Rules, round: usize) -> Result<(), EstimateError> {
        let malformed = |reason: String| EstimateError::MalformedTable { round, reason };

        let mut seen = HashSet::new();
        for (row_i, row) in self.rows.iter().enumerate() {
            if row.is_empty() {
                return Err(malformed(format!("row {row_i} is empty")));
            }
            if row.len() > rules.max_row_len {
                return Err(malformed(format!(
                    "row {row_i} holds {} cards, more than {}",
                    row.len(),
                    rules.max_row_len
                )));
            }
            for &card in &row.cards {
                if !rules.contains(card) {
                    return Err(malformed(format!("card {} is out of range", card.value())));
                }
                if !seen.insert(card) {
                    return Err(malformed(format!("card {} appears twice", card.value())));
                }
            }
        }
        Ok(())
    }
}

/// Who holds a card: one of the tracked players, or nobody at all.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Holder {
    Player(usize),
    Nobody,
}

impl Holder {
    /// Dense index of the holder; `Nobody` comes after every player.
    pub fn index(&self, player_count: usize) -> usize {
        match *self {
            Holder::Player(player) => player,
            Holder::Nobody => player_count,
        }
    }

    pub fn from_index(index: usize, player_count: usize) -> Holder {
        if index < player_count {
            Holder::Player(index)
        } else {
            Holder::Nobody
        }
    }

    pub fn all(player_count: usize) -> impl Iterator<Item = Holder> {
        (0..player_count)
            .map(Holder::Player)
            .chain(std::iter::once(Holder::Nobody))
    }
}

/// One observed round: the table players saw and the card each of them played.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Round {
    pub table: Table,
    pub actions: Vec<Card>,
}

impl Round {
    pub fn new(table: Table, actions: Vec<Card>) -> Round {
        Round { table, actions }
    }
}

/// The full starting hand of the player running the analysis.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObserverHand {
    pub player: usize,
    pub cards: CardVec,
}

/// Everything observed so far in a game.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GameRecord {
    pub players: Vec<String>,
    pub rounds: Vec<Round>,
    pub observer: Option<ObserverHand>,
    pub current_table: Option<Table>,
}

impl GameRecord {
    pub fn new(rounds: Vec<Round>) -> GameRecord {
        GameRecord {
            rounds,
            ..GameRecord::default()
        }
    }

    /// Builds a record from raw per-round tables and per-round actions.
    pub fn from_values(
        tables: &[Vec<Vec<u8>>],
        actionss: &[Vec<u8>],
    ) -> Result<GameRecord, EstimateError> {
        if tables.len() != actionss.len() {
            return Err(EstimateError::InputInconsistency(format!(
                "{} tables but {} rounds of actions",
                tables.len(),
                actionss.len()
            )));
        }

        let rounds = tables
            .iter()
            .zip(actionss)
            .map(|(table, actions)| {
                Round::new(
                    Table::from_values(table),
                    actions.iter().copied().map(Card::new).collect(),
                )
            })
            .collect();

        Ok(GameRecord::new(rounds))
    }

    pub fn with_observer(mut self, player: usize, cards: &[u8]) -> GameRecord {
        self.observer = Some(ObserverHand {
            player,
            cards: cards.iter().copied().map(Card::new).collect(),
        });
        self
    }

    pub fn with_current_table(mut self, table: Table) -> GameRecord {
        self.current_table = Some(table);
        self
    }

    pub fn player_count(&self) -> usize {
        match self.rounds.first() {
            Some(round) => round.actions.len(),
            None => self.players.len(),
        }
    }

    /// Cards a player is known to have held before the first observed round.
    pub fn known_cards(&self, player: usize) -> CardVec {
        match &self.observer {
            Some(observer) if observer.player == player => observer.cards.clone(),
            _ => self
                .rounds
                .iter()
                .filter_map(|round| round.actions.get(player).copied())
                .collect(),
        }
    }

    /// Every card whose location is known: on a table, played, or in the
    /// observer's hand.
    pub fn seen_cards(&self) -> HashSet<Card> {
        let mut seen = HashSet::new();
        for round in &self.rounds {
            seen.extend(round.table.cards());
            seen.extend(round.actions.iter().copied());
        }
        if let Some(table) = &self.current_table {
            seen.extend(table.cards());
        }
        if let Some(observer) = &self.observer {
            seen.extend(observer.cards.iter().copied());
        }
        seen
    }

    /// Validates the record against the rules.
    pub fn validate(&self, rules: &Rules) -> Result<(), EstimateError> {
        let inconsistent = |reason: String| EstimateError::InputInconsistency(reason);

        let player_count = self.player_count();
        if player_count == 0 {
            return Err(inconsistent("no players".to_string()));
        }
        if !self.players.is_empty() && self.players.len() != player_count {
            return Err(inconsistent(format!(
                "{} player names for {} players",
                self.players.len(),
                player_count
            )));
        }

        let mut played = HashSet::new();
        for (round_i, round) in self.rounds.iter().enumerate() {
            round.table.validate(rules, round_i)?;
            if round.actions.len() != player_count {
                return Err(inconsistent(format!(
                    "round {round_i} has {} actions for {player_count} players",
                    round.actions.len()
                )));
            }
            for &card in &round.actions {
                if !rules.contains(card) {
                    return Err(inconsistent(format!(
                        "action {} in round {round_i} is out of range",
                        card.value()
                    )));
                }
                if !played.insert(card) {
                    return Err(inconsistent(format!(
                        "card {} was played twice",
                        card.value()
                    )));
                }
            }
        }

        // A card played in round r or later was still in a hand at round r.
        for (round_i, round) in self.rounds.iter().enumerate() {
            for later in &self.rounds[round_i..] {
                if let Some(card) = later.actions.iter().find(|&&c| round.table.contains(c)) {
                    return Err(EstimateError::MalformedTable {
                        round: round_i,
                        reason: format!("card {} is on the table before it is played", card.value()),
                    });
                }
            }
        }

        if let Some(table) = &self.current_table {
            table.validate(rules, self.rounds.len())?;
        }

        if let Some(observer) = &self.observer {
            self.validate_observer(rules, observer, player_count)?;
        }

        Ok(())
    }

    fn validate_observer(
        &self,
        rules: &Rules,
        observer: &ObserverHand,
        player_count: usize,
    ) -> Result<(), EstimateError> {
        let inconsistent = |reason: String| EstimateError::InputInconsistency(reason);

        if observer.player >= player_count {
            return Err(inconsistent(format!(
                "observer {} is not one of {player_count} players",
                observer.player
            )));
        }
        let hand = observer.cards.iter().copied().collect::<HashSet<Card>>();
        if hand.len() != observer.cards.len() || hand.len() != rules.hand_len {
            return Err(inconsistent(format!(
                "observer hand must hold {} distinct cards",
                rules.hand_len
            )));
        }
        if let Some(card) = hand.iter().find(|&&c| !rules.contains(c)) {
            return Err(inconsistent(format!(
                "observer card {} is out of range",
                card.value()
            )));
        }

        let own_actions = self
            .rounds
            .iter()
            .map(|round| round.actions[observer.player])
            .collect::<HashSet<Card>>();
        if let Some(card) = own_actions.iter().find(|&&c| !hand.contains(&c)) {
            return Err(inconsistent(format!(
                "observer played {} which is not in their hand",
                card.value()
            )));
        }

        let unplayed = hand.difference(&own_actions).copied().collect::<HashSet<Card>>();
        let elsewhere = self
            .rounds
            .iter()
            .flat_map(|round| round.table.cards().chain(round.actions.iter().copied()))
            .chain(self.current_table.iter().flat_map(Table::cards));
        for card in elsewhere {
            if unplayed.contains(&card) {
                return Err(inconsistent(format!(
                    "card {} is both in the observer hand and elsewhere",
                    card.value()
                )));
            }
        }

        Ok(())
    }
}
