use crate::error::ParseError;
use std::str::FromStr;

/// A numbered card. Cards are ordered by value and carry no other state; the
/// penalty weight is derived from the number.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Card(u8);

impl Card {
    pub const fn new(value: u8) -> Card {
        Card(value)
    }

    pub const fn value(&self) -> u8 {
        self.0
    }

    /// Penalty weight of the card: 1, plus 1 for multiples of 5, plus 1 more
    /// for multiples of 10, plus 4 for multiples of 11.
    pub const fn weight(&self) -> u32 {
        let value = self.0 as u32;
        let mut weight = 1;
        if value % 5 == 0 {
            weight += 1;
        }
        if value % 10 == 0 {
            weight += 1;
        }
        if value % 11 == 0 {
            weight += 4;
        }
        weight
    }

    /// Parses a card from its decimal representation.
    pub fn from_string(input: &str) -> Result<Card, ParseError> {
        input
            .trim()
            .parse::<u8>()
            .map(Card)
            .map_err(|_| ParseError::Card(input.to_string()))
    }
}

impl From<u8> for Card {
    fn from(value: u8) -> Self {
        Card(value)
    }
}

impl FromStr for Card {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Card::from_string(s)
    }
}

/// Sum of the weights of the given cards.
pub fn total_weight<'a, I>(cards: I) -> u32
where
    I: IntoIterator<Item = &'a Card>,
{
    cards.into_iter().map(Card::weight).sum()
}

use quickcheck::{Arbitrary, Gen};

impl Arbitrary for Card {
    fn arbitrary(g: &mut Gen) -> Self {
        let values = (1..=104).collect::<Vec<u8>>();
        Card(*g.choose(&values).unwrap())
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        Box::new(self.0.shrink().filter(|&v| v > 0).map(Card))
    }
}
