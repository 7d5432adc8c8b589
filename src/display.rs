use crate::card::Card;
use crate::game::{Holder, Row, Table};
use crate::playout::MoveCost;
use crate::probability::ProbabilityTable;
use std::fmt;

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.value(), f)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let cards = self
            .cards
            .iter()
            .map(Card::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        write!(f, "[{cards}]")
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, row) in self.rows().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{row}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Holder::Player(player) => write!(f, "P{player}"),
            Holder::Nobody => write!(f, "nobody"),
        }
    }
}

/// Most likely cards listed after each holder's expected count.
const TOP_CARDS: usize = 5;

/// A probability table rendered with player names.
pub struct ProbabilityReport<'a> {
    pub table: &'a ProbabilityTable,
    pub names: &'a [String],
}

impl ProbabilityReport<'_> {
    fn holder_name(&self, holder: Holder) -> String {
        match holder {
            Holder::Player(player) => self
                .names
                .get(player)
                .cloned()
                .unwrap_or_else(|| holder.to_string()),
            Holder::Nobody => holder.to_string(),
        }
    }
}

impl fmt::Display for ProbabilityReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let holders = self.table.holders().collect::<Vec<_>>();

        write!(f, "{:>4}", "card")?;
        for &holder in &holders {
            write!(f, " {:>8.8}", self.holder_name(holder))?;
        }
        writeln!(f, " {:>8}", "likely")?;

        for card in self.table.cards() {
            write!(f, "{card:>4}")?;
            for &holder in &holders {
                let p = self.table.probability(card, holder).unwrap_or(0.0);
                write!(f, " {:>7.1}%", p * 100.0)?;
            }
            match self.table.most_likely(card) {
                Some((holder, _)) => writeln!(f, " {:>8.8}", self.holder_name(holder))?,
                None => writeln!(f)?,
            }
        }

        writeln!(f)?;
        writeln!(f, "Expected unseen cards per holder ({} samples):", self.table.samples())?;
        for (&holder, count) in holders.iter().zip(self.table.expected_counts()) {
            write!(f, "  {:<12} {:6.2}", self.holder_name(holder), count)?;
            let top = self.table.ranked_for(holder);
            for (card, _) in top.iter().filter(|(_, p)| *p > 0.0).take(TOP_CARDS) {
                write!(f, " {card}")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

impl fmt::Display for MoveCost {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:>4} {:+8.2}", self.card, self.relative_cost)
    }
}

impl fmt::Display for ProbabilityTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", ProbabilityReport { table: self, names: &[] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probability::{Accumulator, DegeneratePolicy};

    #[test]
    fn renders_rows_and_tables() {
        let table = Table::from_values(&[vec![3, 10], vec![55]]);
        assert_eq!(table.to_string(), "[3 10] [55]");
        assert_eq!(format!("{:>4}|{:<3}|", Card::new(9), Card::new(7)), "   9|7  |");
        assert_eq!(Holder::Player(3).to_string(), "P3");
        assert_eq!(Holder::Nobody.to_string(), "nobody");
    }

    #[test]
    fn report_uses_player_names() {
        let mut acc = Accumulator::new([Card::new(9)], 2);
        acc.add(Card::new(9), Holder::Player(1), 3.0);
        acc.add(Card::new(9), Holder::Nobody, 1.0);
        let table = acc.normalize(DegeneratePolicy::Reject).unwrap();
        let names = vec!["ann".to_string(), "ben".to_string()];
        let text = ProbabilityReport {
            table: &table,
            names: &names,
        }
        .to_string();

        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("card      ann      ben   nobody   likely"));
        assert_eq!(lines.next(), Some("   9     0.0%    75.0%    25.0%      ben"));
        assert!(text.lines().any(|line| line == "  ben            0.75 9"));
        assert!(text.lines().any(|line| line == "  ann            0.00"));
        assert!(table.to_string().contains("P1"));
    }

    #[test]
    fn report_lists_each_holders_likeliest_cards() {
        let mut acc = Accumulator::new([4, 9, 12].map(Card::new), 1);
        acc.add(Card::new(4), Holder::Player(0), 1.0);
        acc.add(Card::new(9), Holder::Player(0), 3.0);
        acc.add(Card::new(9), Holder::Nobody, 1.0);
        acc.add(Card::new(12), Holder::Nobody, 1.0);
        let table = acc.normalize(DegeneratePolicy::Reject).unwrap();
        let text = table.to_string();

        assert!(text.lines().any(|line| line == "  P0             1.75 4 9"), "{text}");
        assert!(text.lines().any(|line| line == "  nobody         1.25 12 9"), "{text}");
        assert!(text.lines().any(|line| line == "  12     0.0%   100.0%   nobody"), "{text}");
    }

    #[test]
    fn renders_move_costs() {
        let cost = MoveCost {
            card: Card::new(31),
            relative_cost: -10.0,
        };
        assert_eq!(cost.to_string(), "  31   -10.00");
    }
}
