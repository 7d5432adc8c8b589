use crate::card::Card;
use thiserror::Error;

/// Errors raised while validating a game record or estimating holders.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimateError {
    /// A table breaks the row invariants, or a hand overlaps the table.
    #[error("malformed table in round {round}: {reason}")]
    MalformedTable { round: usize, reason: String },

    /// The record cannot describe a real deal.
    #[error("inconsistent input: {0}")]
    InputInconsistency(String),

    /// Cards that collected no weighted evidence at all.
    #[error("no evidence collected for cards {cards:?}")]
    DegenerateCard { cards: Vec<Card> },

    /// Every deal drawn for a move ranking carried zero weight.
    #[error("no deal with positive weight out of {0}")]
    NoDeals(usize),

    #[error("worker pool: {0}")]
    ThreadPool(String),
}

/// Errors raised while reading a game record.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("bad card: {0:?}")]
    Card(String),

    #[error("line {line}: {reason}")]
    Line { line: usize, reason: String },

    #[error("end of input: {0}")]
    End(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
