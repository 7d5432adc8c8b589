//! Line-oriented text format for game records.
//!
//! ```text
//! # comment
//! p alice bob carol          player names
//! h 3 17 29 ...              the first player's starting hand (optional)
//! t 20 22 26 28              one row of the table
//! t 30 43 52
//! a 29 31 64                 one card per player, closes the round
//! t ...                      rows after the last `a` are the current table
//! ```

use crate::card::Card;
use crate::error::ParseError;
use crate::game::{CardVec, GameRecord, ObserverHand, Round, Row, Rules, Table};
use std::io::BufRead;
use std::num::IntErrorKind;

/// Reads a game record, checking every card against `rules`.
pub fn read_record<I: BufRead>(input: I, rules: &Rules) -> Result<GameRecord, ParseError> {
    let mut players: Option<Vec<String>> = None;
    let mut hand: Option<CardVec> = None;
    let mut rounds = Vec::new();
    let mut rows = Vec::new();

    for (line_i, line) in input.lines().enumerate() {
        let line = line?;
        let err = |reason: &str| ParseError::Line {
            line: line_i + 1,
            reason: reason.to_string(),
        };
        let parse_card = |word: &str| -> Result<Card, ParseError> {
            let value = match word.parse::<u32>() {
                Ok(value) => value,
                Err(e) if *e.kind() == IntErrorKind::PosOverflow => {
                    return Err(err("bad card (too high)"));
                }
                Err(_) => return Err(err("bad card (not a number)")),
            };
            if value < u32::from(rules.min_card) {
                return Err(err("bad card (too low)"));
            }
            if value > u32::from(rules.max_card) {
                return Err(err("bad card (too high)"));
            }
            Card::from_string(word).map_err(|_| err("bad card (not a number)"))
        };

        let words = line.split_whitespace().collect::<Vec<_>>();
        let Some((&command, args)) = words.split_first() else {
            continue;
        };
        if command.starts_with('#') {
            continue;
        }

        match command {
            "p" => {
                if players.is_some() {
                    return Err(err("duplicated 'p' command"));
                }
                if args.len() < 2 {
                    return Err(err("too few players"));
                }
                players = Some(args.iter().map(|name| name.to_string()).collect());
            }
            "h" => {
                if hand.is_some() {
                    return Err(err("duplicated 'h' command"));
                }
                let cards = args
                    .iter()
                    .map(|&word| parse_card(word))
                    .collect::<Result<CardVec, _>>()?;
                if cards.len() != rules.hand_len {
                    return Err(err("bad hand length"));
                }
                hand = Some(cards);
            }
            "t" => {
                if args.is_empty() {
                    return Err(err("row cannot be empty"));
                }
                let cards = args
                    .iter()
                    .map(|&word| parse_card(word))
                    .collect::<Result<Vec<_>, _>>()?;
                rows.push(Row::new(cards));
            }
            "a" => {
                let player_count = players
                    .as_ref()
                    .map(Vec::len)
                    .ok_or_else(|| err("missing 'p' command"))?;
                let actions = args
                    .iter()
                    .map(|&word| parse_card(word))
                    .collect::<Result<Vec<_>, _>>()?;
                if actions.len() != player_count {
                    return Err(err("wrong number of actions"));
                }
                rounds.push(Round::new(Table::new(std::mem::take(&mut rows)), actions));
            }
            _ => return Err(err("unknown command")),
        }
    }

    let players = players.ok_or_else(|| ParseError::End("missing 'p' command".to_string()))?;
    let current_table = (!rows.is_empty()).then(|| Table::new(rows));
    let observer = hand.map(|cards| ObserverHand { player: 0, cards });

    Ok(GameRecord {
        players,
        rounds,
        observer,
        current_table,
    })
}

pub fn parse_record(text: &str, rules: &Rules) -> Result<GameRecord, ParseError> {
    read_record(text.as_bytes(), rules)
}
