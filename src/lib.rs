pub mod analysis;
pub mod card;
pub mod deal;
pub mod display;
pub mod error;
pub mod game;
pub mod heuristic;
pub mod playout;
pub mod probability;
pub mod record;

pub use analysis::*;
pub use card::*;
pub use deal::*;
pub use error::*;
pub use game::*;
pub use heuristic::*;
pub use playout::*;
pub use probability::*;
pub use record::*;
