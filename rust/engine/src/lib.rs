//! # bigtwo-engine: Big Two Game Engine Core
//!
//! Pure, synchronous rules for the Big Two (大老二) climbing card game for
//! two to four players: card model, hand evaluation, dealing and the per-table
//! trick state machine.
//!
//! ## Core Modules
//!
//! - [`cards`] - Card representation (Rank, Suit, Card) in Big Two order
//! - [`deck`] - Deck shuffling with a ChaCha20 RNG, seedable for replay
//! - [`deal`] - Dealing 13 cards per seat and choosing the first player
//! - [`hand`] - Combination classification and the "beats" relation
//! - [`rules`] - Table ruleset and play-size / first-lead validation
//! - [`table`] - Turn and trick state machine for one table
//! - [`logger`] - Action and game records, JSONL game log
//! - [`errors`] - Error types for game operations
//!
//! ## Quick Start
//!
//! ```rust
//! use bigtwo_engine::cards::parse_cards;
//! use bigtwo_engine::hand::{evaluate, HandType};
//! use bigtwo_engine::rules::Ruleset;
//!
//! let rules = Ruleset::classic();
//! let full_house = evaluate(&parse_cards("9c 9d 9s 4h 4s").unwrap(), &rules).unwrap();
//! let flush = evaluate(&parse_cards("3h 7h 9h Jh Ah").unwrap(), &rules).unwrap();
//!
//! assert_eq!(full_house.hand_type, HandType::FullHouse);
//! assert!(full_house.beats(&flush));
//! ```
//!
//! ## Playing a Table
//!
//! ```rust
//! use bigtwo_engine::deal::deal;
//! use bigtwo_engine::deck::Deck;
//! use bigtwo_engine::rules::Ruleset;
//! use bigtwo_engine::table::{Phase, Table};
//!
//! let mut table = Table::new(1, Ruleset::classic());
//! table.join(2).unwrap();
//! let dealt = deal(2, table.rules(), &mut Deck::new_with_seed(42)).unwrap();
//! let first = table.start(1, dealt).unwrap();
//!
//! assert_eq!(table.phase(), Phase::TrickOpen);
//! assert_eq!(table.current_player(), Some(first));
//! ```

pub mod cards;
pub mod deal;
pub mod deck;
pub mod errors;
pub mod hand;
pub mod logger;
pub mod rules;
pub mod table;
