//! Typed battle log events for Pokemon Showdown streams.
//!
//! This crate turns the `|`-separated battle log lines into a closed
//! [`Event`] enum that downstream state tracking and inference can match on.
//! It deliberately knows nothing about battle state: its job is only to give
//! every event a typed "who" ([`MonIdent`]) and a queryable keyword bag
//! ([`EffectSource`] for `[from]`/`[of]` annotations).

use thiserror::Error;

pub mod events;
pub mod types;

pub use events::{parse_event, parse_event_log, EffectSource, Event};
pub use types::{HpStatus, MonIdent, Player, PokemonDetails, Stat};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Empty message")]
    EmptyMessage,
}
