//! Error taxonomy for the inference engine
//!
//! Every variant here is fatal: a violated invariant means either the event
//! stream is inconsistent or the engine mis-tracked something, and continuing
//! with corrupted belief state is worse than stopping. No-match inference
//! rounds are ordinary `Ok(None)` values, never errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Moveset is already full (known moves: {known})")]
    MovesetFull { known: String },

    #[error("Moveset already contains {0}")]
    DuplicateMove(String),

    #[error("Cannot replace unrevealed move {0}")]
    ReplaceAbsent(String),

    #[error("Moveset size can only grow (current {current}, requested {requested})")]
    MovesetShrink { current: usize, requested: usize },

    #[error("{name} status lasted longer than expected")]
    StatusOverflow { name: String },

    #[error("All possibilities for {what} have been ruled out")]
    EmptyPossibilities { what: String },

    #[error("Inference contradiction for {effect}: {detail}")]
    Contradiction { effect: String, detail: String },

    #[error("Unknown {kind} name: {name}")]
    UnknownName { kind: &'static str, name: String },

    #[error("Unexpected event while parsing {effect}: {detail}")]
    UnexpectedEvent { effect: String, detail: String },

    #[error("No pokemon matching {0}")]
    MissingPokemon(String),

    #[error(transparent)]
    BadDexData(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InferenceError>;
