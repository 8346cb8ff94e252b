//! Belief-state tracking over Pokemon Showdown battle logs.
//!
//! A battle log reveals hidden information only indirectly: an ability that
//! fires, a berry that gets eaten, a stat drop that goes through. This crate
//! keeps a probabilistic-constraint view of both teams ([`BattleState`]) and
//! narrows it event by event. Effects whose relative order the log does not
//! fix (simultaneous switch-ins, the end-of-turn residual phase) are raced
//! unordered: every candidate explanation parses the same event window, and
//! both activation and provable silence become evidence.
//!
//! [`Tracker`] is the entry point; feed it raw log text or pre-parsed
//! [`zoroark_protocol::Event`]s.

pub mod dex;
pub mod error;
pub mod infer;
pub mod reason;
pub mod state;
pub mod unordered;

pub use dex::Dex;
pub use error::{InferenceError, Result};
pub use infer::Tracker;
pub use state::BattleState;
