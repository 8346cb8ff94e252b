//! Belief-state containers
//!
//! Everything under this module is plain trackable state: what we know and
//! what remains possible. The event-driven logic that *changes* these beliefs
//! lives in [`crate::infer`].

pub mod battle;
pub mod counters;
pub mod moveset;
pub mod pokemon;
pub mod possibility;
pub mod stats;
pub mod volatile;

pub use battle::{BattleState, MonRef, SwitchKind, Team};
pub use counters::{MajorStatus, MajorStatusCounter, MultiTempStatus, TempStatus};
pub use moveset::{Move, MovesetArena, MovesetId, MAX_MOVES};
pub use pokemon::{HitPoints, Pokemon, Traits};
pub use possibility::PossibilitySet;
pub use stats::StatStages;
pub use volatile::{LockedMove, TwoTurnMove, VolatileStatus};
