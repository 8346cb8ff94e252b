//! Inference dispatchers and the battle log driver
//!
//! The [`ability`] and [`item`] modules answer one question each per trigger
//! point: which hidden ability or item could explain the events in front of
//! us, and what does their activation or silence prove. The [`tracker`]
//! module walks the log and decides when each trigger fires.

pub mod ability;
pub mod item;
pub mod tracker;

pub use tracker::Tracker;
