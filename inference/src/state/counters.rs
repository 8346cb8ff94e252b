//! Turn-scoped countdown state
//!
//! Battle effects with a bounded lifetime are modeled as counters that tick
//! once per turn and complain when they outlive their maximum duration. A
//! counter outliving its duration means the tracker missed an end event, and
//! that is a tracking bug we want surfaced, not papered over. Effects whose
//! end is silent on the wire (confusion, encore) opt into auto-expiry instead.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, Result};

/// A single on/off effect with a maximum duration in turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempStatus {
    name: String,
    duration: u8,
    silent: bool,
    active: bool,
    turns: u8,
}

impl TempStatus {
    /// A counter that errors when ticked past its duration.
    pub fn new(name: impl Into<String>, duration: u8) -> Self {
        TempStatus {
            name: name.into(),
            duration,
            silent: false,
            active: false,
            turns: 0,
        }
    }

    /// A counter that resets itself when ticked past its duration, for
    /// effects whose expiry produces no log event.
    pub fn silent(name: impl Into<String>, duration: u8) -> Self {
        TempStatus {
            silent: true,
            ..TempStatus::new(name, duration)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Turns elapsed since the effect started.
    pub fn turns(&self) -> u8 {
        self.turns
    }

    /// Activate (or restart) the effect.
    pub fn start(&mut self) {
        self.active = true;
        self.turns = 0;
    }

    pub fn end(&mut self) {
        self.active = false;
        self.turns = 0;
    }

    /// Advance one turn. Inactive counters are unaffected.
    pub fn tick(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.turns += 1;
        if self.turns >= self.duration {
            if self.silent {
                tracing::trace!(name = %self.name, "temp status expired silently");
                self.end();
            } else {
                return Err(InferenceError::StatusOverflow {
                    name: self.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Like [`TempStatus`] but for a family of mutually-exclusive variants that
/// share one duration rule (weather, two-turn moves, locked moves).
///
/// Starting any variant displaces the current one. An `infinite` start (e.g.
/// weather summoned by an ability in gen 4) suspends the duration check until
/// the effect is replaced or ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiTempStatus<T> {
    current: Option<T>,
    duration: u8,
    silent: bool,
    infinite: bool,
    turns: u8,
}

impl<T: Copy + PartialEq + fmt::Debug> MultiTempStatus<T> {
    pub fn new(duration: u8, silent: bool) -> Self {
        MultiTempStatus {
            current: None,
            duration,
            silent,
            infinite: false,
            turns: 0,
        }
    }

    pub fn current(&self) -> Option<T> {
        self.current
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn turns(&self) -> u8 {
        self.turns
    }

    pub fn start(&mut self, variant: T, infinite: bool) {
        self.current = Some(variant);
        self.infinite = infinite;
        self.turns = 0;
    }

    pub fn end(&mut self) {
        self.current = None;
        self.infinite = false;
        self.turns = 0;
    }

    pub fn tick(&mut self) -> Result<()> {
        let Some(variant) = self.current else {
            return Ok(());
        };
        if self.infinite {
            return Ok(());
        }
        self.turns += 1;
        if self.turns >= self.duration {
            if self.silent {
                self.end();
            } else {
                return Err(InferenceError::StatusOverflow {
                    name: format!("{variant:?}"),
                });
            }
        }
        Ok(())
    }
}

/// Major (non-volatile) status conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MajorStatus {
    Burn,
    Paralysis,
    Sleep,
    Freeze,
    Poison,
    Toxic,
}

impl MajorStatus {
    pub fn from_protocol(token: &str) -> Option<Self> {
        match token {
            "brn" => Some(MajorStatus::Burn),
            "par" => Some(MajorStatus::Paralysis),
            "slp" => Some(MajorStatus::Sleep),
            "frz" => Some(MajorStatus::Freeze),
            "psn" => Some(MajorStatus::Poison),
            "tox" => Some(MajorStatus::Toxic),
            _ => None,
        }
    }

    pub fn as_protocol(&self) -> &'static str {
        match self {
            MajorStatus::Burn => "brn",
            MajorStatus::Paralysis => "par",
            MajorStatus::Sleep => "slp",
            MajorStatus::Freeze => "frz",
            MajorStatus::Poison => "psn",
            MajorStatus::Toxic => "tox",
        }
    }
}

/// Sleep turns are bounded in gen 4; a fifth failed wake-up means we
/// mis-tracked the status.
const MAX_SLEEP_TURNS: u8 = 4;

/// Current major status plus the counters attached to it: sleep turns
/// (bounded) and the toxic damage multiplier (unbounded).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MajorStatusCounter {
    current: Option<MajorStatus>,
    turns: u8,
    tox_turns: u8,
}

impl MajorStatusCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<MajorStatus> {
        self.current
    }

    pub fn is(&self, status: MajorStatus) -> bool {
        self.current == Some(status)
    }

    /// Toxic damage multiplier (1 on the first residual tick).
    pub fn tox_counter(&self) -> u8 {
        self.tox_turns
    }

    pub fn afflict(&mut self, status: MajorStatus) -> Result<()> {
        if let Some(existing) = self.current {
            return Err(InferenceError::Contradiction {
                effect: status.as_protocol().to_string(),
                detail: format!("already afflicted with {}", existing.as_protocol()),
            });
        }
        self.current = Some(status);
        self.turns = 0;
        self.tox_turns = if status == MajorStatus::Toxic { 1 } else { 0 };
        Ok(())
    }

    pub fn cure(&mut self) {
        self.current = None;
        self.turns = 0;
        self.tox_turns = 0;
    }

    /// Count one failed wake-up attempt. Only meaningful while asleep.
    pub fn tick_sleep(&mut self) -> Result<()> {
        if self.current != Some(MajorStatus::Sleep) {
            return Ok(());
        }
        self.turns += 1;
        if self.turns >= MAX_SLEEP_TURNS {
            return Err(InferenceError::StatusOverflow {
                name: "slp".to_string(),
            });
        }
        Ok(())
    }

    /// Advance the toxic multiplier at end of turn.
    pub fn tick_toxic(&mut self) {
        if self.current == Some(MajorStatus::Toxic) {
            self.tox_turns += 1;
        }
    }
}
