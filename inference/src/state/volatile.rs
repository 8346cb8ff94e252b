//! Volatile (in-battle-only) conditions for an active pokemon
//!
//! Volatiles fall into three clearance tiers:
//! - passable: survive Baton Pass (boosts, confusion, substitute, ...)
//! - self-switch passable: survive any self-inflicted switch (last move used)
//! - unpassable: cleared on any switch
//!
//! A switched-out pokemon owns no volatile state; [`crate::state::battle`]
//! moves the whole struct between slots with the appropriate tier cleared.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::battle::MonRef;
use crate::state::counters::{MultiTempStatus, TempStatus};
use crate::state::stats::StatStages;

/// Moves that lock the user for several turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockedMove {
    Outrage,
    PetalDance,
    Thrash,
}

/// Two-turn (charge) moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TwoTurnMove {
    Bounce,
    Dig,
    Dive,
    Fly,
    SkyAttack,
    SolarBeam,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatileStatus {
    // passable (survive Baton Pass)
    pub boosts: StatStages,
    pub confusion: TempStatus,
    pub curse: bool,
    pub embargo: TempStatus,
    pub focus_energy: bool,
    pub ingrain: bool,
    pub leech_seed: bool,
    pub magnet_rise: TempStatus,
    pub substitute: bool,
    /// Ability negated by Gastro Acid.
    pub suppress_ability: bool,
    pub trapped_by: Option<MonRef>,
    pub trapping: Option<MonRef>,

    // self-switch passable
    pub last_move: Option<String>,

    // unpassable
    pub attract: bool,
    pub bide: TempStatus,
    pub charge: TempStatus,
    pub defense_curl: bool,
    pub destiny_bond: bool,
    pub disabled: TempStatus,
    pub disabled_move: Option<String>,
    pub encore: TempStatus,
    pub flash_fire: bool,
    pub locked_move: MultiTempStatus<LockedMove>,
    pub minimize: bool,
    pub must_recharge: bool,
    pub rage: bool,
    pub roost: bool,
    pub slow_start: TempStatus,
    pub stall_turns: u8,
    pub taunt: TempStatus,
    pub torment: bool,
    pub transformed: bool,
    /// Who we transformed into, for propagating ability inferences.
    pub transformed_from: Option<MonRef>,
    pub two_turn: MultiTempStatus<TwoTurnMove>,
    pub uproar: TempStatus,
}

impl VolatileStatus {
    pub fn new() -> Self {
        VolatileStatus {
            boosts: StatStages::new(),
            // durations without an end event on the wire expire silently
            confusion: TempStatus::silent("confusion", 5),
            curse: false,
            embargo: TempStatus::new("embargo", 5),
            focus_energy: false,
            ingrain: false,
            leech_seed: false,
            magnet_rise: TempStatus::new("magnet rise", 5),
            substitute: false,
            suppress_ability: false,
            trapped_by: None,
            trapping: None,
            last_move: None,
            attract: false,
            bide: TempStatus::new("bide", 3),
            charge: TempStatus::new("charge", 2),
            defense_curl: false,
            destiny_bond: false,
            disabled: TempStatus::silent("disable", 7),
            disabled_move: None,
            encore: TempStatus::silent("encore", 8),
            flash_fire: false,
            locked_move: MultiTempStatus::new(3, true),
            minimize: false,
            must_recharge: false,
            rage: false,
            roost: false,
            slow_start: TempStatus::new("slow start", 5),
            stall_turns: 0,
            taunt: TempStatus::silent("taunt", 5),
            torment: false,
            transformed: false,
            transformed_from: None,
            two_turn: MultiTempStatus::new(2, false),
            uproar: TempStatus::silent("uproar", 5),
        }
    }

    /// Clear everything Baton Pass does not carry.
    pub fn clear_unpassable(&mut self) {
        let passable = PassableSnapshot::take(self);
        *self = Self::new();
        passable.restore(self);
        // last_move rides along: Baton Pass is a self-switch
    }

    /// Clear everything except what any self-switch (U-turn) carries.
    pub fn clear_for_self_switch(&mut self) {
        let last_move = self.last_move.take();
        *self = Self::new();
        self.last_move = last_move;
    }

    /// Advance all turn counters by one turn.
    pub fn tick_turn(&mut self) -> Result<()> {
        self.confusion.tick()?;
        self.embargo.tick()?;
        self.magnet_rise.tick()?;
        self.bide.tick()?;
        self.charge.tick()?;
        self.disabled.tick()?;
        if !self.disabled.is_active() {
            self.disabled_move = None;
        }
        self.encore.tick()?;
        self.locked_move.tick()?;
        self.slow_start.tick()?;
        self.taunt.tick()?;
        self.two_turn.tick()?;
        self.uproar.tick()?;
        // single-turn flags reset each turn
        self.destiny_bond = false;
        self.roost = false;
        self.rage = false;
        Ok(())
    }
}

impl Default for VolatileStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// The passable tier, captured so clears can rebuild around it.
struct PassableSnapshot {
    boosts: StatStages,
    confusion: TempStatus,
    curse: bool,
    embargo: TempStatus,
    focus_energy: bool,
    ingrain: bool,
    leech_seed: bool,
    magnet_rise: TempStatus,
    substitute: bool,
    suppress_ability: bool,
    trapped_by: Option<MonRef>,
    trapping: Option<MonRef>,
    last_move: Option<String>,
}

impl PassableSnapshot {
    fn take(v: &mut VolatileStatus) -> Self {
        PassableSnapshot {
            boosts: v.boosts,
            confusion: v.confusion.clone(),
            curse: v.curse,
            embargo: v.embargo.clone(),
            focus_energy: v.focus_energy,
            ingrain: v.ingrain,
            leech_seed: v.leech_seed,
            magnet_rise: v.magnet_rise.clone(),
            substitute: v.substitute,
            suppress_ability: v.suppress_ability,
            trapped_by: v.trapped_by.take(),
            trapping: v.trapping.take(),
            last_move: v.last_move.take(),
        }
    }

    fn restore(self, v: &mut VolatileStatus) {
        v.boosts = self.boosts;
        v.confusion = self.confusion;
        v.curse = self.curse;
        v.embargo = self.embargo;
        v.focus_energy = self.focus_energy;
        v.ingrain = self.ingrain;
        v.leech_seed = self.leech_seed;
        v.magnet_rise = self.magnet_rise;
        v.substitute = self.substitute;
        v.suppress_ability = self.suppress_ability;
        v.trapped_by = self.trapped_by;
        v.trapping = self.trapping;
        v.last_move = self.last_move;
    }
}
