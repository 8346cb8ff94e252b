//! Per-pokemon belief state
//!
//! A pokemon carries its *base* traits (what it really is) and, while active,
//! an *overlay* (what it currently appears as). Reveals normally narrow both;
//! once the ability has been changed in battle (Trace, Worry Seed) further
//! ability evidence applies to the overlay only, since it no longer tells us
//! anything about the base.

use serde::{Deserialize, Serialize};
use zoroark_protocol::HpStatus;

use crate::dex::Dex;
use crate::error::{InferenceError, Result};
use crate::state::counters::{MajorStatus, MajorStatusCounter};
use crate::state::moveset::{MovesetArena, MovesetId};
use crate::state::possibility::PossibilitySet;
use crate::state::volatile::VolatileStatus;

/// Identity-level attributes: species and ability beliefs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Traits {
    pub species: String,
    pub ability: PossibilitySet,
}

impl Traits {
    fn for_species(species: &str, dex: &Dex) -> Result<Self> {
        let data = dex.species(species)?;
        Ok(Traits {
            species: species.to_string(),
            ability: PossibilitySet::new(
                format!("{species} ability"),
                data.abilities.iter().cloned(),
            ),
        })
    }
}

/// HP as reported by the log (percentage from the opponent's perspective).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitPoints {
    pub current: u32,
    pub max: u32,
}

impl Default for HitPoints {
    fn default() -> Self {
        HitPoints {
            current: 100,
            max: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pokemon {
    base: Traits,
    /// Present only while active.
    overlay: Option<Traits>,
    /// Set when the ability was replaced in battle; from then on ability
    /// evidence stops narrowing the base.
    ability_changed: bool,
    pub item: PossibilitySet,
    pub item_consumed: bool,
    base_moveset: MovesetId,
    override_moveset: Option<MovesetId>,
    pub hp: HitPoints,
    pub major_status: MajorStatusCounter,
    /// Present only while active.
    pub volatile: Option<VolatileStatus>,
    pub fainted: bool,
    pub level: u8,
    pub gender: Option<char>,
}

impl Pokemon {
    pub fn new(species: &str, level: u8, dex: &Dex, arena: &mut MovesetArena) -> Result<Self> {
        let base = Traits::for_species(species, dex)?;
        let movepool = dex.species(species)?.movepool.clone();
        let base_moveset = arena.alloc(&movepool, 4, dex)?;

        Ok(Pokemon {
            base,
            overlay: None,
            ability_changed: false,
            item: PossibilitySet::new(format!("{species} item"), dex.item_names()),
            item_consumed: false,
            base_moveset,
            override_moveset: None,
            hp: HitPoints::default(),
            major_status: MajorStatusCounter::new(),
            volatile: None,
            fainted: false,
            level,
            gender: None,
        })
    }

    pub fn species(&self) -> &str {
        &self.traits().species
    }

    pub fn base_species(&self) -> &str {
        &self.base.species
    }

    /// Current apparent traits.
    pub fn traits(&self) -> &Traits {
        self.overlay.as_ref().unwrap_or(&self.base)
    }

    pub fn ability(&self) -> &PossibilitySet {
        &self.traits().ability
    }

    pub fn base_ability(&self) -> &PossibilitySet {
        &self.base.ability
    }

    pub fn is_active(&self) -> bool {
        self.volatile.is_some()
    }

    pub fn ability_suppressed(&self) -> bool {
        self.volatile
            .as_ref()
            .is_some_and(|v| v.suppress_ability)
    }

    /// Narrow ability beliefs to a subset. Applies to the overlay and, unless
    /// the ability was changed in battle, to the base.
    pub fn narrow_ability<'a, I>(&mut self, keep: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        if let Some(overlay) = &mut self.overlay {
            overlay.ability.narrow(keep.clone())?;
        }
        if !self.ability_changed {
            self.base.ability.narrow(keep)?;
        }
        Ok(())
    }

    /// The ability was observed directly.
    pub fn reveal_ability(&mut self, name: &str) -> Result<()> {
        self.narrow_ability([name])
    }

    /// Rule an ability out.
    pub fn remove_ability(&mut self, name: &str) -> Result<()> {
        if let Some(overlay) = &mut self.overlay {
            overlay.ability.remove(name)?;
        }
        if !self.ability_changed {
            self.base.ability.remove(name)?;
        }
        Ok(())
    }

    /// The ability was replaced in battle (Trace, Worry Seed). Only the
    /// overlay changes, and base narrowing stops from here on.
    pub fn set_ability(&mut self, name: &str) -> Result<()> {
        let Some(overlay) = &mut self.overlay else {
            return Err(InferenceError::Contradiction {
                effect: "ability change".to_string(),
                detail: format!("{} is not active", self.base.species),
            });
        };
        overlay.ability = PossibilitySet::new(overlay.ability.label().to_string(), [name]);
        self.ability_changed = true;
        Ok(())
    }

    /// Like [`set_ability`](Self::set_ability) but with an unresolved
    /// candidate set (Transform copying a not-yet-known ability).
    pub fn set_ability_candidates<I, S>(&mut self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let Some(overlay) = &mut self.overlay else {
            return Err(InferenceError::Contradiction {
                effect: "ability change".to_string(),
                detail: format!("{} is not active", self.base.species),
            });
        };
        overlay.ability = PossibilitySet::new(overlay.ability.label().to_string(), names);
        self.ability_changed = true;
        Ok(())
    }

    /// Moveset to apply observations to: the override while active.
    pub fn moveset(&self) -> MovesetId {
        self.override_moveset.unwrap_or(self.base_moveset)
    }

    pub fn base_moveset(&self) -> MovesetId {
        self.base_moveset
    }

    /// Enter the field, optionally inheriting volatiles passed from the
    /// previous active pokemon.
    pub fn switch_in(
        &mut self,
        arena: &mut MovesetArena,
        inherited: Option<VolatileStatus>,
    ) -> Result<()> {
        self.overlay = Some(self.base.clone());
        self.override_moveset = Some(arena.alloc_overlay(self.base_moveset));
        self.volatile = Some(inherited.unwrap_or_default());
        Ok(())
    }

    /// Leave the field, returning the volatiles for the caller to filter by
    /// switch kind. Ownership of volatile state moves with the return value;
    /// a benched pokemon keeps none of it.
    pub fn switch_out(&mut self, arena: &mut MovesetArena) -> Result<Option<VolatileStatus>> {
        if let Some(id) = self.override_moveset.take() {
            arena.release(id)?;
        }
        self.overlay = None;
        self.ability_changed = false;
        Ok(self.volatile.take())
    }

    pub fn apply_hp(&mut self, hp: &HpStatus) {
        self.hp.current = hp.current;
        if let Some(max) = hp.max {
            self.hp.max = max;
        }
    }

    pub fn faint(&mut self, arena: &mut MovesetArena) -> Result<()> {
        self.fainted = true;
        self.hp.current = 0;
        self.switch_out(arena)?;
        Ok(())
    }

    pub fn reveal_item(&mut self, name: &str) -> Result<()> {
        self.item.narrow_to(name)
    }

    /// The item was used up (berry eaten, gem spent).
    pub fn consume_item(&mut self, name: &str) -> Result<()> {
        self.item.narrow_to(name)?;
        self.item_consumed = true;
        Ok(())
    }

    pub fn has_status(&self, status: MajorStatus) -> bool {
        self.major_status.is(status)
    }
}
