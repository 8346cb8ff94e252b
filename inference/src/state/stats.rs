//! Stat stage tracking
//!
//! Boost stages are public information, so this is plain bookkeeping with
//! clamping at the game's +/-6 bounds.

use serde::{Deserialize, Serialize};
use zoroark_protocol::Stat;

const MAX_STAGE: i8 = 6;
const MIN_STAGE: i8 = -6;

/// Stat boost stages (-6 to +6) for one active pokemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatStages {
    pub atk: i8,
    pub def: i8,
    pub spa: i8,
    pub spd: i8,
    pub spe: i8,
    pub accuracy: i8,
    pub evasion: i8,
}

impl StatStages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stat: Stat) -> i8 {
        match stat {
            Stat::Atk => self.atk,
            Stat::Def => self.def,
            Stat::Spa => self.spa,
            Stat::Spd => self.spd,
            Stat::Spe => self.spe,
            Stat::Accuracy => self.accuracy,
            Stat::Evasion => self.evasion,
        }
    }

    pub fn set(&mut self, stat: Stat, stage: i8) {
        let stage = stage.clamp(MIN_STAGE, MAX_STAGE);
        match stat {
            Stat::Atk => self.atk = stage,
            Stat::Def => self.def = stage,
            Stat::Spa => self.spa = stage,
            Stat::Spd => self.spd = stage,
            Stat::Spe => self.spe = stage,
            Stat::Accuracy => self.accuracy = stage,
            Stat::Evasion => self.evasion = stage,
        }
    }

    pub fn boost(&mut self, stat: Stat, amount: i8) {
        self.set(stat, self.get(stat) + amount);
    }

    pub fn unboost(&mut self, stat: Stat, amount: i8) {
        self.boost(stat, -amount);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_clear(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boost_and_clamp() {
        let mut stages = StatStages::new();
        stages.boost(Stat::Atk, 2);
        assert_eq!(stages.get(Stat::Atk), 2);

        stages.boost(Stat::Atk, 6);
        assert_eq!(stages.get(Stat::Atk), 6);

        stages.unboost(Stat::Spe, 7);
        assert_eq!(stages.get(Stat::Spe), -6);
    }

    #[test]
    fn test_clear() {
        let mut stages = StatStages::new();
        stages.boost(Stat::Evasion, 1);
        assert!(!stages.is_clear());
        stages.clear();
        assert!(stages.is_clear());
    }
}
