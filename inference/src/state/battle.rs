//! Whole-battle belief state
//!
//! [`BattleState`] owns both teams, the shared moveset arena, and field
//! conditions. Cross-pokemon concerns live here: resolving protocol
//! identifiers to slots, the switch pipeline with its volatile clearance
//! tiers, and ability narrowing that follows Transform links.

use serde::{Deserialize, Serialize};
use zoroark_protocol::{MonIdent, Player};

use crate::dex::{Dex, WeatherKind};
use crate::error::{InferenceError, Result};
use crate::state::counters::MultiTempStatus;
use crate::state::moveset::MovesetArena;
use crate::state::pokemon::Pokemon;
use crate::state::volatile::VolatileStatus;

/// Slot address of a pokemon: side plus team index. Stable across switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonRef {
    pub player: Player,
    pub index: usize,
}

/// How a pokemon is leaving the field, which decides what its replacement
/// inherits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchKind {
    /// Hard switch or forced switch: all volatiles dropped.
    Normal,
    /// Self-inflicted switch (U-turn): last move used carries over.
    SelfSwitch,
    /// Baton Pass: the passable tier carries over.
    BatonPass,
}

/// Duration of weather set by a move in gen 4 without an extending rock.
const WEATHER_TURNS: u8 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub player: Player,
    pub pokemon: Vec<Pokemon>,
    pub active: Option<usize>,
}

impl Team {
    pub fn new(player: Player) -> Self {
        Team {
            player,
            pokemon: Vec::new(),
            active: None,
        }
    }

    pub fn add(&mut self, pokemon: Pokemon) -> usize {
        self.pokemon.push(pokemon);
        self.pokemon.len() - 1
    }

    pub fn active(&self) -> Option<&Pokemon> {
        self.active.map(|i| &self.pokemon[i])
    }

    pub fn active_mut(&mut self) -> Option<&mut Pokemon> {
        self.active.map(|i| &mut self.pokemon[i])
    }

    /// Find a team member by species name (the log names pokemon by nickname,
    /// which this crate keeps equal to species).
    pub fn find(&self, name: &str) -> Option<usize> {
        self.pokemon
            .iter()
            .position(|p| p.base_species() == name || p.species() == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleState {
    pub teams: [Team; 2],
    pub movesets: MovesetArena,
    pub weather: MultiTempStatus<WeatherKind>,
    pub turn: u32,
}

impl BattleState {
    pub fn new() -> Self {
        BattleState {
            teams: [Team::new(Player::P1), Team::new(Player::P2)],
            movesets: MovesetArena::new(),
            weather: MultiTempStatus::new(WEATHER_TURNS, false),
            turn: 0,
        }
    }

    pub fn team(&self, player: Player) -> &Team {
        &self.teams[player.index()]
    }

    pub fn team_mut(&mut self, player: Player) -> &mut Team {
        &mut self.teams[player.index()]
    }

    pub fn mon(&self, r: MonRef) -> Result<&Pokemon> {
        self.team(r.player)
            .pokemon
            .get(r.index)
            .ok_or(InferenceError::MissingPokemon(format!("{r:?}")))
    }

    pub fn mon_mut(&mut self, r: MonRef) -> Result<&mut Pokemon> {
        self.teams[r.player.index()]
            .pokemon
            .get_mut(r.index)
            .ok_or(InferenceError::MissingPokemon(format!("{r:?}")))
    }

    pub fn active_ref(&self, player: Player) -> Option<MonRef> {
        self.team(player).active.map(|index| MonRef { player, index })
    }

    /// Resolve a protocol identifier to a slot. Position letters resolve to
    /// the active slot; otherwise we match by name.
    pub fn resolve(&self, ident: &MonIdent) -> Result<MonRef> {
        let team = self.team(ident.player);
        if let Some(index) = team.find(&ident.name) {
            return Ok(MonRef {
                player: ident.player,
                index,
            });
        }
        if ident.position.is_some()
            && let Some(index) = team.active
        {
            return Ok(MonRef {
                player: ident.player,
                index,
            });
        }
        Err(InferenceError::MissingPokemon(format!(
            "{}: {}",
            ident.player.as_str(),
            ident.name
        )))
    }

    /// Bring `index` in for `player`, filtering the outgoing volatiles by
    /// switch kind.
    pub fn switch_in(&mut self, player: Player, index: usize, kind: SwitchKind) -> Result<()> {
        let side = player.index();
        let inherited = if let Some(old) = self.teams[side].active {
            let volatile = self.teams[side].pokemon[old].switch_out(&mut self.movesets)?;
            match (kind, volatile) {
                (SwitchKind::Normal, _) | (_, None) => None,
                (SwitchKind::SelfSwitch, Some(mut v)) => {
                    v.clear_for_self_switch();
                    Some(v)
                }
                (SwitchKind::BatonPass, Some(mut v)) => {
                    v.clear_unpassable();
                    Some(v)
                }
            }
        } else {
            None
        };

        self.teams[side].active = Some(index);
        self.teams[side].pokemon[index].switch_in(&mut self.movesets, inherited)
    }

    pub fn faint(&mut self, r: MonRef) -> Result<()> {
        let side = r.player.index();
        self.teams[side].pokemon[r.index].faint(&mut self.movesets)?;
        if self.teams[side].active == Some(r.index) {
            self.teams[side].active = None;
        }
        Ok(())
    }

    fn transform_link(&self, r: MonRef) -> Option<MonRef> {
        self.mon(r)
            .ok()?
            .volatile
            .as_ref()
            .and_then(|v| v.transformed_from)
    }

    /// Narrow a pokemon's ability beliefs, following a Transform link: a
    /// transformed pokemon's apparent ability is its target's real one, so
    /// evidence about it narrows the target too.
    pub fn narrow_ability<'a, I>(&mut self, r: MonRef, keep: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        self.mon_mut(r)?.narrow_ability(keep.clone())?;
        if let Some(target) = self.transform_link(r) {
            self.mon_mut(target)?.narrow_ability(keep)?;
        }
        Ok(())
    }

    pub fn reveal_ability(&mut self, r: MonRef, name: &str) -> Result<()> {
        self.narrow_ability(r, [name])
    }

    pub fn remove_ability(&mut self, r: MonRef, name: &str) -> Result<()> {
        self.mon_mut(r)?.remove_ability(name)?;
        if let Some(target) = self.transform_link(r) {
            self.mon_mut(target)?.remove_ability(name)?;
        }
        Ok(())
    }

    /// Apply a Transform: link movesets, copy apparent traits, and remember
    /// the target for ability propagation.
    pub fn transform(&mut self, user: MonRef, target: MonRef, dex: &Dex) -> Result<()> {
        let user_set = self.mon(user)?.moveset();
        let target_set = self.mon(target)?.moveset();
        self.movesets.link_transform(user_set, target_set, dex)?;

        let target_abilities: Vec<String> =
            self.mon(target)?.ability().iter().map(str::to_string).collect();
        let user_mon = self.mon_mut(user)?;
        if let Some(v) = &mut user_mon.volatile {
            v.transformed = true;
            v.transformed_from = Some(target);
        }
        // apparent ability becomes the target's (possibly unresolved) one
        user_mon.set_ability_candidates(target_abilities)?;
        Ok(())
    }
}

impl Default for BattleState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::sample_dex;
    use zoroark_protocol::Stat;

    fn two_mon_state() -> (BattleState, Dex) {
        let dex = sample_dex();
        let mut state = BattleState::new();
        for species in ["Pikachu", "Zapdos"] {
            let mon = Pokemon::new(species, 100, &dex, &mut state.movesets).unwrap();
            state.team_mut(Player::P1).add(mon);
        }
        let mon = Pokemon::new("Hypno", 100, &dex, &mut state.movesets).unwrap();
        state.team_mut(Player::P2).add(mon);
        (state, dex)
    }

    #[test]
    fn test_resolve_by_name_and_position() {
        let (mut state, _) = two_mon_state();
        state.switch_in(Player::P1, 0, SwitchKind::Normal).unwrap();

        let ident = MonIdent::parse("p1a: Pikachu").unwrap();
        let r = state.resolve(&ident).unwrap();
        assert_eq!(r.index, 0);

        let benched = MonIdent::parse("p1: Zapdos").unwrap();
        assert_eq!(state.resolve(&benched).unwrap().index, 1);

        let missing = MonIdent::parse("p2: Blissey").unwrap();
        assert!(state.resolve(&missing).is_err());
    }

    #[test]
    fn test_normal_switch_drops_volatiles() {
        let (mut state, _) = two_mon_state();
        state.switch_in(Player::P1, 0, SwitchKind::Normal).unwrap();
        state
            .mon_mut(MonRef { player: Player::P1, index: 0 })
            .unwrap()
            .volatile
            .as_mut()
            .unwrap()
            .boosts
            .boost(Stat::Atk, 2);

        state.switch_in(Player::P1, 1, SwitchKind::Normal).unwrap();
        let incoming = state.team(Player::P1).active().unwrap();
        assert!(incoming.volatile.as_ref().unwrap().boosts.is_clear());

        // the benched pokemon owns no volatile state at all
        let benched = state.mon(MonRef { player: Player::P1, index: 0 }).unwrap();
        assert!(benched.volatile.is_none());
    }

    #[test]
    fn test_baton_pass_transfers_boosts() {
        let (mut state, _) = two_mon_state();
        state.switch_in(Player::P1, 0, SwitchKind::Normal).unwrap();
        let v = state
            .team_mut(Player::P1)
            .active_mut()
            .unwrap()
            .volatile
            .as_mut()
            .unwrap();
        v.boosts.boost(Stat::Spe, 2);
        v.taunt.start();

        state.switch_in(Player::P1, 1, SwitchKind::BatonPass).unwrap();
        let incoming = state.team(Player::P1).active().unwrap();
        let v = incoming.volatile.as_ref().unwrap();
        assert_eq!(v.boosts.get(Stat::Spe), 2);
        assert!(!v.taunt.is_active());
    }

    #[test]
    fn test_transform_propagates_ability_evidence() {
        let dex = sample_dex();
        let mut state = BattleState::new();
        let ditto = Pokemon::new("Ditto", 100, &dex, &mut state.movesets).unwrap();
        state.team_mut(Player::P1).add(ditto);
        let hypno = Pokemon::new("Hypno", 100, &dex, &mut state.movesets).unwrap();
        state.team_mut(Player::P2).add(hypno);
        state.switch_in(Player::P1, 0, SwitchKind::Normal).unwrap();
        state.switch_in(Player::P2, 0, SwitchKind::Normal).unwrap();

        let user = MonRef { player: Player::P1, index: 0 };
        let target = MonRef { player: Player::P2, index: 0 };
        state.transform(user, target, &dex).unwrap();

        // the copy carries the target's unresolved candidates
        assert_eq!(state.mon(user).unwrap().ability().len(), 2);

        // learning the copied ability resolves the target's real one
        state.reveal_ability(user, "Insomnia").unwrap();
        assert_eq!(
            state.mon(target).unwrap().ability().definite(),
            Some("Insomnia")
        );
        // Ditto's own base ability is untouched
        assert_eq!(
            state.mon(user).unwrap().base_ability().definite(),
            Some("Limber")
        );
    }

    #[test]
    fn test_faint_clears_active() {
        let (mut state, _) = two_mon_state();
        state.switch_in(Player::P2, 0, SwitchKind::Normal).unwrap();
        let r = state.active_ref(Player::P2).unwrap();
        state.faint(r).unwrap();
        assert!(state.team(Player::P2).active.is_none());
        assert!(state.mon(r).unwrap().fainted);
    }
}
