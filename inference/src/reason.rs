//! Deferred inference reasons
//!
//! A [`SubInference`] records *why* an effect would activate: the conjunction
//! of [`SubReason`] conditions that must all hold. When the effect is
//! observed, every reason is asserted true. When the effect provably did not
//! activate, we reason by elimination: if exactly one condition is still
//! unresolved, that condition must be false; if none are, our beliefs
//! contradict the log and tracking must stop.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::dex::WeatherKind;
use crate::error::{InferenceError, Result};
use crate::state::battle::{BattleState, MonRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Definitely true under current beliefs.
    Held,
    /// Definitely false under current beliefs.
    Violated,
    /// Could go either way.
    Unresolved,
}

/// One atomic condition an effect activation depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubReason {
    /// The pokemon's ability is one of these.
    AbilityIsOneOf {
        mon: MonRef,
        abilities: BTreeSet<String>,
    },
    /// The pokemon's item is one of these.
    ItemIsOneOf { mon: MonRef, items: BTreeSet<String> },
    /// The weather is one of these kinds.
    WeatherIs { kinds: BTreeSet<WeatherKind> },
    /// The effect has a random activation chance. Never resolves, so a
    /// non-activation says nothing about the other conditions.
    Chance,
}

impl SubReason {
    pub fn ability(mon: MonRef, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        SubReason::AbilityIsOneOf {
            mon,
            abilities: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn item(mon: MonRef, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        SubReason::ItemIsOneOf {
            mon,
            items: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn evaluate(&self, state: &BattleState) -> Result<Evaluation> {
        Ok(match self {
            SubReason::AbilityIsOneOf { mon, abilities } => {
                let possible = state.mon(*mon)?.ability().possible();
                subset_evaluation(possible, abilities)
            }
            SubReason::ItemIsOneOf { mon, items } => {
                let mon = state.mon(*mon)?;
                if mon.item_consumed {
                    Evaluation::Violated
                } else {
                    subset_evaluation(mon.item.possible(), items)
                }
            }
            SubReason::WeatherIs { kinds } => match state.weather.current() {
                // weather is public, so this is never unresolved
                Some(current) if kinds.contains(&current) => Evaluation::Held,
                _ => Evaluation::Violated,
            },
            SubReason::Chance => Evaluation::Unresolved,
        })
    }

    /// Commit this condition as true, narrowing beliefs accordingly.
    pub fn assert_holds(&self, state: &mut BattleState) -> Result<()> {
        match self {
            SubReason::AbilityIsOneOf { mon, abilities } => {
                state.narrow_ability(*mon, abilities.iter().map(String::as_str))
            }
            SubReason::ItemIsOneOf { mon, items } => state
                .mon_mut(*mon)?
                .item
                .narrow(items.iter().map(String::as_str)),
            SubReason::WeatherIs { kinds } => match self.evaluate(state)? {
                Evaluation::Held => Ok(()),
                _ => Err(InferenceError::Contradiction {
                    effect: "weather condition".to_string(),
                    detail: format!(
                        "required one of {kinds:?} but weather is {:?}",
                        state.weather.current()
                    ),
                }),
            },
            SubReason::Chance => Ok(()),
        }
    }

    /// Commit this condition as false.
    pub fn assert_fails(&self, state: &mut BattleState) -> Result<()> {
        match self {
            SubReason::AbilityIsOneOf { mon, abilities } => {
                for name in abilities {
                    state.remove_ability(*mon, name)?;
                }
                Ok(())
            }
            SubReason::ItemIsOneOf { mon, items } => {
                let mon = state.mon_mut(*mon)?;
                if mon.item_consumed {
                    return Ok(());
                }
                for name in items {
                    mon.item.remove(name)?;
                }
                Ok(())
            }
            SubReason::WeatherIs { kinds } => match self.evaluate(state)? {
                Evaluation::Held => Err(InferenceError::Contradiction {
                    effect: "weather condition".to_string(),
                    detail: format!("required none of {kinds:?} but the weather matches"),
                }),
                _ => Ok(()),
            },
            SubReason::Chance => Ok(()),
        }
    }
}

fn subset_evaluation(possible: &BTreeSet<String>, required: &BTreeSet<String>) -> Evaluation {
    let overlap = possible.intersection(required).count();
    if overlap == 0 {
        Evaluation::Violated
    } else if overlap == possible.len() {
        Evaluation::Held
    } else {
        Evaluation::Unresolved
    }
}

/// Why one effect would activate: a conjunction of conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubInference {
    /// What this explains, for error messages ("Static of p2 #0").
    pub effect: String,
    pub reasons: Vec<SubReason>,
}

impl SubInference {
    pub fn new(effect: impl Into<String>, reasons: Vec<SubReason>) -> Self {
        SubInference {
            effect: effect.into(),
            reasons,
        }
    }

    /// The effect activated: every condition held.
    pub fn accept(&self, state: &mut BattleState) -> Result<()> {
        tracing::debug!(effect = %self.effect, "inference accepted");
        for reason in &self.reasons {
            reason.assert_holds(state)?;
        }
        Ok(())
    }

    /// The effect provably did not activate: eliminate by contradiction.
    pub fn reject(&self, state: &mut BattleState) -> Result<()> {
        let mut unresolved = Vec::new();
        for reason in &self.reasons {
            match reason.evaluate(state)? {
                // some condition already fails: nothing new to learn
                Evaluation::Violated => return Ok(()),
                Evaluation::Unresolved => unresolved.push(reason),
                Evaluation::Held => {}
            }
        }
        match unresolved.len() {
            0 => Err(InferenceError::Contradiction {
                effect: self.effect.clone(),
                detail: "all activation conditions held but the effect did not activate"
                    .to_string(),
            }),
            1 => {
                tracing::debug!(effect = %self.effect, "inference rejected, eliminating last condition");
                unresolved[0].assert_fails(state)
            }
            // more than one open condition: can't tell which failed
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::sample_dex;
    use crate::state::battle::SwitchKind;
    use crate::state::pokemon::Pokemon;
    use zoroark_protocol::Player;

    fn hypno_state() -> (BattleState, MonRef) {
        let dex = sample_dex();
        let mut state = BattleState::new();
        let mon = Pokemon::new("Hypno", 100, &dex, &mut state.movesets).unwrap();
        state.team_mut(Player::P2).add(mon);
        state.switch_in(Player::P2, 0, SwitchKind::Normal).unwrap();
        (state, MonRef { player: Player::P2, index: 0 })
    }

    #[test]
    fn test_evaluate_ability_reason() {
        let (state, mon) = hypno_state();

        let held = SubReason::ability(mon, ["Insomnia", "Forewarn"]);
        assert_eq!(held.evaluate(&state).unwrap(), Evaluation::Held);

        let open = SubReason::ability(mon, ["Insomnia"]);
        assert_eq!(open.evaluate(&state).unwrap(), Evaluation::Unresolved);

        let violated = SubReason::ability(mon, ["Static"]);
        assert_eq!(violated.evaluate(&state).unwrap(), Evaluation::Violated);
    }

    #[test]
    fn test_accept_narrows() {
        let (mut state, mon) = hypno_state();
        SubInference::new("insomnia wake", vec![SubReason::ability(mon, ["Insomnia"])])
            .accept(&mut state)
            .unwrap();
        assert_eq!(state.mon(mon).unwrap().ability().definite(), Some("Insomnia"));
    }

    #[test]
    fn test_reject_eliminates_single_unresolved() {
        let (mut state, mon) = hypno_state();
        SubInference::new("insomnia wake", vec![SubReason::ability(mon, ["Insomnia"])])
            .reject(&mut state)
            .unwrap();
        assert_eq!(state.mon(mon).unwrap().ability().definite(), Some("Forewarn"));
    }

    #[test]
    fn test_reject_with_chance_learns_nothing() {
        let (mut state, mon) = hypno_state();
        SubInference::new(
            "chancy cure",
            vec![SubReason::ability(mon, ["Insomnia"]), SubReason::Chance],
        )
        .reject(&mut state)
        .unwrap();
        // two unresolved conditions, so neither can be eliminated
        assert_eq!(state.mon(mon).unwrap().ability().len(), 2);
    }

    #[test]
    fn test_reject_with_all_held_is_contradiction() {
        let (mut state, mon) = hypno_state();
        state.reveal_ability(mon, "Insomnia").unwrap();
        let err = SubInference::new("insomnia wake", vec![SubReason::ability(mon, ["Insomnia"])])
            .reject(&mut state)
            .unwrap_err();
        assert!(matches!(err, InferenceError::Contradiction { .. }));
    }

    #[test]
    fn test_reject_with_violated_reason_is_noop() {
        let (mut state, mon) = hypno_state();
        SubInference::new("static zap", vec![SubReason::ability(mon, ["Static"])])
            .reject(&mut state)
            .unwrap();
        assert_eq!(state.mon(mon).unwrap().ability().len(), 2);
    }
}
