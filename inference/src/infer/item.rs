//! Held-item inference dispatchers
//!
//! Same shape as the ability dispatchers: enumerate which of the holder's
//! possible items could visibly react, race them, narrow on the outcome.
//! Status berries are a two-stage pattern (`|-enditem|...|[eat]` then the
//! cure); residual heal items are single events.

use zoroark_protocol::{Event, MonIdent};

use crate::dex::{ItemEffect, TypeKind};
use crate::error::Result;
use crate::reason::{SubInference, SubReason};
use crate::state::battle::MonRef;
use crate::state::counters::MajorStatus;
use crate::unordered::{one_of, EffectParser, EventWindow, Feed, InferenceContext, RaceTask};

#[derive(Debug, Clone)]
enum Matcher {
    /// `|-enditem|HOLDER|ITEM|[eat]` then `|-curestatus|HOLDER|S`
    EatCure { statuses: Vec<MajorStatus> },
    /// `|-heal|HOLDER|HP|[from] item: ITEM`
    ResidualHeal,
    /// `|-damage|HOLDER|HP|[from] item: ITEM` (Black Sludge on the wrong body)
    ResidualDamage,
}

pub(crate) struct ItemParser {
    mon: MonRef,
    item: String,
    matcher: Matcher,
    inference: SubInference,
    stage: u8,
}

impl ItemParser {
    fn new(mon: MonRef, item: &str, matcher: Matcher) -> Self {
        let inference = SubInference::new(
            format!("{item} of {mon:?}"),
            vec![SubReason::item(mon, [item])],
        );
        ItemParser {
            mon,
            item: item.to_string(),
            matcher,
            inference,
            stage: 0,
        }
    }

    fn same(&self, cx: &InferenceContext<'_>, ident: &MonIdent) -> bool {
        cx.state.resolve(ident).ok() == Some(self.mon)
    }

    pub(crate) fn commit_accept(&self, cx: &mut InferenceContext<'_>) -> Result<()> {
        self.inference.accept(cx.state)
    }
}

impl EffectParser for ItemParser {
    fn label(&self) -> String {
        format!("item {} of {:?} #{}", self.item, self.mon.player, self.mon.index)
    }

    fn offer(&mut self, cx: &mut InferenceContext<'_>, event: &Event) -> Result<Feed> {
        match (&self.matcher, event) {
            (Matcher::EatCure { statuses }, event) => match (self.stage, event) {
                (0, Event::EndItem { mon, item, eat, .. })
                    if self.same(cx, mon) && *item == self.item && *eat =>
                {
                    self.stage = 1;
                    Ok(Feed::Consume)
                }
                (1, Event::CureStatus { mon, status, .. }) => {
                    if let Some(cured) = MajorStatus::from_protocol(status)
                        && self.same(cx, mon)
                        && statuses.contains(&cured)
                    {
                        let holder = cx.state.mon_mut(self.mon)?;
                        holder.major_status.cure();
                        holder.consume_item(&self.item)?;
                        Ok(Feed::Accept)
                    } else {
                        Ok(Feed::Reject)
                    }
                }
                (1, _) => Ok(Feed::Reject),
                _ => Ok(Feed::Pass),
            },

            (Matcher::ResidualHeal, Event::Heal { mon, hp, source }) => {
                if self.same(cx, mon)
                    && source.as_ref().is_some_and(|s| s.is_item(&self.item))
                {
                    cx.state.mon_mut(self.mon)?.apply_hp(hp);
                    return Ok(Feed::Accept);
                }
                Ok(Feed::Pass)
            }

            (Matcher::ResidualDamage, Event::Damage { mon, hp, source }) => {
                if self.same(cx, mon)
                    && source.as_ref().is_some_and(|s| s.is_item(&self.item))
                {
                    cx.state.mon_mut(self.mon)?.apply_hp(hp);
                    return Ok(Feed::Accept);
                }
                Ok(Feed::Pass)
            }

            _ => Ok(Feed::Pass),
        }
    }

    fn cancel(&mut self, cx: &mut InferenceContext<'_>) -> Result<()> {
        self.inference.reject(cx.state)
    }
}

fn holder_is_poison(cx: &InferenceContext<'_>, mon: MonRef) -> Result<bool> {
    let species = cx.state.mon(mon)?.species().to_string();
    Ok(cx
        .dex
        .species(&species)?
        .types
        .contains(&TypeKind::Poison))
}

fn run(
    cx: &mut InferenceContext<'_>,
    window: &mut EventWindow<'_>,
    mut tasks: Vec<RaceTask<ItemParser>>,
) -> Result<Option<String>> {
    if tasks.is_empty() {
        return Ok(None);
    }
    let accepted = one_of(cx, window, &mut tasks)?;
    if let Some(i) = accepted {
        tasks[i].parser.commit_accept(cx)?;
        return Ok(Some(tasks[i].parser.item.clone()));
    }
    Ok(None)
}

/// Continuous-condition item trigger: status berries eat themselves as soon
/// as their status applies.
pub fn on_update(
    cx: &mut InferenceContext<'_>,
    window: &mut EventWindow<'_>,
    mon: MonRef,
) -> Result<Option<String>> {
    let holder = cx.state.mon(mon)?;
    let Some(current) = holder.major_status.current() else {
        return Ok(None);
    };
    if holder.item_consumed {
        return Ok(None);
    }

    let mut tasks = Vec::new();
    let names: Vec<String> = holder.item.iter().map(str::to_string).collect();
    for name in names {
        let data = cx.dex.item(&name)?;
        for effect in &data.effects {
            if let ItemEffect::CureStatus { statuses } = effect
                && statuses.contains(&current)
            {
                tasks.push(RaceTask::new(ItemParser::new(
                    mon,
                    &name,
                    Matcher::EatCure {
                        statuses: statuses.clone(),
                    },
                )));
            }
        }
    }
    run(cx, window, tasks)
}

/// Candidates for the end-of-turn trigger (Leftovers, Black Sludge). Exposed
/// so the driver can race them jointly with ability residuals.
pub(crate) fn residual_candidates(
    cx: &InferenceContext<'_>,
    mon: MonRef,
) -> Result<Vec<ItemParser>> {
    let holder = cx.state.mon(mon)?;
    if holder.item_consumed || holder.fainted || !holder.is_active() {
        return Ok(Vec::new());
    }
    let hurt = holder.hp.current < holder.hp.max;
    let names: Vec<String> = holder.item.iter().map(str::to_string).collect();
    let poison = holder_is_poison(cx, mon)?;

    let mut out = Vec::new();
    for name in names {
        let data = cx.dex.item(&name)?;
        for effect in &data.effects {
            if let ItemEffect::ResidualHeal { poison_only } = effect {
                let matcher = if *poison_only && !poison {
                    Some(Matcher::ResidualDamage)
                } else if hurt {
                    Some(Matcher::ResidualHeal)
                } else {
                    // full HP: no heal event expected, nothing to learn
                    None
                };
                if let Some(matcher) = matcher {
                    out.push(ItemParser::new(mon, &name, matcher));
                }
            }
        }
    }
    Ok(out)
}

/// End-of-turn item trigger (Leftovers, Black Sludge).
pub fn on_residual(
    cx: &mut InferenceContext<'_>,
    window: &mut EventWindow<'_>,
    mon: MonRef,
) -> Result<Option<String>> {
    let tasks = residual_candidates(cx, mon)?
        .into_iter()
        .map(RaceTask::new)
        .collect();
    run(cx, window, tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::{sample_dex, Dex};
    use crate::state::battle::{BattleState, SwitchKind};
    use crate::state::pokemon::Pokemon;
    use zoroark_protocol::{parse_event_log, Player};

    fn setup(species: &str) -> (BattleState, Dex, MonRef) {
        let dex = sample_dex();
        let mut state = BattleState::new();
        let mon = Pokemon::new(species, 100, &dex, &mut state.movesets).unwrap();
        state.team_mut(Player::P2).add(mon);
        state.switch_in(Player::P2, 0, SwitchKind::Normal).unwrap();
        (state, dex, MonRef { player: Player::P2, index: 0 })
    }

    #[test]
    fn test_lum_berry_eat_reveals_and_consumes() {
        let (mut state, dex, mon) = setup("Hypno");
        state
            .mon_mut(mon)
            .unwrap()
            .major_status
            .afflict(MajorStatus::Paralysis)
            .unwrap();
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events = parse_event_log(
            "|-enditem|p2a: Hypno|Lum Berry|[eat]\n|-curestatus|p2a: Hypno|par|[msg]",
        )
        .unwrap();
        let mut window = EventWindow::new(&events);

        let accepted = on_update(&mut cx, &mut window, mon).unwrap();
        assert_eq!(accepted.as_deref(), Some("Lum Berry"));
        let holder = state.mon(mon).unwrap();
        assert!(holder.item_consumed);
        assert_eq!(holder.item.definite(), Some("Lum Berry"));
        assert!(holder.major_status.current().is_none());
    }

    #[test]
    fn test_no_berry_eat_eliminates_cure_items() {
        let (mut state, dex, mon) = setup("Hypno");
        state
            .mon_mut(mon)
            .unwrap()
            .major_status
            .afflict(MajorStatus::Paralysis)
            .unwrap();
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events = parse_event_log("|turn|3").unwrap();
        let mut window = EventWindow::new(&events);

        let accepted = on_update(&mut cx, &mut window, mon).unwrap();
        assert!(accepted.is_none());
        let item = &state.mon(mon).unwrap().item;
        // paralysis-curing berries are ruled out, others survive
        assert!(!item.contains("Lum Berry"));
        assert!(!item.contains("Cheri Berry"));
        assert!(item.contains("Chesto Berry"));
        assert!(item.contains("Leftovers"));
    }

    #[test]
    fn test_leftovers_heal_reveals() {
        let (mut state, dex, mon) = setup("Blissey");
        state.mon_mut(mon).unwrap().hp.current = 70;
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events =
            parse_event_log("|-heal|p2a: Blissey|76/100|[from] item: Leftovers").unwrap();
        let mut window = EventWindow::new(&events);

        let accepted = on_residual(&mut cx, &mut window, mon).unwrap();
        assert_eq!(accepted.as_deref(), Some("Leftovers"));
        let holder = state.mon(mon).unwrap();
        assert_eq!(holder.item.definite(), Some("Leftovers"));
        assert_eq!(holder.hp.current, 76);
    }

    #[test]
    fn test_no_residual_heal_eliminates_leftovers() {
        let (mut state, dex, mon) = setup("Blissey");
        state.mon_mut(mon).unwrap().hp.current = 70;
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events = parse_event_log("|upkeep").unwrap();
        let mut window = EventWindow::new(&events);

        let accepted = on_residual(&mut cx, &mut window, mon).unwrap();
        assert!(accepted.is_none());
        let item = &state.mon(mon).unwrap().item;
        assert!(!item.contains("Leftovers"));
        assert!(item.contains("Choice Band"));
    }

    #[test]
    fn test_black_sludge_damage_on_non_poison_holder() {
        let (mut state, dex, mon) = setup("Blissey");
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events =
            parse_event_log("|-damage|p2a: Blissey|88/100|[from] item: Black Sludge").unwrap();
        let mut window = EventWindow::new(&events);

        let accepted = on_residual(&mut cx, &mut window, mon).unwrap();
        assert_eq!(accepted.as_deref(), Some("Black Sludge"));
        assert_eq!(state.mon(mon).unwrap().item.definite(), Some("Black Sludge"));
    }

    #[test]
    fn test_full_hp_learns_nothing_about_leftovers() {
        let (mut state, dex, mon) = setup("Blissey");
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events = parse_event_log("|upkeep").unwrap();
        let mut window = EventWindow::new(&events);

        on_residual(&mut cx, &mut window, mon).unwrap();
        assert!(state.mon(mon).unwrap().item.contains("Leftovers"));
    }
}
