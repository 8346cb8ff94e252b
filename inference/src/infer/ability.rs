//! Ability inference dispatchers
//!
//! Each `on_*` function is a trigger point: it enumerates which of the
//! holder's possible abilities could visibly react, races them over the event
//! window, and turns the outcome into narrowing. Activation proves the
//! ability; provable non-activation of a deterministic effect disproves it.
//! A suppressed ability (Gastro Acid) yields an empty candidate set, so the
//! trigger learns nothing either way.

use std::collections::BTreeSet;

use zoroark_protocol::{Event, MonIdent, Stat};

use crate::dex::{AbilityEffect, BlockAction, ContactAction, MoveData, MoveQualifier, WeatherKind};
use crate::error::{InferenceError, Result};
use crate::reason::{SubInference, SubReason};
use crate::state::battle::MonRef;
use crate::state::counters::MajorStatus;
use crate::unordered::{all, one_of, EffectParser, EventWindow, Feed, InferenceContext, RaceTask};

/// The event pattern a candidate ability would produce.
#[derive(Debug, Clone)]
enum Matcher {
    /// `|-curestatus|HOLDER|S|[from] ability: A`
    CureStatus { statuses: Vec<MajorStatus> },
    /// `|-ability|HOLDER|A`
    Announce,
    /// `|-ability|HOLDER|X|[from] ability: Trace|[of] FOE`
    TraceIndicator,
    /// `|-item|FOE|ITEM|[from] ability: A|[of] HOLDER`
    RevealItem { target: MonRef },
    /// `|-activate|HOLDER|ability: A|MOVE`
    WarnMove { target: MonRef },
    /// `|-ability|HOLDER|A` then `|-unboost|FOE|STAT|N`
    BoostFoes {
        stat: Stat,
        amount: i8,
        target: MonRef,
    },
    /// `|-immune|HOLDER|[from] ability: A`
    Immune,
    /// `|-heal|HOLDER|HP|[from] ability: A`, or the immune line at full HP
    HealOrImmune,
    /// `|-boost|HOLDER|STAT|N|[from] ability: A`
    SelfBoost { stat: Stat, amount: i8 },
    /// `|-start|HOLDER|ability: A` (Flash Fire)
    StartVolatile,
    /// `|-fail|HOLDER|unboost|[from] ability: A`
    FailUnboost,
    /// `|-status|FOE|S|[from] ability: A|[of] HOLDER`
    StatusFoe {
        statuses: Vec<MajorStatus>,
        target: MonRef,
    },
    /// `|-start|HOLDER|typechange|T|[from] ability: A`
    TypeChange,
    /// `|-damage|FOE|HP|[from] ability: A|[of] HOLDER`
    DamageFoe { target: MonRef },
}

/// One candidate ability in a race.
pub struct AbilityParser {
    mon: MonRef,
    ability: String,
    matcher: Matcher,
    inference: SubInference,
    /// When false, acceptance and cancellation are committed by the caller
    /// instead (the Trace disambiguation path).
    commit: bool,
    /// A hypothesis about the *opponent's* ability being traced; never
    /// narrows the holder on its own.
    speculative: bool,
    stage: u8,
    /// Extra observation carried out of the race (traced ability name,
    /// warned move).
    detail: Option<String>,
}

impl AbilityParser {
    fn new(mon: MonRef, ability: &str, matcher: Matcher, inference: SubInference) -> Self {
        AbilityParser {
            mon,
            ability: ability.to_string(),
            matcher,
            inference,
            commit: true,
            speculative: false,
            stage: 0,
            detail: None,
        }
    }

    fn same(&self, cx: &InferenceContext<'_>, ident: &MonIdent) -> bool {
        cx.state.resolve(ident).ok() == Some(self.mon)
    }

    fn is(&self, cx: &InferenceContext<'_>, ident: &MonIdent, target: MonRef) -> bool {
        cx.state.resolve(ident).ok() == Some(target)
    }
}

fn source_is(source: &Option<zoroark_protocol::EffectSource>, ability: &str) -> bool {
    source
        .as_ref()
        .is_some_and(|s| s.is_ability(ability) || s.effect == ability)
}

impl EffectParser for AbilityParser {
    fn label(&self) -> String {
        format!("ability {} of {:?} #{}", self.ability, self.mon.player, self.mon.index)
    }

    fn offer(&mut self, cx: &mut InferenceContext<'_>, event: &Event) -> Result<Feed> {
        match (&self.matcher, event) {
            (Matcher::CureStatus { statuses }, Event::CureStatus { mon, status, source }) => {
                let cured = MajorStatus::from_protocol(status);
                if self.same(cx, mon)
                    && source_is(source, &self.ability)
                    && cured.is_some_and(|s| statuses.contains(&s))
                {
                    cx.state.mon_mut(self.mon)?.major_status.cure();
                    return Ok(Feed::Accept);
                }
                Ok(Feed::Pass)
            }

            (Matcher::Announce, Event::Ability { mon, ability, source }) => {
                if self.same(cx, mon) && *ability == self.ability && source.is_none() {
                    return Ok(Feed::Accept);
                }
                Ok(Feed::Pass)
            }

            (Matcher::TraceIndicator, Event::Ability { mon, ability, source }) => {
                if self.same(cx, mon)
                    && source.as_ref().is_some_and(|s| s.is_ability("Trace"))
                {
                    self.detail = Some(ability.clone());
                    return Ok(Feed::Accept);
                }
                Ok(Feed::Pass)
            }

            (Matcher::RevealItem { target }, Event::Item { mon, item, source }) => {
                if self.is(cx, mon, *target) && source_is(source, &self.ability) {
                    cx.state.mon_mut(*target)?.reveal_item(item)?;
                    self.detail = Some(item.clone());
                    return Ok(Feed::Accept);
                }
                Ok(Feed::Pass)
            }

            (Matcher::WarnMove { target }, Event::Activate { mon: Some(mon), effect, extra, .. }) => {
                if self.same(cx, mon)
                    && effect.strip_prefix("ability: ") == Some(self.ability.as_str())
                {
                    if let Some(warned) = extra.first() {
                        let id = cx.state.mon(*target)?.moveset();
                        cx.state.movesets.reveal(id, warned, cx.dex)?;
                        self.detail = Some(warned.clone());
                    }
                    return Ok(Feed::Accept);
                }
                Ok(Feed::Pass)
            }

            (Matcher::BoostFoes { stat, amount, target }, event) => match (self.stage, event) {
                (0, Event::Ability { mon, ability, source })
                    if self.same(cx, mon) && *ability == self.ability && source.is_none() =>
                {
                    self.stage = 1;
                    Ok(Feed::Consume)
                }
                (1, Event::Unboost { mon, stat: s, amount: a, .. })
                    if self.is(cx, mon, *target) && s == stat && a == amount =>
                {
                    // the drop landing disproves unboost protection on the target
                    if !cx.state.mon(*target)?.ability_suppressed() {
                        let protecting: Vec<String> = cx
                            .state
                            .mon(*target)?
                            .ability()
                            .iter()
                            .filter(|name| {
                                cx.dex.ability(name).is_ok_and(|data| {
                                    data.effects.iter().any(|e| match e {
                                        AbilityEffect::ProtectUnboost { stats } => {
                                            stats.as_ref().is_none_or(|list| list.contains(s))
                                        }
                                        _ => false,
                                    })
                                })
                            })
                            .map(str::to_string)
                            .collect();
                        if !protecting.is_empty() {
                            SubInference::new(
                                format!("unboost protection of {target:?}"),
                                vec![SubReason::ability(*target, protecting)],
                            )
                            .reject(cx.state)?;
                        }
                    }
                    if let Some(v) = &mut cx.state.mon_mut(*target)?.volatile {
                        v.boosts.unboost(*s, *a);
                    }
                    Ok(Feed::Accept)
                }
                // a substitute or similar blocks the drop; the announce
                // already proved the ability
                (1, Event::Activate { .. } | Event::Fail { .. }) => Ok(Feed::Accept),
                (1, _) => Ok(Feed::Reject),
                _ => Ok(Feed::Pass),
            },

            (Matcher::Immune, Event::Immune { mon, source }) => {
                if self.same(cx, mon) && source_is(source, &self.ability) {
                    return Ok(Feed::Accept);
                }
                Ok(Feed::Pass)
            }

            (Matcher::HealOrImmune, Event::Heal { mon, hp, source }) => {
                if self.same(cx, mon) && source_is(source, &self.ability) {
                    cx.state.mon_mut(self.mon)?.apply_hp(hp);
                    return Ok(Feed::Accept);
                }
                Ok(Feed::Pass)
            }
            (Matcher::HealOrImmune, Event::Immune { mon, source }) => {
                if self.same(cx, mon) && source_is(source, &self.ability) {
                    return Ok(Feed::Accept);
                }
                Ok(Feed::Pass)
            }

            (Matcher::SelfBoost { stat, amount }, Event::Boost { mon, stat: s, amount: a, source }) => {
                if self.same(cx, mon)
                    && s == stat
                    && a == amount
                    && source_is(source, &self.ability)
                {
                    if let Some(v) = &mut cx.state.mon_mut(self.mon)?.volatile {
                        v.boosts.boost(*s, *a);
                    }
                    return Ok(Feed::Accept);
                }
                Ok(Feed::Pass)
            }

            (Matcher::StartVolatile, Event::VolatileStart { mon, effect, .. }) => {
                if self.same(cx, mon)
                    && effect.strip_prefix("ability: ") == Some(self.ability.as_str())
                {
                    if self.ability == "Flash Fire"
                        && let Some(v) = &mut cx.state.mon_mut(self.mon)?.volatile
                    {
                        v.flash_fire = true;
                    }
                    return Ok(Feed::Accept);
                }
                Ok(Feed::Pass)
            }

            (Matcher::FailUnboost, Event::Fail { mon, action, source }) => {
                if self.same(cx, mon)
                    && action.as_deref() == Some("unboost")
                    && source_is(source, &self.ability)
                {
                    return Ok(Feed::Accept);
                }
                Ok(Feed::Pass)
            }

            (Matcher::StatusFoe { statuses, target }, Event::Status { mon, status, source }) => {
                if let Some(inflicted) = MajorStatus::from_protocol(status)
                    && self.is(cx, mon, *target)
                    && source_is(source, &self.ability)
                    && statuses.contains(&inflicted)
                {
                    cx.state.mon_mut(*target)?.major_status.afflict(inflicted)?;
                    return Ok(Feed::Accept);
                }
                Ok(Feed::Pass)
            }

            (Matcher::TypeChange, Event::VolatileStart { mon, effect, source, .. }) => {
                if self.same(cx, mon) && effect == "typechange" && source_is(source, &self.ability)
                {
                    return Ok(Feed::Accept);
                }
                Ok(Feed::Pass)
            }

            (Matcher::DamageFoe { target }, Event::Damage { mon, hp, source }) => {
                if self.is(cx, mon, *target) && source_is(source, &self.ability) {
                    cx.state.mon_mut(*target)?.apply_hp(hp);
                    return Ok(Feed::Accept);
                }
                Ok(Feed::Pass)
            }

            _ => Ok(Feed::Pass),
        }
    }

    fn cancel(&mut self, cx: &mut InferenceContext<'_>) -> Result<()> {
        if self.commit && !self.speculative {
            self.inference.reject(cx.state)?;
        }
        Ok(())
    }

    fn rejectable(&self) -> bool {
        // multi-stage matchers engage only on their own announce event, so a
        // divergence after that is a stream error, not an overlap to rewind
        false
    }
}

impl AbilityParser {
    pub(crate) fn commit_accept(&self, cx: &mut InferenceContext<'_>) -> Result<()> {
        self.inference.accept(cx.state)
    }
}

/// Candidate list for one holder at a given trigger. `build` maps an ability
/// effect to the matcher it would produce, or `None` when it cannot fire.
fn candidates<F>(
    cx: &InferenceContext<'_>,
    mon: MonRef,
    mut build: F,
) -> Result<Vec<AbilityParser>>
where
    F: FnMut(&str, &AbilityEffect) -> Option<(Matcher, Vec<SubReason>)>,
{
    let holder = cx.state.mon(mon)?;
    if holder.ability_suppressed() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for name in holder.ability().iter() {
        let data = cx.dex.ability(name)?;
        for effect in &data.effects {
            if let Some((matcher, mut extra)) = build(name, effect) {
                let mut reasons = vec![SubReason::ability(mon, [name])];
                reasons.append(&mut extra);
                let inference = SubInference::new(format!("{name} of {mon:?}"), reasons);
                out.push(AbilityParser::new(mon, name, matcher, inference));
            }
        }
    }
    Ok(out)
}

fn accepted_name(tasks: &[RaceTask<AbilityParser>], accepted: Option<usize>) -> Option<String> {
    accepted.map(|i| tasks[i].parser.ability.clone())
}

/// Switch-in trigger for one or more pokemon entering together. On-start
/// effects of simultaneous entrants interleave by speed, so they race as one
/// unordered set. Returns `(holder, ability)` per activation.
pub fn on_start(
    cx: &mut InferenceContext<'_>,
    window: &mut EventWindow<'_>,
    mons: &[MonRef],
) -> Result<Vec<(MonRef, String)>> {
    let mut tasks: Vec<RaceTask<AbilityParser>> = Vec::new();
    let mut trace_mons: BTreeSet<usize> = BTreeSet::new();

    for (pos, &mon) in mons.iter().enumerate() {
        let holder = cx.state.mon(mon)?;
        if holder.ability_suppressed() {
            continue;
        }
        let opp = cx.state.active_ref(mon.player.opponent());
        let has_status = holder.major_status.current();
        let trace_possible = holder.ability().contains("Trace") && opp.is_some();

        let mut mon_tasks = candidates(cx, mon, |name, effect| {
            if name == "Trace" {
                return None;
            }
            start_matcher(effect, opp, has_status)
        })?;

        if trace_possible {
            let opp = opp.unwrap();
            // the indicator alone covers tracing an ability with no on-start
            // behavior; rejection of this candidate rules Trace out
            mon_tasks.push(AbilityParser::new(
                mon,
                "Trace",
                Matcher::TraceIndicator,
                SubInference::new(
                    format!("Trace of {mon:?}"),
                    vec![SubReason::ability(mon, ["Trace"])],
                ),
            ));
            // speculative candidates: the foe's possible on-start abilities
            // acting as if they were the holder's
            let foe_abilities: Vec<String> =
                cx.state.mon(opp)?.ability().iter().map(str::to_string).collect();
            for name in foe_abilities {
                let data = cx.dex.ability(&name)?;
                for effect in &data.effects {
                    if let Some((matcher, _)) = start_matcher(effect, Some(opp), has_status) {
                        let mut parser = AbilityParser::new(
                            mon,
                            &name,
                            matcher,
                            SubInference::new(format!("traced {name} of {mon:?}"), vec![]),
                        );
                        parser.speculative = true;
                        parser.commit = false;
                        tasks.push(RaceTask::new(parser));
                    }
                }
            }
        }

        if trace_possible {
            // defer all commits for this holder until the indicator question
            // is settled
            for parser in &mut mon_tasks {
                parser.commit = false;
            }
            trace_mons.insert(pos);
        }
        for parser in mon_tasks {
            tasks.push(RaceTask::new(parser));
        }
    }

    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let accepted = all(cx, window, &mut tasks)?;
    let mut results = Vec::new();

    for (pos, &mon) in mons.iter().enumerate() {
        let accepted_for_mon: Vec<usize> = accepted
            .iter()
            .copied()
            .filter(|&i| tasks[i].parser.mon == mon)
            .collect();

        if !trace_mons.contains(&pos) {
            // commits already happened inside the race
            if let Some(&i) = accepted_for_mon.first() {
                tasks[i].parser.commit_accept(cx)?;
                results.push((mon, tasks[i].parser.ability.clone()));
            }
            continue;
        }

        let indicator = accepted_for_mon
            .iter()
            .copied()
            .find(|&i| matches!(tasks[i].parser.matcher, Matcher::TraceIndicator));
        let effect_winner = accepted_for_mon
            .iter()
            .copied()
            .find(|&i| !matches!(tasks[i].parser.matcher, Matcher::TraceIndicator));

        if let Some(ind) = indicator {
            // the holder's real ability is Trace; the apparent one is the
            // copied ability, which is also evidence about the foe
            let traced = tasks[ind].parser.detail.clone().ok_or_else(|| {
                InferenceError::Contradiction {
                    effect: "Trace".to_string(),
                    detail: "indicator event carried no ability name".to_string(),
                }
            })?;
            cx.state.mon_mut(mon)?.reveal_ability("Trace")?;
            cx.state.mon_mut(mon)?.set_ability(&traced)?;
            if let Some(opp) = cx.state.active_ref(mon.player.opponent()) {
                cx.state.reveal_ability(opp, &traced)?;
            }
            results.push((mon, "Trace".to_string()));
        } else if let Some(i) = effect_winner {
            if tasks[i].parser.speculative {
                return Err(InferenceError::Contradiction {
                    effect: "Trace".to_string(),
                    detail: format!(
                        "hypothesized traced ability {} activated but no trace indicator followed",
                        tasks[i].parser.ability
                    ),
                });
            }
            tasks[i].parser.commit_accept(cx)?;
            results.push((mon, tasks[i].parser.ability.clone()));
        } else {
            // nothing activated: every deferred deterministic candidate,
            // Trace included, gets eliminated by non-activation
            for i in 0..tasks.len() {
                let parser = &tasks[i].parser;
                if parser.mon == mon && !parser.speculative {
                    tasks[i].parser.inference.reject(cx.state)?;
                }
            }
        }
    }

    Ok(results)
}

fn start_matcher(
    effect: &AbilityEffect,
    opp: Option<MonRef>,
    has_status: Option<MajorStatus>,
) -> Option<(Matcher, Vec<SubReason>)> {
    match effect {
        AbilityEffect::StartCureStatus { statuses } => {
            let current = has_status?;
            statuses.contains(&current).then(|| {
                (
                    Matcher::CureStatus {
                        statuses: statuses.clone(),
                    },
                    Vec::new(),
                )
            })
        }
        AbilityEffect::Announce => Some((Matcher::Announce, Vec::new())),
        AbilityEffect::RevealItem => {
            // the foe may hold nothing, so non-activation proves nothing
            opp.map(|target| (Matcher::RevealItem { target }, vec![SubReason::Chance]))
        }
        AbilityEffect::WarnMove => opp.map(|target| (Matcher::WarnMove { target }, Vec::new())),
        AbilityEffect::BoostFoes { stat, amount } => opp.map(|target| {
            (
                Matcher::BoostFoes {
                    stat: *stat,
                    amount: *amount,
                    target,
                },
                Vec::new(),
            )
        }),
        _ => None,
    }
}

/// Switch-out trigger (Natural Cure).
pub fn on_switch_out(
    cx: &mut InferenceContext<'_>,
    window: &mut EventWindow<'_>,
    mon: MonRef,
) -> Result<Option<String>> {
    let has_status = cx.state.mon(mon)?.major_status.current();
    let mut tasks: Vec<RaceTask<AbilityParser>> = candidates(cx, mon, |_, effect| {
        match effect {
            AbilityEffect::CureOnSwitchOut if has_status.is_some() => Some((
                Matcher::CureStatus {
                    statuses: vec![
                        MajorStatus::Burn,
                        MajorStatus::Paralysis,
                        MajorStatus::Sleep,
                        MajorStatus::Freeze,
                        MajorStatus::Poison,
                        MajorStatus::Toxic,
                    ],
                },
                Vec::new(),
            )),
            _ => None,
        }
    })?
    .into_iter()
    .map(RaceTask::new)
    .collect();

    if tasks.is_empty() {
        return Ok(None);
    }
    let accepted = one_of(cx, window, &mut tasks)?;
    if let Some(i) = accepted {
        tasks[i].parser.commit_accept(cx)?;
    }
    Ok(accepted_name(&tasks, accepted))
}

/// Move-blocking trigger: `mon` was targeted by `move_used` from `attacker`.
pub fn on_block(
    cx: &mut InferenceContext<'_>,
    window: &mut EventWindow<'_>,
    mon: MonRef,
    move_used: &MoveData,
) -> Result<Option<String>> {
    let mut tasks: Vec<RaceTask<AbilityParser>> = candidates(cx, mon, |_, effect| match effect {
        AbilityEffect::BlockMoveType { typ, action } if *typ == move_used.typ => {
            let matcher = match action {
                BlockAction::Nothing => Matcher::Immune,
                BlockAction::Heal => Matcher::HealOrImmune,
                BlockAction::Boost { stat, amount } => Matcher::SelfBoost {
                    stat: *stat,
                    amount: *amount,
                },
                BlockAction::StartVolatile => Matcher::StartVolatile,
            };
            Some((matcher, Vec::new()))
        }
        AbilityEffect::BlockStatus { statuses } => {
            let inflicted = move_used.inflicts?;
            statuses
                .contains(&inflicted)
                .then_some((Matcher::Immune, Vec::new()))
        }
        _ => None,
    })?
    .into_iter()
    .map(RaceTask::new)
    .collect();

    if tasks.is_empty() {
        return Ok(None);
    }
    let accepted = one_of(cx, window, &mut tasks)?;
    if let Some(i) = accepted {
        tasks[i].parser.commit_accept(cx)?;
    }
    Ok(accepted_name(&tasks, accepted))
}

/// Unboost-protection trigger: `stats` of `mon` are about to drop.
pub fn on_try_unboost(
    cx: &mut InferenceContext<'_>,
    window: &mut EventWindow<'_>,
    mon: MonRef,
    stats: &[Stat],
) -> Result<Option<String>> {
    let mut tasks: Vec<RaceTask<AbilityParser>> = candidates(cx, mon, |_, effect| match effect {
        AbilityEffect::ProtectUnboost { stats: protected } => {
            let covers = match protected {
                None => true,
                Some(list) => stats.iter().any(|s| list.contains(s)),
            };
            covers.then_some((Matcher::FailUnboost, Vec::new()))
        }
        _ => None,
    })?
    .into_iter()
    .map(RaceTask::new)
    .collect();

    if tasks.is_empty() {
        return Ok(None);
    }
    let accepted = one_of(cx, window, &mut tasks)?;
    if let Some(i) = accepted {
        tasks[i].parser.commit_accept(cx)?;
    }
    Ok(accepted_name(&tasks, accepted))
}

/// Status-reflection trigger: `mon` was just statused by `causer`.
pub fn on_status(
    cx: &mut InferenceContext<'_>,
    window: &mut EventWindow<'_>,
    mon: MonRef,
    status: MajorStatus,
    causer: MonRef,
) -> Result<Option<String>> {
    let causer_statused = cx.state.mon(causer)?.major_status.current().is_some();
    let mut tasks: Vec<RaceTask<AbilityParser>> = candidates(cx, mon, |_, effect| match effect {
        AbilityEffect::SyncStatus { statuses }
            if statuses.contains(&status) && !causer_statused =>
        {
            Some((
                Matcher::StatusFoe {
                    statuses: vec![status],
                    target: causer,
                },
                Vec::new(),
            ))
        }
        _ => None,
    })?
    .into_iter()
    .map(RaceTask::new)
    .collect();

    if tasks.is_empty() {
        return Ok(None);
    }
    let accepted = one_of(cx, window, &mut tasks)?;
    if let Some(i) = accepted {
        tasks[i].parser.commit_accept(cx)?;
    }
    Ok(accepted_name(&tasks, accepted))
}

/// Hit-reaction trigger: `mon` was damaged by `attacker`; `trigger` says how
/// hard (any damage, contact, lethal contact).
pub fn on_move_damage(
    cx: &mut InferenceContext<'_>,
    window: &mut EventWindow<'_>,
    mon: MonRef,
    attacker: MonRef,
    trigger: MoveQualifier,
) -> Result<Option<String>> {
    let attacker_statused = cx.state.mon(attacker)?.major_status.current().is_some();
    let mut tasks: Vec<RaceTask<AbilityParser>> = candidates(cx, mon, |_, effect| match effect {
        AbilityEffect::ContactEffect { qualifier, action } if qualifier.answers(trigger) => {
            match action {
                ContactAction::Status { statuses } => {
                    if attacker_statused {
                        return None;
                    }
                    // contact statuses roll a chance, so silence proves nothing
                    Some((
                        Matcher::StatusFoe {
                            statuses: statuses.clone(),
                            target: attacker,
                        },
                        vec![SubReason::Chance],
                    ))
                }
                ContactAction::Damage => {
                    Some((Matcher::DamageFoe { target: attacker }, Vec::new()))
                }
            }
        }
        AbilityEffect::TypeChange if trigger == MoveQualifier::Damage => {
            Some((Matcher::TypeChange, Vec::new()))
        }
        _ => None,
    })?
    .into_iter()
    .map(RaceTask::new)
    .collect();

    if tasks.is_empty() {
        return Ok(None);
    }
    let accepted = one_of(cx, window, &mut tasks)?;
    if let Some(i) = accepted {
        tasks[i].parser.commit_accept(cx)?;
    }
    Ok(accepted_name(&tasks, accepted))
}

/// Drain-inversion trigger: `drainer` is about to heal off `mon`.
pub fn on_move_drain(
    cx: &mut InferenceContext<'_>,
    window: &mut EventWindow<'_>,
    mon: MonRef,
    drainer: MonRef,
) -> Result<Option<String>> {
    let mut tasks: Vec<RaceTask<AbilityParser>> = candidates(cx, mon, |_, effect| match effect {
        AbilityEffect::InvertDrain => Some((Matcher::DamageFoe { target: drainer }, Vec::new())),
        _ => None,
    })?
    .into_iter()
    .map(RaceTask::new)
    .collect();

    if tasks.is_empty() {
        return Ok(None);
    }
    let accepted = one_of(cx, window, &mut tasks)?;
    if let Some(i) = accepted {
        tasks[i].parser.commit_accept(cx)?;
    }
    Ok(accepted_name(&tasks, accepted))
}

/// Expects weather chip damage for one pokemon.
struct WeatherDamageParser {
    mon: MonRef,
    weather: WeatherKind,
}

impl EffectParser for WeatherDamageParser {
    fn label(&self) -> String {
        format!("{:?} damage to {:?} #{}", self.weather, self.mon.player, self.mon.index)
    }

    fn offer(&mut self, cx: &mut InferenceContext<'_>, event: &Event) -> Result<Feed> {
        if let Event::Damage { mon, hp, source } = event
            && cx.state.resolve(mon).ok() == Some(self.mon)
            && source
                .as_ref()
                .is_some_and(|s| s.effect == self.weather.as_protocol())
        {
            cx.state.mon_mut(self.mon)?.apply_hp(hp);
            return Ok(Feed::Accept);
        }
        Ok(Feed::Pass)
    }

    fn cancel(&mut self, _cx: &mut InferenceContext<'_>) -> Result<()> {
        // the weather trigger draws its own conclusions from who got hit
        Ok(())
    }
}

/// Weather residual trigger for every active pokemon at once. Chip damage
/// proves the holder lacks an immunity ability; its absence proves the
/// opposite (or is a contradiction when nothing could explain it).
pub fn on_weather(
    cx: &mut InferenceContext<'_>,
    window: &mut EventWindow<'_>,
    mons: &[MonRef],
    weather: WeatherKind,
) -> Result<()> {
    if !weather.damaging() {
        return Ok(());
    }

    let mut tasks: Vec<RaceTask<WeatherDamageParser>> = Vec::new();
    let mut tracked: Vec<MonRef> = Vec::new();
    for &mon in mons {
        let holder = cx.state.mon(mon)?;
        if holder.fainted || !holder.is_active() {
            continue;
        }
        let types = &cx.dex.species(holder.species())?.types;
        if types.iter().any(|t| weather.immune_types().contains(t)) {
            continue;
        }
        tracked.push(mon);
        tasks.push(RaceTask::new(WeatherDamageParser { mon, weather }));
    }
    if tasks.is_empty() {
        return Ok(());
    }

    let accepted = all(cx, window, &mut tasks)?;

    for (i, &mon) in tracked.iter().enumerate() {
        let holder = cx.state.mon(mon)?;
        let suppressed = holder.ability_suppressed();
        let immune: BTreeSet<String> = holder
            .ability()
            .iter()
            .filter(|name| {
                cx.dex.ability(name).is_ok_and(|data| {
                    data.effects
                        .iter()
                        .any(|e| matches!(e, AbilityEffect::WeatherImmunity { weather: w } if *w == weather))
                })
            })
            .map(str::to_string)
            .collect();

        if accepted.contains(&i) {
            // took damage: no immunity ability
            if !immune.is_empty() && !suppressed {
                SubReason::AbilityIsOneOf {
                    mon,
                    abilities: immune,
                }
                .assert_fails(cx.state)?;
            }
        } else if !suppressed {
            // no damage: something must explain it
            if immune.is_empty() {
                return Err(InferenceError::Contradiction {
                    effect: format!("{weather:?} residual"),
                    detail: format!("{mon:?} took no chip damage and nothing explains it"),
                });
            }
            SubReason::AbilityIsOneOf {
                mon,
                abilities: immune,
            }
            .assert_holds(cx.state)?;
        }
    }
    Ok(())
}

/// Continuous-condition trigger, run after anything that could change state
/// (status cures the holder shouldn't keep).
pub fn on_update(
    cx: &mut InferenceContext<'_>,
    window: &mut EventWindow<'_>,
    mon: MonRef,
) -> Result<Option<String>> {
    let current = cx.state.mon(mon)?.major_status.current();
    let mut tasks: Vec<RaceTask<AbilityParser>> = candidates(cx, mon, |_, effect| match effect {
        AbilityEffect::UpdateCureStatus { statuses } => {
            let current = current?;
            statuses.contains(&current).then(|| {
                (
                    Matcher::CureStatus {
                        statuses: statuses.clone(),
                    },
                    Vec::new(),
                )
            })
        }
        _ => None,
    })?
    .into_iter()
    .map(RaceTask::new)
    .collect();

    if tasks.is_empty() {
        return Ok(None);
    }
    let accepted = one_of(cx, window, &mut tasks)?;
    if let Some(i) = accepted {
        tasks[i].parser.commit_accept(cx)?;
    }
    Ok(accepted_name(&tasks, accepted))
}

/// Candidates for the end-of-turn trigger (Shed Skin, Speed Boost). Exposed
/// so the driver can race them jointly with item residuals.
pub(crate) fn residual_candidates(
    cx: &InferenceContext<'_>,
    mon: MonRef,
) -> Result<Vec<AbilityParser>> {
    let holder = cx.state.mon(mon)?;
    if holder.fainted || !holder.is_active() {
        return Ok(Vec::new());
    }
    let current = holder.major_status.current();
    let spe_maxed = holder
        .volatile
        .as_ref()
        .is_some_and(|v| v.boosts.get(Stat::Spe) >= 6);
    candidates(cx, mon, |_, effect| match effect {
        AbilityEffect::ResidualCure { statuses } => {
            let current = current?;
            statuses.contains(&current).then(|| {
                (
                    Matcher::CureStatus {
                        statuses: statuses.clone(),
                    },
                    // the cure rolls a chance each turn
                    vec![SubReason::Chance],
                )
            })
        }
        AbilityEffect::ResidualBoost { stat, amount } if !spe_maxed => Some((
            Matcher::SelfBoost {
                stat: *stat,
                amount: *amount,
            },
            Vec::new(),
        )),
        _ => None,
    })
}

/// End-of-turn trigger (Shed Skin, Speed Boost).
pub fn on_residual(
    cx: &mut InferenceContext<'_>,
    window: &mut EventWindow<'_>,
    mon: MonRef,
) -> Result<Option<String>> {
    let mut tasks: Vec<RaceTask<AbilityParser>> = residual_candidates(cx, mon)?
        .into_iter()
        .map(RaceTask::new)
        .collect();

    if tasks.is_empty() {
        return Ok(None);
    }
    let accepted = one_of(cx, window, &mut tasks)?;
    if let Some(i) = accepted {
        tasks[i].parser.commit_accept(cx)?;
    }
    Ok(accepted_name(&tasks, accepted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::{sample_dex, Dex};
    use crate::state::battle::{BattleState, SwitchKind};
    use crate::state::pokemon::Pokemon;
    use zoroark_protocol::{parse_event_log, Player};

    fn setup(p1: &[&str], p2: &[&str]) -> (BattleState, Dex) {
        let dex = sample_dex();
        let mut state = BattleState::new();
        for species in p1 {
            let mon = Pokemon::new(species, 100, &dex, &mut state.movesets).unwrap();
            state.team_mut(Player::P1).add(mon);
        }
        for species in p2 {
            let mon = Pokemon::new(species, 100, &dex, &mut state.movesets).unwrap();
            state.team_mut(Player::P2).add(mon);
        }
        state.switch_in(Player::P1, 0, SwitchKind::Normal).unwrap();
        state.switch_in(Player::P2, 0, SwitchKind::Normal).unwrap();
        (state, dex)
    }

    fn p1() -> MonRef {
        MonRef { player: Player::P1, index: 0 }
    }

    fn p2() -> MonRef {
        MonRef { player: Player::P2, index: 0 }
    }

    #[test]
    fn test_on_start_intimidate_accepts_and_applies() {
        let (mut state, dex) = setup(&["Gyarados"], &["Pikachu"]);
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events = parse_event_log(
            "|-ability|p1a: Gyarados|Intimidate\n|-unboost|p2a: Pikachu|atk|1",
        )
        .unwrap();
        let mut window = EventWindow::new(&events);

        let results = on_start(&mut cx, &mut window, &[p1()]).unwrap();
        assert_eq!(results, vec![(p1(), "Intimidate".to_string())]);
        assert_eq!(
            state.mon(p2()).unwrap().volatile.as_ref().unwrap().boosts.atk,
            -1
        );
        assert_eq!(
            state.mon(p1()).unwrap().ability().definite(),
            Some("Intimidate")
        );
    }

    #[test]
    fn test_on_start_non_activation_eliminates_forewarn() {
        // Hypno could be Insomnia or Forewarn; Forewarn always activates on
        // entry, so a quiet entry proves Insomnia
        let (mut state, dex) = setup(&["Pikachu"], &["Hypno"]);
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events = parse_event_log("|turn|1").unwrap();
        let mut window = EventWindow::new(&events);

        let results = on_start(&mut cx, &mut window, &[p2()]).unwrap();
        assert!(results.is_empty());
        assert_eq!(
            state.mon(p2()).unwrap().ability().definite(),
            Some("Insomnia")
        );
    }

    #[test]
    fn test_on_start_forewarn_reveals_foe_move() {
        let (mut state, dex) = setup(&["Pikachu"], &["Hypno"]);
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events = parse_event_log("|-activate|p2a: Hypno|ability: Forewarn|Thunderbolt")
            .unwrap();
        let mut window = EventWindow::new(&events);

        let results = on_start(&mut cx, &mut window, &[p2()]).unwrap();
        assert_eq!(results, vec![(p2(), "Forewarn".to_string())]);
        let id = state.mon(p1()).unwrap().moveset();
        assert!(state.movesets.contains(id, "Thunderbolt"));
    }

    #[test]
    fn test_on_start_trace_with_indicator() {
        // Gardevoir in, Gyarados opposing: traced Intimidate fires as if it
        // were Gardevoir's, then the indicator attributes it to Trace
        let (mut state, dex) = setup(&["Gardevoir"], &["Gyarados"]);
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events = parse_event_log(
            "|-ability|p1a: Gardevoir|Intimidate\n\
             |-unboost|p2a: Gyarados|atk|1\n\
             |-ability|p1a: Gardevoir|Intimidate|[from] ability: Trace|[of] p2a: Gyarados",
        )
        .unwrap();
        let mut window = EventWindow::new(&events);

        let results = on_start(&mut cx, &mut window, &[p1()]).unwrap();
        assert_eq!(results, vec![(p1(), "Trace".to_string())]);
        // base ability resolved to Trace, apparent ability is the copy
        assert_eq!(
            state.mon(p1()).unwrap().base_ability().definite(),
            Some("Trace")
        );
        assert_eq!(
            state.mon(p1()).unwrap().ability().definite(),
            Some("Intimidate")
        );
    }

    #[test]
    fn test_on_start_speculative_trace_without_indicator_errors() {
        let (mut state, dex) = setup(&["Gardevoir"], &["Gyarados"]);
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        // the foe-side Intimidate pattern fires on Gardevoir with no
        // follow-up indicator: inconsistent stream
        let events = parse_event_log(
            "|-ability|p1a: Gardevoir|Intimidate\n|-unboost|p2a: Gyarados|atk|1\n|turn|1",
        )
        .unwrap();
        let mut window = EventWindow::new(&events);

        let err = on_start(&mut cx, &mut window, &[p1()]).unwrap_err();
        assert!(matches!(err, InferenceError::Contradiction { .. }));
    }

    #[test]
    fn test_on_start_quiet_entry_keeps_synchronize_and_drops_trace() {
        // neither Synchronize nor Trace produced events: Trace always shows
        // its indicator, so only Synchronize survives
        let (mut state, dex) = setup(&["Gardevoir"], &["Gyarados"]);
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events = parse_event_log("|turn|1").unwrap();
        let mut window = EventWindow::new(&events);

        on_start(&mut cx, &mut window, &[p1()]).unwrap();
        assert_eq!(
            state.mon(p1()).unwrap().ability().definite(),
            Some("Synchronize")
        );
    }

    #[test]
    fn test_on_start_suppressed_ability_learns_nothing() {
        let (mut state, dex) = setup(&["Pikachu"], &["Hypno"]);
        state
            .mon_mut(p2())
            .unwrap()
            .volatile
            .as_mut()
            .unwrap()
            .suppress_ability = true;
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events = parse_event_log("|turn|1").unwrap();
        let mut window = EventWindow::new(&events);

        let results = on_start(&mut cx, &mut window, &[p2()]).unwrap();
        assert!(results.is_empty());
        assert_eq!(state.mon(p2()).unwrap().ability().len(), 2);
    }

    #[test]
    fn test_on_block_volt_absorb_heal() {
        let (mut state, dex) = setup(&["Pikachu"], &["Jolteon"]);
        state.mon_mut(p2()).unwrap().hp.current = 60;
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events =
            parse_event_log("|-heal|p2a: Jolteon|85/100|[from] ability: Volt Absorb").unwrap();
        let mut window = EventWindow::new(&events);

        let thunderbolt = dex.move_data("Thunderbolt").unwrap().clone();
        let accepted = on_block(&mut cx, &mut window, p2(), &thunderbolt).unwrap();
        assert_eq!(accepted.as_deref(), Some("Volt Absorb"));
        assert_eq!(state.mon(p2()).unwrap().hp.current, 85);
    }

    #[test]
    fn test_on_move_damage_static_silence_learns_nothing() {
        // Static is chance-based, so no paralysis after contact leaves the
        // ability set untouched
        let (mut state, dex) = setup(&["Machamp"], &["Pikachu"]);
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events = parse_event_log("|turn|2").unwrap();
        let mut window = EventWindow::new(&events);

        let accepted =
            on_move_damage(&mut cx, &mut window, p2(), p1(), MoveQualifier::Contact).unwrap();
        assert!(accepted.is_none());
        assert_eq!(
            state.mon(p2()).unwrap().ability().definite(),
            Some("Static")
        );
    }

    #[test]
    fn test_on_move_damage_static_activation() {
        let (mut state, dex) = setup(&["Machamp"], &["Pikachu"]);
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events = parse_event_log(
            "|-status|p1a: Machamp|par|[from] ability: Static|[of] p2a: Pikachu",
        )
        .unwrap();
        let mut window = EventWindow::new(&events);

        let accepted =
            on_move_damage(&mut cx, &mut window, p2(), p1(), MoveQualifier::Contact).unwrap();
        assert_eq!(accepted.as_deref(), Some("Static"));
        assert!(state.mon(p1()).unwrap().has_status(MajorStatus::Paralysis));
    }

    #[test]
    fn test_on_move_drain_eliminates_liquid_ooze_when_heal_lands() {
        // Tentacruel could be Clear Body or Liquid Ooze; a drain that heals
        // the drainer proves it is not Liquid Ooze
        let (mut state, dex) = setup(&["Pikachu"], &["Tentacruel"]);
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events = parse_event_log("|-heal|p1a: Pikachu|90/100|[from] drain").unwrap();
        let mut window = EventWindow::new(&events);

        let accepted = on_move_drain(&mut cx, &mut window, p2(), p1()).unwrap();
        assert!(accepted.is_none());
        assert_eq!(
            state.mon(p2()).unwrap().ability().definite(),
            Some("Clear Body")
        );
    }

    #[test]
    fn test_on_weather_sandstorm_narrows_clefable() {
        // Clefable takes no sand damage: Magic Guard is the only explanation
        let (mut state, dex) = setup(&["Clefable"], &["Pikachu"]);
        state.weather.start(WeatherKind::Sand, false);
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events = parse_event_log("|-damage|p2a: Pikachu|94/100|[from] Sandstorm\n|upkeep")
            .unwrap();
        let mut window = EventWindow::new(&events);

        on_weather(&mut cx, &mut window, &[p1(), p2()], WeatherKind::Sand).unwrap();
        assert_eq!(
            state.mon(p1()).unwrap().ability().definite(),
            Some("Magic Guard")
        );
        assert_eq!(state.mon(p2()).unwrap().hp.current, 94);
    }

    #[test]
    fn test_on_weather_unexplained_immunity_is_contradiction() {
        // Pikachu has no sand immunity, so missing chip damage is fatal
        let (mut state, dex) = setup(&["Pikachu"], &["Hypno"]);
        state.weather.start(WeatherKind::Sand, false);
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events = parse_event_log("|upkeep").unwrap();
        let mut window = EventWindow::new(&events);

        let err = on_weather(&mut cx, &mut window, &[p1()], WeatherKind::Sand).unwrap_err();
        assert!(matches!(err, InferenceError::Contradiction { .. }));
    }

    #[test]
    fn test_on_residual_shed_skin_cure_accepts() {
        let (mut state, dex) = setup(&["Pikachu"], &["Machamp"]);
        // widen the ability set to include Shed Skin for the scenario
        state
            .mon_mut(p2())
            .unwrap()
            .set_ability_candidates(["Guts", "Shed Skin"])
            .unwrap();
        state
            .mon_mut(p2())
            .unwrap()
            .major_status
            .afflict(MajorStatus::Burn)
            .unwrap();
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events =
            parse_event_log("|-curestatus|p2a: Machamp|brn|[from] ability: Shed Skin").unwrap();
        let mut window = EventWindow::new(&events);

        let accepted = on_residual(&mut cx, &mut window, p2()).unwrap();
        assert_eq!(accepted.as_deref(), Some("Shed Skin"));
        assert!(state.mon(p2()).unwrap().major_status.current().is_none());
    }

    #[test]
    fn test_on_try_unboost_clear_body_blocks() {
        let (mut state, dex) = setup(&["Gyarados"], &["Tentacruel"]);
        let mut cx = InferenceContext { state: &mut state, dex: &dex };
        let events = parse_event_log(
            "|-fail|p2a: Tentacruel|unboost|[from] ability: Clear Body|[of] p2a: Tentacruel",
        )
        .unwrap();
        let mut window = EventWindow::new(&events);

        let accepted = on_try_unboost(&mut cx, &mut window, p2(), &[Stat::Atk]).unwrap();
        assert_eq!(accepted.as_deref(), Some("Clear Body"));
        assert_eq!(
            state.mon(p2()).unwrap().ability().definite(),
            Some("Clear Body")
        );
    }
}
