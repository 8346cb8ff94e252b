//! Battle log driver
//!
//! The [`Tracker`] walks a typed event stream and keeps [`BattleState`] in
//! sync, firing the ability and item dispatchers at their trigger points.
//! Switch-ins are buffered so simultaneous entrants race their on-start
//! effects as one unordered set, and the whole end-of-turn residual phase is
//! raced jointly since the log does not fix its internal order.

use zoroark_protocol::{parse_event_log, Event, Player, Stat};

use crate::dex::{AbilityEffect, Dex, ItemEffect, MoveQualifier, WeatherKind};
use crate::error::{InferenceError, Result};
use crate::infer::{ability, item};
use crate::state::battle::{BattleState, MonRef, SwitchKind};
use crate::state::counters::MajorStatus;
use crate::state::pokemon::Pokemon;
use crate::state::volatile::TwoTurnMove;
use crate::unordered::{all, EffectParser, EventWindow, Feed, InferenceContext, RaceTask};

const ALL_STATS: [Stat; 7] = [
    Stat::Atk,
    Stat::Def,
    Stat::Spa,
    Stat::Spd,
    Stat::Spe,
    Stat::Accuracy,
    Stat::Evasion,
];

const PLAYERS: [Player; 2] = [Player::P1, Player::P2];

pub struct Tracker {
    pub state: BattleState,
    dex: Dex,
    /// Entrants whose on-start effects have not raced yet.
    pending_start: Vec<MonRef>,
    /// Switch kind the next replacement inherits, armed by pivot moves.
    next_switch_kind: [SwitchKind; 2],
    /// Set once the end-of-turn residual phase has run this turn.
    residual_done: bool,
    last_move_user: Option<MonRef>,
    ended: bool,
}

impl Tracker {
    pub fn new(dex: Dex) -> Self {
        Tracker {
            state: BattleState::new(),
            dex,
            pending_start: Vec::new(),
            next_switch_kind: [SwitchKind::Normal; 2],
            residual_done: false,
            last_move_user: None,
            ended: false,
        }
    }

    pub fn dex(&self) -> &Dex {
        &self.dex
    }

    /// Parse and track a raw battle log chunk.
    pub fn track_log(&mut self, log: &str) -> Result<()> {
        let events =
            parse_event_log(log).map_err(|e| InferenceError::UnexpectedEvent {
                effect: "log parse".to_string(),
                detail: e.to_string(),
            })?;
        self.track(&events)
    }

    /// Advance the belief state through a sequence of events.
    pub fn track(&mut self, events: &[Event]) -> Result<()> {
        let mut cursor = 0;
        while cursor < events.len() {
            if self.ended {
                break;
            }
            let tail = &events[cursor..];

            // switch-ins buffer until the first non-switch event, then their
            // on-start effects race together
            if !self.pending_start.is_empty()
                && !matches!(tail[0], Event::Switch { .. } | Event::Drag { .. })
            {
                cursor += self.flush_switch_ins(tail)?;
                continue;
            }
            if !self.residual_done && self.residual_trigger(&tail[0]) {
                cursor += self.run_residual_phase(tail)?;
                continue;
            }
            cursor += self.step(tail)?;
        }
        if !self.pending_start.is_empty() {
            self.flush_switch_ins(&[])?;
        }
        Ok(())
    }

    fn cx(&mut self) -> InferenceContext<'_> {
        InferenceContext {
            state: &mut self.state,
            dex: &self.dex,
        }
    }

    fn flush_switch_ins(&mut self, tail: &[Event]) -> Result<usize> {
        let mons = std::mem::take(&mut self.pending_start);
        let mut window = EventWindow::new(tail);
        let mut cx = self.cx();
        let results = ability::on_start(&mut cx, &mut window, &mons)?;
        for (mon, name) in &results {
            tracing::debug!(?mon, ability = %name, "switch-in ability observed");
        }
        Ok(window.mark())
    }

    /// Does this event open the end-of-turn residual phase?
    fn residual_trigger(&self, event: &Event) -> bool {
        match event {
            Event::Upkeep => true,
            Event::Weather { upkeep, .. } => *upkeep,
            Event::Heal { source: Some(s), .. } | Event::Damage { source: Some(s), .. } => {
                s.item().is_some_and(|name| {
                    self.dex.item(name).is_ok_and(|data| {
                        data.effects
                            .iter()
                            .any(|e| matches!(e, ItemEffect::ResidualHeal { .. }))
                    })
                })
            }
            Event::CureStatus { source: Some(s), .. } | Event::Boost { source: Some(s), .. } => {
                s.ability().is_some_and(|name| {
                    self.dex.ability(name).is_ok_and(|data| {
                        data.effects.iter().any(|e| {
                            matches!(
                                e,
                                AbilityEffect::ResidualCure { .. }
                                    | AbilityEffect::ResidualBoost { .. }
                            )
                        })
                    })
                })
            }
            _ => false,
        }
    }

    /// Weather upkeep, then one joint race over every end-of-turn candidate
    /// of both actives. Mechanical residual damage (burn, poison, Leech Seed)
    /// is consumed by pass-through tasks so it cannot deadline the race early.
    fn run_residual_phase(&mut self, tail: &[Event]) -> Result<usize> {
        self.residual_done = true;
        let mut window = EventWindow::new(tail);
        let mut cx = InferenceContext {
            state: &mut self.state,
            dex: &self.dex,
        };

        if let Some(Event::Weather { weather, upkeep: true, .. }) = window.peek() {
            window.advance();
            if let Some(kind) = WeatherKind::from_protocol(weather) {
                if cx.state.weather.current() != Some(kind) {
                    // missed the start line; adopt what the log says
                    cx.state.weather.start(kind, false);
                }
                cx.state.weather.tick()?;
                let actives: Vec<MonRef> = PLAYERS
                    .iter()
                    .filter_map(|p| cx.state.active_ref(*p))
                    .collect();
                ability::on_weather(&mut cx, &mut window, &actives, kind)?;
            }
        }

        let mut tasks: Vec<RaceTask<ResidualTask>> = Vec::new();
        for player in PLAYERS {
            let Some(mon) = cx.state.active_ref(player) else {
                continue;
            };
            for parser in ability::residual_candidates(&cx, mon)? {
                tasks.push(RaceTask::new(ResidualTask::Ability(parser)));
            }
            for parser in item::residual_candidates(&cx, mon)? {
                tasks.push(RaceTask::new(ResidualTask::Item(parser)));
            }
        }
        let background = tail[window.mark()..]
            .iter()
            .take_while(|e| !matches!(e, Event::Upkeep | Event::Turn(_)))
            .filter(|e| is_background_residual(e))
            .count();
        for _ in 0..background {
            tasks.push(RaceTask::new(ResidualTask::Background(false)));
        }

        if !tasks.is_empty() {
            let accepted = all(&mut cx, &mut window, &mut tasks)?;
            for i in accepted {
                match &tasks[i].parser {
                    ResidualTask::Ability(p) => p.commit_accept(&mut cx)?,
                    ResidualTask::Item(p) => p.commit_accept(&mut cx)?,
                    ResidualTask::Background(_) => {}
                }
            }
        }

        for player in PLAYERS {
            if let Some(mon) = cx.state.team_mut(player).active_mut() {
                mon.major_status.tick_toxic();
            }
        }
        Ok(window.mark())
    }

    /// Handle the event at `tail[0]`, returning how many events were taken.
    fn step(&mut self, tail: &[Event]) -> Result<usize> {
        match &tail[0] {
            Event::Turn(n) => {
                self.state.turn = *n;
                self.residual_done = false;
                self.last_move_user = None;
                for player in PLAYERS {
                    if let Some(mon) = self.state.team_mut(player).active_mut()
                        && let Some(v) = &mut mon.volatile
                    {
                        v.tick_turn()?;
                    }
                }
                Ok(1)
            }

            // the residual phase already ran (or had nothing to race)
            Event::Upkeep => Ok(1),

            Event::Move { .. } => self.handle_move(tail),
            Event::Switch { .. } | Event::Drag { .. } => self.handle_switch(tail),
            Event::Status { .. } => self.handle_status(tail),

            Event::Faint(mon) => {
                let r = self.state.resolve(mon)?;
                if !self.state.mon(r)?.fainted {
                    self.state.faint(r)?;
                }
                Ok(1)
            }

            Event::Cant { mon, reason, .. } => {
                let r = self.state.resolve(mon)?;
                match reason.as_str() {
                    "slp" => self.state.mon_mut(r)?.major_status.tick_sleep()?,
                    "recharge" => {
                        if let Some(v) = &mut self.state.mon_mut(r)?.volatile {
                            v.must_recharge = false;
                        }
                    }
                    _ => {}
                }
                Ok(1)
            }

            Event::Ability { mon, ability, source } => {
                let r = self.state.resolve(mon)?;
                if let Some(s) = source
                    && s.is_ability("Trace")
                {
                    // real ability is Trace; the shown one is the copy and is
                    // evidence about its original owner
                    self.state.mon_mut(r)?.reveal_ability("Trace")?;
                    self.state.mon_mut(r)?.set_ability(ability)?;
                    if let Some(of) = &s.of
                        && let Ok(owner) = self.state.resolve(of)
                    {
                        self.state.reveal_ability(owner, ability)?;
                    }
                } else {
                    self.state.reveal_ability(r, ability)?;
                }
                Ok(1)
            }

            Event::EndAbility(mon) => {
                let r = self.state.resolve(mon)?;
                if let Some(v) = &mut self.state.mon_mut(r)?.volatile {
                    v.suppress_ability = true;
                }
                Ok(1)
            }

            Event::Item { mon, item, source } => {
                let r = self.state.resolve(mon)?;
                self.state.mon_mut(r)?.reveal_item(item)?;
                if let Some(s) = source
                    && let Some(name) = s.ability()
                    && let Some(of) = &s.of
                    && let Ok(holder) = self.state.resolve(of)
                {
                    self.state.reveal_ability(holder, name)?;
                }
                Ok(1)
            }

            Event::EndItem { mon, item, .. } => {
                // eaten or knocked away: identity confirmed, no longer held
                let r = self.state.resolve(mon)?;
                self.state.mon_mut(r)?.consume_item(item)?;
                Ok(1)
            }

            Event::CureStatus { mon, source, .. } => {
                let r = self.state.resolve(mon)?;
                if let Some(s) = source {
                    if let Some(name) = s.ability() {
                        self.state.reveal_ability(r, name)?;
                    } else if let Some(name) = s.item() {
                        self.state.mon_mut(r)?.reveal_item(name)?;
                    }
                }
                self.state.mon_mut(r)?.major_status.cure();
                Ok(1)
            }

            Event::CureTeam(mon) => {
                for p in &mut self.state.team_mut(mon.player).pokemon {
                    p.major_status.cure();
                }
                Ok(1)
            }

            Event::Damage { mon, hp, source } => {
                let r = self.state.resolve(mon)?;
                self.state.mon_mut(r)?.apply_hp(hp);
                if let Some(s) = source {
                    if let Some(name) = s.ability() {
                        let holder = s
                            .of
                            .as_ref()
                            .and_then(|o| self.state.resolve(o).ok())
                            .unwrap_or(r);
                        self.state.reveal_ability(holder, name)?;
                    } else if let Some(name) = s.item() {
                        self.state.mon_mut(r)?.reveal_item(name)?;
                    }
                }
                Ok(1)
            }

            Event::Heal { mon, hp, source } => {
                let r = self.state.resolve(mon)?;
                self.state.mon_mut(r)?.apply_hp(hp);
                if let Some(s) = source {
                    if let Some(name) = s.ability() {
                        self.state.reveal_ability(r, name)?;
                    } else if let Some(name) = s.item() {
                        self.state.mon_mut(r)?.reveal_item(name)?;
                    }
                }
                Ok(1)
            }

            Event::SetHp { mon, hp } => {
                let r = self.state.resolve(mon)?;
                self.state.mon_mut(r)?.apply_hp(hp);
                Ok(1)
            }

            Event::Boost { mon, stat, amount, source } => {
                let r = self.state.resolve(mon)?;
                if let Some(s) = source
                    && let Some(name) = s.ability()
                {
                    self.state.reveal_ability(r, name)?;
                }
                if let Some(v) = &mut self.state.mon_mut(r)?.volatile {
                    v.boosts.boost(*stat, *amount);
                }
                Ok(1)
            }

            Event::Unboost { mon, stat, amount, source } => {
                let r = self.state.resolve(mon)?;
                // a foe-inflicted drop that went through disproves protection
                if source.is_none() && self.last_move_user != Some(r) {
                    let mut window = EventWindow::new(tail);
                    let mut cx = self.cx();
                    ability::on_try_unboost(&mut cx, &mut window, r, &[*stat])?;
                }
                if let Some(v) = &mut self.state.mon_mut(r)?.volatile {
                    v.boosts.unboost(*stat, *amount);
                }
                Ok(1)
            }

            Event::SetBoost { mon, stat, amount } => {
                let r = self.state.resolve(mon)?;
                if let Some(v) = &mut self.state.mon_mut(r)?.volatile {
                    v.boosts.set(*stat, *amount);
                }
                Ok(1)
            }

            Event::ClearBoost(mon) => {
                let r = self.state.resolve(mon)?;
                if let Some(v) = &mut self.state.mon_mut(r)?.volatile {
                    v.boosts.clear();
                }
                Ok(1)
            }

            Event::Fail { mon, action, source } => {
                if action.as_deref() == Some("unboost") {
                    let r = self.state.resolve(mon)?;
                    let mut window = EventWindow::new(tail);
                    let mut cx = self.cx();
                    ability::on_try_unboost(&mut cx, &mut window, r, &ALL_STATS)?;
                    if window.mark() > 0 {
                        return Ok(window.mark());
                    }
                    if let Some(s) = source
                        && let Some(name) = s.ability()
                    {
                        self.state.reveal_ability(r, name)?;
                    }
                }
                Ok(1)
            }

            Event::Immune { mon, source } => {
                if let Some(s) = source
                    && let Some(name) = s.ability()
                {
                    let r = self.state.resolve(mon)?;
                    self.state.reveal_ability(r, name)?;
                }
                Ok(1)
            }

            Event::Weather { weather, upkeep: false, source } => {
                match WeatherKind::from_protocol(weather) {
                    Some(kind) => {
                        // ability-set weather has no duration in gen 4
                        let infinite =
                            source.as_ref().is_some_and(|s| s.ability().is_some());
                        if let Some(s) = source
                            && let Some(name) = s.ability()
                            && let Some(of) = &s.of
                            && let Ok(setter) = self.state.resolve(of)
                        {
                            self.state.reveal_ability(setter, name)?;
                        }
                        self.state.weather.start(kind, infinite);
                    }
                    None => self.state.weather.end(),
                }
                Ok(1)
            }

            // residual phase already consumed or adopted it
            Event::Weather { upkeep: true, .. } => Ok(1),

            Event::VolatileStart { mon, effect, extra, source } => {
                let r = self.state.resolve(mon)?;
                if let Some(s) = source
                    && let Some(name) = s.ability()
                {
                    self.state.reveal_ability(r, name)?;
                }
                let effect = effect.strip_prefix("move: ").unwrap_or(effect.as_str());
                if let Some(v) = &mut self.state.mon_mut(r)?.volatile {
                    match effect {
                        "confusion" => v.confusion.start(),
                        "Substitute" => v.substitute = true,
                        "Embargo" => v.embargo.start(),
                        "Magnet Rise" => v.magnet_rise.start(),
                        "Disable" => {
                            v.disabled.start();
                            v.disabled_move = extra.clone();
                        }
                        "Encore" => v.encore.start(),
                        "Taunt" => v.taunt.start(),
                        "Slow Start" => v.slow_start.start(),
                        "Attract" => v.attract = true,
                        "Leech Seed" => v.leech_seed = true,
                        "Curse" => v.curse = true,
                        "Focus Energy" => v.focus_energy = true,
                        "Ingrain" => v.ingrain = true,
                        "Uproar" => v.uproar.start(),
                        "Bide" => v.bide.start(),
                        "Torment" => v.torment = true,
                        "Gastro Acid" => v.suppress_ability = true,
                        "ability: Flash Fire" => v.flash_fire = true,
                        other => {
                            tracing::trace!(effect = other, "untracked volatile start")
                        }
                    }
                }
                Ok(1)
            }

            Event::VolatileEnd { mon, effect, .. } => {
                let r = self.state.resolve(mon)?;
                let effect = effect.strip_prefix("move: ").unwrap_or(effect.as_str());
                if let Some(v) = &mut self.state.mon_mut(r)?.volatile {
                    match effect {
                        "confusion" => v.confusion.end(),
                        "Substitute" => v.substitute = false,
                        "Embargo" => v.embargo.end(),
                        "Magnet Rise" => v.magnet_rise.end(),
                        "Disable" => {
                            v.disabled.end();
                            v.disabled_move = None;
                        }
                        "Encore" => v.encore.end(),
                        "Taunt" => v.taunt.end(),
                        "Slow Start" => v.slow_start.end(),
                        "Attract" => v.attract = false,
                        "Leech Seed" => v.leech_seed = false,
                        "Uproar" => v.uproar.end(),
                        "Bide" => v.bide.end(),
                        "Torment" => v.torment = false,
                        other => {
                            tracing::trace!(effect = other, "untracked volatile end")
                        }
                    }
                }
                Ok(1)
            }

            Event::SingleTurn { mon, effect } => {
                let r = self.state.resolve(mon)?;
                if let Some(v) = &mut self.state.mon_mut(r)?.volatile {
                    if effect.contains("Protect") {
                        v.stall_turns += 1;
                    } else if effect.contains("Roost") {
                        v.roost = true;
                    }
                }
                Ok(1)
            }

            Event::SingleMove { mon, effect } => {
                let r = self.state.resolve(mon)?;
                if let Some(v) = &mut self.state.mon_mut(r)?.volatile {
                    if effect.contains("Destiny Bond") {
                        v.destiny_bond = true;
                    } else if effect.contains("Rage") {
                        v.rage = true;
                    }
                }
                Ok(1)
            }

            Event::MustRecharge(mon) => {
                let r = self.state.resolve(mon)?;
                if let Some(v) = &mut self.state.mon_mut(r)?.volatile {
                    v.must_recharge = true;
                }
                Ok(1)
            }

            Event::Prepare { mon, move_name, .. } => {
                let r = self.state.resolve(mon)?;
                let charging = match move_name.as_str() {
                    "Bounce" => Some(TwoTurnMove::Bounce),
                    "Dig" => Some(TwoTurnMove::Dig),
                    "Dive" => Some(TwoTurnMove::Dive),
                    "Fly" => Some(TwoTurnMove::Fly),
                    "Sky Attack" => Some(TwoTurnMove::SkyAttack),
                    "Solar Beam" => Some(TwoTurnMove::SolarBeam),
                    _ => None,
                };
                if let Some(m) = charging
                    && let Some(v) = &mut self.state.mon_mut(r)?.volatile
                {
                    v.two_turn.start(m, false);
                }
                Ok(1)
            }

            Event::Transform { mon, .. } => {
                let user = self.state.resolve(mon)?;
                let target = self
                    .state
                    .active_ref(user.player.opponent())
                    .ok_or_else(|| InferenceError::Contradiction {
                        effect: "Transform".to_string(),
                        detail: "no opposing pokemon to copy".to_string(),
                    })?;
                self.state.transform(user, target, &self.dex)?;
                Ok(1)
            }

            Event::Win(_) | Event::Tie => {
                self.ended = true;
                Ok(1)
            }

            Event::Activate { mon: Some(mon), effect, .. } => {
                if let Some(name) = effect.strip_prefix("ability: ")
                    && let Ok(r) = self.state.resolve(mon)
                {
                    self.state.reveal_ability(r, name)?;
                }
                Ok(1)
            }

            Event::Activate { mon: None, .. }
            | Event::Block { .. }
            | Event::Miss { .. }
            | Event::FieldStart { .. }
            | Event::FieldEnd { .. } => Ok(1),
        }
    }

    fn handle_switch(&mut self, tail: &[Event]) -> Result<usize> {
        let (mon, details, hp, dragged) = match &tail[0] {
            Event::Switch { mon, details, hp } => (mon, details, hp, false),
            Event::Drag { mon, details, hp } => (mon, details, hp, true),
            _ => unreachable!("handle_switch on a non-switch event"),
        };
        let player = mon.player;
        let kind = if dragged {
            SwitchKind::Normal
        } else {
            self.next_switch_kind[player.index()]
        };
        self.next_switch_kind[player.index()] = SwitchKind::Normal;

        // a statused pokemon leaving quietly disproves switch-out cures
        if let Some(out) = self.state.active_ref(player)
            && self.state.mon(out)?.major_status.current().is_some()
        {
            let mut window = EventWindow::new(tail);
            let mut cx = self.cx();
            ability::on_switch_out(&mut cx, &mut window, out)?;
        }

        let index = match self.state.team(player).find(&details.species) {
            Some(i) => i,
            None => {
                let mut incoming = Pokemon::new(
                    &details.species,
                    details.level.unwrap_or(100),
                    &self.dex,
                    &mut self.state.movesets,
                )?;
                incoming.gender = details.gender;
                self.state.team_mut(player).add(incoming)
            }
        };
        self.state.switch_in(player, index, kind)?;

        let r = MonRef { player, index };
        if let Some(hp) = hp {
            self.state.mon_mut(r)?.apply_hp(hp);
            if let Some(token) = &hp.status
                && let Some(status) = MajorStatus::from_protocol(token)
                && !self.state.mon(r)?.has_status(status)
            {
                self.state.mon_mut(r)?.major_status.afflict(status)?;
            }
        }
        self.pending_start.push(r);
        Ok(1)
    }

    fn handle_move(&mut self, tail: &[Event]) -> Result<usize> {
        let Event::Move { mon, move_name, target, source, miss } = &tail[0] else {
            unreachable!("handle_move on a non-move event");
        };
        let user = self.state.resolve(mon)?;
        self.last_move_user = Some(user);

        if let Some(v) = &mut self.state.mon_mut(user)?.volatile {
            v.last_move = Some(move_name.clone());
        }
        match move_name.as_str() {
            "Baton Pass" => self.next_switch_kind[user.player.index()] = SwitchKind::BatonPass,
            "U-turn" => self.next_switch_kind[user.player.index()] = SwitchKind::SelfSwitch,
            _ => {}
        }

        let target_ref = target.as_ref().and_then(|t| self.state.resolve(t).ok());

        // forced repeats (locked moves) carry a [from] tag and cost no PP
        if source.is_none() && move_name != "Struggle" {
            let mut pp = 1;
            if let Some(t) = target_ref
                && t != user
                && self.state.mon(t)?.ability().definite() == Some("Pressure")
                && !self.state.mon(t)?.ability_suppressed()
            {
                pp = 2;
            }
            let id = self.state.mon(user)?.moveset();
            self.state.movesets.use_move(id, move_name, pp, &self.dex)?;
        }

        if *miss {
            return Ok(1);
        }
        let Some(tref) = target_ref else {
            return Ok(1);
        };
        if tref == user || !self.state.mon(tref)?.is_active() {
            return Ok(1);
        }

        let rest = &tail[1..];
        // a protected target or a type-level immunity leaves no outcome the
        // reaction races below could read
        match rest.first() {
            Some(Event::Activate { effect, .. }) if effect.contains("Protect") => {
                return Ok(1);
            }
            Some(Event::Miss { .. }) => return Ok(1),
            // sourceless immunity is plain type matchup, not an ability
            Some(Event::Immune { source: None, .. }) => return Ok(2),
            _ => {}
        }

        let Ok(data) = self.dex.move_data(move_name) else {
            return Ok(1);
        };
        let data = data.clone();

        let mut window = EventWindow::new(rest);
        let mut cx = InferenceContext {
            state: &mut self.state,
            dex: &self.dex,
        };

        if ability::on_block(&mut cx, &mut window, tref, &data)?.is_some() {
            return Ok(1 + window.mark());
        }

        // a direct hit is applied here so the reaction hooks see it landed
        if let Some(Event::Damage { mon: dmon, hp, source: None }) = window.peek()
            && cx.state.resolve(dmon).ok() == Some(tref)
        {
            cx.state.mon_mut(tref)?.apply_hp(hp);
            window.advance();

            let ko = hp.current == 0;
            if ko
                && let Some(Event::Faint(f)) = window.peek()
                && cx.state.resolve(f).ok() == Some(tref)
            {
                // take the faint now; lethal-contact reactions follow it
                cx.state.faint(tref)?;
                window.advance();
            }

            let trigger = match (data.contact, ko) {
                (true, true) => MoveQualifier::ContactKo,
                (true, false) => MoveQualifier::Contact,
                (false, _) => MoveQualifier::Damage,
            };
            ability::on_move_damage(&mut cx, &mut window, tref, user, trigger)?;

            if !ko {
                let drainish = match window.peek() {
                    Some(Event::Heal { mon: h, source: Some(s), .. }) => {
                        s.effect == "drain" && cx.state.resolve(h).ok() == Some(user)
                    }
                    Some(Event::Damage { source: Some(s), .. }) => {
                        s.is_ability("Liquid Ooze")
                    }
                    _ => false,
                };
                if drainish {
                    ability::on_move_drain(&mut cx, &mut window, tref, user)?;
                    if let Some(Event::Heal { mon: h, hp, source: Some(s) }) = window.peek()
                        && s.effect == "drain"
                        && cx.state.resolve(h).ok() == Some(user)
                    {
                        cx.state.mon_mut(user)?.apply_hp(hp);
                        window.advance();
                    }
                }
            }
        }

        Ok(1 + window.mark())
    }

    fn handle_status(&mut self, tail: &[Event]) -> Result<usize> {
        let Event::Status { mon, status, source } = &tail[0] else {
            unreachable!("handle_status on a non-status event");
        };
        let r = self.state.resolve(mon)?;
        let Some(afflicted) = MajorStatus::from_protocol(status) else {
            return Ok(1);
        };
        if let Some(s) = source {
            // Rest overwrites an existing status
            if s.effect == "move: Rest" {
                self.state.mon_mut(r)?.major_status.cure();
            }
            if let Some(name) = s.item() {
                self.state.mon_mut(r)?.reveal_item(name)?;
            } else if let Some(name) = s.ability()
                && let Some(of) = &s.of
                && let Ok(owner) = self.state.resolve(of)
            {
                self.state.reveal_ability(owner, name)?;
            }
        }
        self.state.mon_mut(r)?.major_status.afflict(afflicted)?;

        let causer = match source {
            None => self.last_move_user.filter(|u| u.player != r.player),
            Some(s) => s.of.as_ref().and_then(|o| self.state.resolve(o).ok()),
        };

        let mut window = EventWindow::new(&tail[1..]);
        let mut cx = self.cx();
        if let Some(causer) = causer
            && causer != r
        {
            ability::on_status(&mut cx, &mut window, r, afflicted, causer)?;
        }
        ability::on_update(&mut cx, &mut window, r)?;
        item::on_update(&mut cx, &mut window, r)?;
        Ok(1 + window.mark())
    }
}

/// One candidate in the joint end-of-turn race.
enum ResidualTask {
    Ability(ability::AbilityParser),
    Item(item::ItemParser),
    /// Pass-through for one mechanical residual event; true once spent.
    Background(bool),
}

fn is_background_residual(event: &Event) -> bool {
    matches!(
        event,
        Event::Damage { source: Some(s), .. } | Event::Heal { source: Some(s), .. }
            if s.ability().is_none() && s.item().is_none()
    )
}

impl EffectParser for ResidualTask {
    fn label(&self) -> String {
        match self {
            ResidualTask::Ability(p) => p.label(),
            ResidualTask::Item(p) => p.label(),
            ResidualTask::Background(_) => "mechanical residual".to_string(),
        }
    }

    fn offer(&mut self, cx: &mut InferenceContext<'_>, event: &Event) -> Result<Feed> {
        match self {
            ResidualTask::Ability(p) => p.offer(cx, event),
            ResidualTask::Item(p) => p.offer(cx, event),
            ResidualTask::Background(spent) => {
                if *spent || !is_background_residual(event) {
                    return Ok(Feed::Pass);
                }
                let (Event::Damage { mon, hp, .. } | Event::Heal { mon, hp, .. }) = event
                else {
                    return Ok(Feed::Pass);
                };
                if let Ok(r) = cx.state.resolve(mon) {
                    cx.state.mon_mut(r)?.apply_hp(hp);
                }
                *spent = true;
                Ok(Feed::Accept)
            }
        }
    }

    fn cancel(&mut self, cx: &mut InferenceContext<'_>) -> Result<()> {
        match self {
            ResidualTask::Ability(p) => p.cancel(cx),
            ResidualTask::Item(p) => p.cancel(cx),
            ResidualTask::Background(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::sample_dex;
    use zoroark_protocol::Player;

    fn p1() -> MonRef {
        MonRef { player: Player::P1, index: 0 }
    }

    fn p2() -> MonRef {
        MonRef { player: Player::P2, index: 0 }
    }

    fn tracked(log: &str) -> Tracker {
        let mut tracker = Tracker::new(sample_dex());
        tracker.track_log(log).unwrap();
        tracker
    }

    #[test]
    fn test_switch_in_races_and_quiet_entry_narrows() {
        let tracker = tracked(
            "|switch|p1a: Gyarados|Gyarados, L100|100/100\n\
             |switch|p2a: Hypno|Hypno, L100|100/100\n\
             |-ability|p1a: Gyarados|Intimidate\n\
             |-unboost|p2a: Hypno|atk|1\n\
             |turn|1",
        );
        assert_eq!(
            tracker.state.mon(p1()).unwrap().ability().definite(),
            Some("Intimidate")
        );
        // Forewarn stayed quiet, so Hypno must be Insomnia
        assert_eq!(
            tracker.state.mon(p2()).unwrap().ability().definite(),
            Some("Insomnia")
        );
        assert_eq!(
            tracker
                .state
                .mon(p2())
                .unwrap()
                .volatile
                .as_ref()
                .unwrap()
                .boosts
                .get(Stat::Atk),
            -1
        );
        assert_eq!(tracker.state.turn, 1);
    }

    #[test]
    fn test_move_use_reveals_and_deducts_pp() {
        let tracker = tracked(
            "|switch|p1a: Pikachu|Pikachu, L100|100/100\n\
             |switch|p2a: Machamp|Machamp, L100|100/100\n\
             |turn|1\n\
             |move|p1a: Pikachu|Thunderbolt|p2a: Machamp\n\
             |-damage|p2a: Machamp|60/100\n\
             |upkeep\n\
             |turn|2",
        );
        let id = tracker.state.mon(p1()).unwrap().moveset();
        let moves = tracker.state.movesets.moves(id);
        assert_eq!(moves["Thunderbolt"].pp, 14);
        assert_eq!(tracker.state.mon(p2()).unwrap().hp.current, 60);
    }

    #[test]
    fn test_status_block_eliminates_and_landing_afflicts() {
        // Thunder Wave bounces off an Immune line sourced to Limber
        let tracker = tracked(
            "|switch|p1a: Pikachu|Pikachu, L100|100/100\n\
             |switch|p2a: Ditto|Ditto, L100|100/100\n\
             |turn|1\n\
             |move|p1a: Pikachu|Thunder Wave|p2a: Ditto\n\
             |-immune|p2a: Ditto|[from] ability: Limber\n\
             |upkeep\n\
             |turn|2",
        );
        assert_eq!(
            tracker.state.mon(p2()).unwrap().ability().definite(),
            Some("Limber")
        );
        assert!(tracker.state.mon(p2()).unwrap().major_status.current().is_none());
    }

    #[test]
    fn test_residual_phase_weather_item_and_background() {
        let tracker = tracked(
            "|switch|p1a: Clefable|Clefable, L100|100/100\n\
             |switch|p2a: Machamp|Machamp, L100|100/100\n\
             |turn|1\n\
             |move|p2a: Machamp|Tackle|p1a: Clefable\n\
             |-damage|p1a: Clefable|80/100\n\
             |-weather|Sandstorm|[upkeep]\n\
             |-damage|p2a: Machamp|94/100|[from] Sandstorm\n\
             |-heal|p1a: Clefable|86/100|[from] item: Leftovers\n\
             |upkeep\n\
             |turn|2",
        );
        // no chip damage on Clefable: Magic Guard is the only explanation
        assert_eq!(
            tracker.state.mon(p1()).unwrap().ability().definite(),
            Some("Magic Guard")
        );
        let clefable = tracker.state.mon(p1()).unwrap();
        assert_eq!(clefable.item.definite(), Some("Leftovers"));
        assert_eq!(clefable.hp.current, 86);
        // Machamp healed nothing, so it holds no residual-heal item
        let machamp = tracker.state.mon(p2()).unwrap();
        assert_eq!(machamp.hp.current, 94);
        assert!(!machamp.item.contains("Leftovers"));
        assert!(!machamp.item.contains("Black Sludge"));
    }

    #[test]
    fn test_synchronize_reflects_status() {
        let tracker = tracked(
            "|switch|p1a: Gardevoir|Gardevoir, L100|100/100\n\
             |switch|p2a: Hypno|Hypno, L100|100/100\n\
             |turn|1\n\
             |move|p2a: Hypno|Toxic|p1a: Gardevoir\n\
             |-status|p1a: Gardevoir|tox\n\
             |-status|p2a: Hypno|tox|[from] ability: Synchronize|[of] p1a: Gardevoir\n\
             |-damage|p1a: Gardevoir|94/100|[from] psn\n\
             |-damage|p2a: Hypno|94/100|[from] psn\n\
             |upkeep\n\
             |turn|2",
        );
        assert_eq!(
            tracker.state.mon(p1()).unwrap().ability().definite(),
            Some("Synchronize")
        );
        assert!(tracker.state.mon(p1()).unwrap().has_status(MajorStatus::Toxic));
        assert!(tracker.state.mon(p2()).unwrap().has_status(MajorStatus::Toxic));
        // toxic counters advanced at end of turn
        assert_eq!(tracker.state.mon(p1()).unwrap().major_status.tox_counter(), 2);
        assert_eq!(tracker.state.mon(p1()).unwrap().hp.current, 94);
    }

    #[test]
    fn test_berry_eat_races_after_status() {
        let tracker = tracked(
            "|switch|p1a: Pikachu|Pikachu, L100|100/100\n\
             |switch|p2a: Machamp|Machamp, L100|100/100\n\
             |turn|1\n\
             |move|p1a: Pikachu|Thunder Wave|p2a: Machamp\n\
             |-status|p2a: Machamp|par\n\
             |-enditem|p2a: Machamp|Cheri Berry|[eat]\n\
             |-curestatus|p2a: Machamp|par|[msg]\n\
             |upkeep\n\
             |turn|2",
        );
        let machamp = tracker.state.mon(p2()).unwrap();
        assert_eq!(machamp.item.definite(), Some("Cheri Berry"));
        assert!(machamp.item_consumed);
        assert!(machamp.major_status.current().is_none());
    }

    #[test]
    fn test_baton_pass_carries_boosts_to_replacement() {
        let tracker = tracked(
            "|switch|p1a: Zapdos|Zapdos, L100|100/100\n\
             |switch|p2a: Machamp|Machamp, L100|100/100\n\
             |-ability|p1a: Zapdos|Pressure\n\
             |turn|1\n\
             |-boost|p1a: Zapdos|spe|1\n\
             |move|p1a: Zapdos|Baton Pass|p1a: Zapdos\n\
             |switch|p1a: Jolteon|Jolteon, L100|100/100\n\
             |upkeep\n\
             |turn|2",
        );
        let jolteon = tracker.state.team(Player::P1).active().unwrap();
        assert_eq!(jolteon.volatile.as_ref().unwrap().boosts.get(Stat::Spe), 1);
        // the pass consumed a slot of Zapdos's set and cost PP
        let zapdos = tracker.state.mon(p1()).unwrap();
        assert_eq!(
            tracker.state.movesets.moves(zapdos.base_moveset())["Baton Pass"].pp,
            39
        );
    }

    #[test]
    fn test_trace_resolved_mid_battle() {
        let tracker = tracked(
            "|switch|p1a: Gardevoir|Gardevoir, L100|100/100\n\
             |switch|p2a: Machamp|Machamp, L100|100/100\n\
             |-ability|p1a: Gardevoir|Guts|[from] ability: Trace|[of] p2a: Machamp\n\
             |turn|1",
        );
        let gardevoir = tracker.state.mon(p1()).unwrap();
        assert_eq!(gardevoir.base_ability().definite(), Some("Trace"));
        assert_eq!(gardevoir.ability().definite(), Some("Guts"));
        assert_eq!(
            tracker.state.mon(p2()).unwrap().ability().definite(),
            Some("Guts")
        );
    }

    #[test]
    fn test_sleep_clause_counter_ticks_on_cant() {
        let mut tracker = Tracker::new(sample_dex());
        tracker
            .track_log(
                "|switch|p1a: Hypno|Hypno, L100|100/100\n\
                 |switch|p2a: Machamp|Machamp, L100|100/100\n\
                 |turn|1\n\
                 |move|p1a: Hypno|Hypnosis|p2a: Machamp\n\
                 |-status|p2a: Machamp|slp\n\
                 |upkeep\n\
                 |turn|2\n\
                 |cant|p2a: Machamp|slp\n\
                 |upkeep\n\
                 |turn|3\n\
                 |cant|p2a: Machamp|slp\n\
                 |upkeep\n\
                 |turn|4\n\
                 |cant|p2a: Machamp|slp",
            )
            .unwrap();
        // a fourth failed wake-up would overflow the gen 4 sleep bound
        let err = tracker.track_log("|cant|p2a: Machamp|slp").unwrap_err();
        assert!(matches!(err, InferenceError::StatusOverflow { .. }));
    }

    #[test]
    fn test_faint_and_win_end_tracking() {
        let tracker = tracked(
            "|switch|p1a: Pikachu|Pikachu, L100|100/100\n\
             |switch|p2a: Machamp|Machamp, L100|100/100\n\
             |turn|1\n\
             |move|p2a: Machamp|Earthquake|p1a: Pikachu\n\
             |-damage|p1a: Pikachu|0 fnt\n\
             |faint|p1a: Pikachu\n\
             |win|trainer",
        );
        assert!(tracker.state.mon(p1()).unwrap().fainted);
        assert!(tracker.state.team(Player::P1).active.is_none());
        assert!(tracker.ended);
    }

    #[test]
    fn test_transform_links_and_later_reveal_propagates() {
        let tracker = tracked(
            "|switch|p1a: Ditto|Ditto, L100|100/100\n\
             |switch|p2a: Hypno|Hypno, L100|100/100\n\
             |turn|1\n\
             |move|p1a: Ditto|Transform|p2a: Hypno\n\
             |-transform|p1a: Ditto|Hypno\n\
             |upkeep\n\
             |turn|2\n\
             |move|p1a: Ditto|Psychic|p2a: Hypno\n\
             |-damage|p2a: Hypno|70/100",
        );
        // the copied moveset learns moves the copy uses, and the PP cap holds
        let user_set = tracker.state.mon(p1()).unwrap().moveset();
        let target_set = tracker.state.mon(p2()).unwrap().moveset();
        assert!(tracker.state.movesets.contains(user_set, "Psychic"));
        assert!(tracker.state.movesets.contains(target_set, "Psychic"));
        assert_eq!(tracker.state.movesets.moves(user_set)["Psychic"].pp, 4);
    }

    #[test]
    fn test_unboost_through_disproves_protection() {
        // Tentacruel's attack drops: Clear Body cannot be its ability
        let tracker = tracked(
            "|switch|p1a: Gyarados|Gyarados, L100|100/100\n\
             |switch|p2a: Tentacruel|Tentacruel, L100|100/100\n\
             |-ability|p1a: Gyarados|Intimidate\n\
             |-unboost|p2a: Tentacruel|atk|1\n\
             |turn|1",
        );
        assert_eq!(
            tracker.state.mon(p2()).unwrap().ability().definite(),
            Some("Liquid Ooze")
        );
    }
}
