//! Battle log event parsing
//!
//! One parse function per message kind, dispatched from [`parse_event`].
//! Events the inference layer never looks at (chat, timers, ratings) parse
//! to `None` rather than erroring, since the stream interleaves them freely.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::types::{parse_hp, parse_mon, HpStatus, MonIdent, PokemonDetails, Stat};

/// `[from] EFFECT` annotation with optional `[of] MON` causer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectSource {
    /// Effect string, e.g. "ability: Static", "item: Leftovers", "move: Wrap"
    pub effect: String,
    /// The pokemon the effect belongs to, when different from the subject
    pub of: Option<MonIdent>,
}

impl EffectSource {
    /// Scan trailing message parts for `[from]`/`[of]` tags
    pub fn scan(parts: &[&str]) -> Option<Self> {
        let effect = parts
            .iter()
            .find_map(|p| p.strip_prefix("[from] ").or_else(|| p.strip_prefix("[from]")))?
            .trim()
            .to_string();
        let of = parts
            .iter()
            .find_map(|p| p.strip_prefix("[of] "))
            .and_then(MonIdent::parse);

        Some(EffectSource { effect, of })
    }

    /// The ability name if this is an "ability: X" source
    pub fn ability(&self) -> Option<&str> {
        self.effect.strip_prefix("ability: ")
    }

    /// The item name if this is an "item: X" source
    pub fn item(&self) -> Option<&str> {
        self.effect.strip_prefix("item: ")
    }

    /// The move name if this is a "move: X" source
    pub fn move_name(&self) -> Option<&str> {
        self.effect.strip_prefix("move: ")
    }

    pub fn is_ability(&self, name: &str) -> bool {
        self.ability() == Some(name)
    }

    pub fn is_item(&self, name: &str) -> bool {
        self.item() == Some(name)
    }
}

/// A typed battle log event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // === Turn structure ===
    Turn(u32),
    Upkeep,

    // === Major actions ===
    Move {
        mon: MonIdent,
        move_name: String,
        target: Option<MonIdent>,
        source: Option<EffectSource>,
        miss: bool,
    },
    Switch {
        mon: MonIdent,
        details: PokemonDetails,
        hp: Option<HpStatus>,
    },
    Drag {
        mon: MonIdent,
        details: PokemonDetails,
        hp: Option<HpStatus>,
    },
    Faint(MonIdent),
    Cant {
        mon: MonIdent,
        reason: String,
        move_name: Option<String>,
    },

    // === Abilities and items ===
    Ability {
        mon: MonIdent,
        ability: String,
        source: Option<EffectSource>,
    },
    EndAbility(MonIdent),
    Item {
        mon: MonIdent,
        item: String,
        source: Option<EffectSource>,
    },
    EndItem {
        mon: MonIdent,
        item: String,
        source: Option<EffectSource>,
        eat: bool,
    },

    // === Status ===
    Status {
        mon: MonIdent,
        status: String,
        source: Option<EffectSource>,
    },
    CureStatus {
        mon: MonIdent,
        status: String,
        source: Option<EffectSource>,
    },
    CureTeam(MonIdent),

    // === HP changes ===
    Damage {
        mon: MonIdent,
        hp: HpStatus,
        source: Option<EffectSource>,
    },
    Heal {
        mon: MonIdent,
        hp: HpStatus,
        source: Option<EffectSource>,
    },
    SetHp {
        mon: MonIdent,
        hp: HpStatus,
    },

    // === Boosts ===
    Boost {
        mon: MonIdent,
        stat: Stat,
        amount: i8,
        source: Option<EffectSource>,
    },
    Unboost {
        mon: MonIdent,
        stat: Stat,
        amount: i8,
        source: Option<EffectSource>,
    },
    SetBoost {
        mon: MonIdent,
        stat: Stat,
        amount: i8,
    },
    ClearBoost(MonIdent),

    // === Move outcomes ===
    Fail {
        mon: MonIdent,
        action: Option<String>,
        source: Option<EffectSource>,
    },
    Immune {
        mon: MonIdent,
        source: Option<EffectSource>,
    },
    Block {
        mon: MonIdent,
        effect: String,
        move_name: Option<String>,
        attacker: Option<MonIdent>,
    },
    Miss {
        mon: MonIdent,
        target: Option<MonIdent>,
    },

    // === Field ===
    Weather {
        weather: String,
        upkeep: bool,
        source: Option<EffectSource>,
    },
    FieldStart {
        condition: String,
        source: Option<EffectSource>,
    },
    FieldEnd {
        condition: String,
    },

    // === Volatiles and misc ===
    VolatileStart {
        mon: MonIdent,
        effect: String,
        extra: Option<String>,
        source: Option<EffectSource>,
    },
    VolatileEnd {
        mon: MonIdent,
        effect: String,
        source: Option<EffectSource>,
    },
    SingleTurn {
        mon: MonIdent,
        effect: String,
    },
    SingleMove {
        mon: MonIdent,
        effect: String,
    },
    Activate {
        mon: Option<MonIdent>,
        effect: String,
        extra: Vec<String>,
        source: Option<EffectSource>,
    },
    Prepare {
        mon: MonIdent,
        move_name: String,
        target: Option<MonIdent>,
    },
    MustRecharge(MonIdent),
    Transform {
        mon: MonIdent,
        species: String,
        source: Option<EffectSource>,
    },

    // === Battle end ===
    Win(String),
    Tie,
}

/// Parse a single battle log line into an [`Event`].
///
/// Returns `Ok(None)` for lines that are not battle events.
pub fn parse_event(line: &str) -> Result<Option<Event>> {
    let line = line.trim();
    if !line.starts_with('|') {
        return Ok(None);
    }

    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < 2 {
        return Ok(None);
    }

    let event = match parts[1] {
        "turn" => Some(parse_turn(&parts)?),
        "upkeep" => Some(Event::Upkeep),
        "move" => Some(parse_move(&parts)?),
        "switch" => Some(parse_switch(&parts, false)?),
        "drag" => Some(parse_switch(&parts, true)?),
        "faint" => Some(Event::Faint(parse_mon(&parts, 2)?)),
        "cant" => Some(parse_cant(&parts)?),
        "-ability" => Some(parse_ability(&parts)?),
        "-endability" => Some(Event::EndAbility(parse_mon(&parts, 2)?)),
        "-item" => Some(parse_item(&parts)?),
        "-enditem" => Some(parse_enditem(&parts)?),
        "-status" => Some(parse_status(&parts)?),
        "-curestatus" => Some(parse_curestatus(&parts)?),
        "-cureteam" => Some(Event::CureTeam(parse_mon(&parts, 2)?)),
        "-damage" => Some(parse_damage(&parts)?),
        "-heal" => Some(parse_heal(&parts)?),
        "-sethp" => Some(parse_sethp(&parts)?),
        "-boost" => Some(parse_boost(&parts, false)?),
        "-unboost" => Some(parse_boost(&parts, true)?),
        "-setboost" => Some(parse_setboost(&parts)?),
        "-clearboost" => Some(Event::ClearBoost(parse_mon(&parts, 2)?)),
        "-fail" => Some(parse_fail(&parts)?),
        "-immune" => Some(parse_immune(&parts)?),
        "-block" => Some(parse_block(&parts)?),
        "-miss" => Some(parse_miss(&parts)?),
        "-weather" => Some(parse_weather(&parts)?),
        "-fieldstart" => Some(parse_fieldstart(&parts)?),
        "-fieldend" => Some(Event::FieldEnd {
            condition: parts.get(2).unwrap_or(&"").to_string(),
        }),
        "-start" => Some(parse_start(&parts)?),
        "-end" => Some(parse_end(&parts)?),
        "-singleturn" => Some(parse_singleturn(&parts)?),
        "-singlemove" => Some(parse_singlemove(&parts)?),
        "-activate" => Some(parse_activate(&parts)?),
        "-prepare" => Some(parse_prepare(&parts)?),
        "-mustrecharge" => Some(Event::MustRecharge(parse_mon(&parts, 2)?)),
        "-transform" => Some(parse_transform(&parts)?),
        "win" => Some(Event::Win(parts.get(2).unwrap_or(&"").to_string())),
        "tie" => Some(Event::Tie),
        _ => None,
    };

    Ok(event)
}

/// Parse a multi-line battle log chunk, skipping non-event lines
pub fn parse_event_log(log: &str) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    for line in log.lines() {
        if let Some(event) = parse_event(line)? {
            events.push(event);
        }
    }
    Ok(events)
}

/// Parse |turn|NUM
fn parse_turn(parts: &[&str]) -> Result<Event> {
    let turn = parts
        .get(2)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| anyhow::anyhow!("Missing turn number"))?;
    Ok(Event::Turn(turn))
}

/// Parse |move|POKEMON|MOVE|TARGET with optional [miss]/[from] tags
fn parse_move(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let move_name = parts.get(3).unwrap_or(&"").to_string();
    let target = parts.get(4).and_then(|s| MonIdent::parse(s));
    let miss = parts.iter().any(|p| *p == "[miss]");

    Ok(Event::Move {
        mon,
        move_name,
        target,
        source: EffectSource::scan(parts),
        miss,
    })
}

/// Parse |switch|POKEMON|DETAILS|HP STATUS or |drag|...
fn parse_switch(parts: &[&str], drag: bool) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let details = parts
        .get(3)
        .map(|s| PokemonDetails::parse(s))
        .unwrap_or_default();
    let hp = parse_hp(parts, 4);

    Ok(if drag {
        Event::Drag { mon, details, hp }
    } else {
        Event::Switch { mon, details, hp }
    })
}

/// Parse |cant|POKEMON|REASON|MOVE
fn parse_cant(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let reason = parts.get(3).unwrap_or(&"").to_string();
    let move_name = parts
        .get(4)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    Ok(Event::Cant {
        mon,
        reason,
        move_name,
    })
}

/// Parse |-ability|POKEMON|ABILITY with optional [from]EFFECT
fn parse_ability(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let ability = parts.get(3).unwrap_or(&"").to_string();

    Ok(Event::Ability {
        mon,
        ability,
        source: EffectSource::scan(parts),
    })
}

/// Parse |-item|POKEMON|ITEM with optional [from]EFFECT
fn parse_item(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let item = parts.get(3).unwrap_or(&"").to_string();

    Ok(Event::Item {
        mon,
        item,
        source: EffectSource::scan(parts),
    })
}

/// Parse |-enditem|POKEMON|ITEM with optional [from]EFFECT or [eat]
fn parse_enditem(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let item = parts.get(3).unwrap_or(&"").to_string();
    let eat = parts.iter().any(|p| *p == "[eat]");

    Ok(Event::EndItem {
        mon,
        item,
        source: EffectSource::scan(parts),
        eat,
    })
}

/// Parse |-status|POKEMON|STATUS
fn parse_status(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let status = parts.get(3).unwrap_or(&"").to_string();

    Ok(Event::Status {
        mon,
        status,
        source: EffectSource::scan(parts),
    })
}

/// Parse |-curestatus|POKEMON|STATUS
fn parse_curestatus(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let status = parts.get(3).unwrap_or(&"").to_string();

    Ok(Event::CureStatus {
        mon,
        status,
        source: EffectSource::scan(parts),
    })
}

/// Parse |-damage|POKEMON|HP STATUS
fn parse_damage(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let hp = parse_hp(parts, 3).ok_or_else(|| anyhow::anyhow!("Missing hp status"))?;

    Ok(Event::Damage {
        mon,
        hp,
        source: EffectSource::scan(parts),
    })
}

/// Parse |-heal|POKEMON|HP STATUS
fn parse_heal(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let hp = parse_hp(parts, 3).ok_or_else(|| anyhow::anyhow!("Missing hp status"))?;

    Ok(Event::Heal {
        mon,
        hp,
        source: EffectSource::scan(parts),
    })
}

/// Parse |-sethp|POKEMON|HP
fn parse_sethp(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let hp = parse_hp(parts, 3).ok_or_else(|| anyhow::anyhow!("Missing hp status"))?;

    Ok(Event::SetHp { mon, hp })
}

/// Parse |-boost|POKEMON|STAT|AMOUNT or |-unboost|...
fn parse_boost(parts: &[&str], unboost: bool) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let stat = parts
        .get(3)
        .and_then(|s| Stat::parse(s))
        .ok_or_else(|| anyhow::anyhow!("Missing stat"))?;
    let amount = parts
        .get(4)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| anyhow::anyhow!("Missing amount"))?;
    let source = EffectSource::scan(parts);

    Ok(if unboost {
        Event::Unboost {
            mon,
            stat,
            amount,
            source,
        }
    } else {
        Event::Boost {
            mon,
            stat,
            amount,
            source,
        }
    })
}

/// Parse |-setboost|POKEMON|STAT|AMOUNT
fn parse_setboost(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let stat = parts
        .get(3)
        .and_then(|s| Stat::parse(s))
        .ok_or_else(|| anyhow::anyhow!("Missing stat"))?;
    let amount = parts
        .get(4)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| anyhow::anyhow!("Missing amount"))?;

    Ok(Event::SetBoost { mon, stat, amount })
}

/// Parse |-fail|POKEMON|ACTION
fn parse_fail(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let action = parts
        .get(3)
        .filter(|s| !s.starts_with('[') && !s.is_empty())
        .map(|s| s.to_string());

    Ok(Event::Fail {
        mon,
        action,
        source: EffectSource::scan(parts),
    })
}

/// Parse |-immune|POKEMON
fn parse_immune(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    Ok(Event::Immune {
        mon,
        source: EffectSource::scan(parts),
    })
}

/// Parse |-block|POKEMON|EFFECT|MOVE|ATTACKER
fn parse_block(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let effect = parts.get(3).unwrap_or(&"").to_string();
    let move_name = parts
        .get(4)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());
    let attacker = parts.get(5).and_then(|s| MonIdent::parse(s));

    Ok(Event::Block {
        mon,
        effect,
        move_name,
        attacker,
    })
}

/// Parse |-miss|SOURCE|TARGET
fn parse_miss(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let target = parts.get(3).and_then(|s| MonIdent::parse(s));

    Ok(Event::Miss { mon, target })
}

/// Parse |-weather|WEATHER with optional [upkeep]/[from] tags
fn parse_weather(parts: &[&str]) -> Result<Event> {
    let weather = parts.get(2).unwrap_or(&"none").to_string();
    let upkeep = parts.iter().any(|p| *p == "[upkeep]");

    Ok(Event::Weather {
        weather,
        upkeep,
        source: EffectSource::scan(parts),
    })
}

/// Parse |-fieldstart|CONDITION
fn parse_fieldstart(parts: &[&str]) -> Result<Event> {
    let condition = parts.get(2).unwrap_or(&"").to_string();
    Ok(Event::FieldStart {
        condition,
        source: EffectSource::scan(parts),
    })
}

/// Parse |-start|POKEMON|EFFECT|EXTRA
fn parse_start(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let effect = parts.get(3).unwrap_or(&"").to_string();
    let extra = parts
        .get(4)
        .filter(|s| !s.starts_with('[') && !s.is_empty())
        .map(|s| s.to_string());

    Ok(Event::VolatileStart {
        mon,
        effect,
        extra,
        source: EffectSource::scan(parts),
    })
}

/// Parse |-end|POKEMON|EFFECT
fn parse_end(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let effect = parts.get(3).unwrap_or(&"").to_string();

    Ok(Event::VolatileEnd {
        mon,
        effect,
        source: EffectSource::scan(parts),
    })
}

/// Parse |-singleturn|POKEMON|MOVE
fn parse_singleturn(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let effect = parts.get(3).unwrap_or(&"").to_string();
    Ok(Event::SingleTurn { mon, effect })
}

/// Parse |-singlemove|POKEMON|MOVE
fn parse_singlemove(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let effect = parts.get(3).unwrap_or(&"").to_string();
    Ok(Event::SingleMove { mon, effect })
}

/// Parse |-activate|POKEMON|EFFECT|EXTRA... (pokemon is optional)
fn parse_activate(parts: &[&str]) -> Result<Event> {
    let mon = parts.get(2).and_then(|s| MonIdent::parse(s));
    let effect_idx = if mon.is_some() { 3 } else { 2 };
    let effect = parts.get(effect_idx).unwrap_or(&"").to_string();
    let extra: Vec<String> = parts
        .iter()
        .skip(effect_idx + 1)
        .filter(|s| !s.starts_with('['))
        .map(|s| s.to_string())
        .collect();

    Ok(Event::Activate {
        mon,
        effect,
        extra,
        source: EffectSource::scan(parts),
    })
}

/// Parse |-prepare|ATTACKER|MOVE|DEFENDER
fn parse_prepare(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let move_name = parts.get(3).unwrap_or(&"").to_string();
    let target = parts.get(4).and_then(|s| MonIdent::parse(s));

    Ok(Event::Prepare {
        mon,
        move_name,
        target,
    })
}

/// Parse |-transform|POKEMON|SPECIES
fn parse_transform(parts: &[&str]) -> Result<Event> {
    let mon = parse_mon(parts, 2)?;
    let species = parts.get(3).unwrap_or(&"").to_string();

    Ok(Event::Transform {
        mon,
        species,
        source: EffectSource::scan(parts),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Player;

    #[test]
    fn test_parse_non_event_lines() {
        assert_eq!(parse_event("").unwrap(), None);
        assert_eq!(parse_event("|j|someuser").unwrap(), None);
        assert_eq!(parse_event("raw text").unwrap(), None);
    }

    #[test]
    fn test_parse_turn() {
        assert_eq!(parse_event("|turn|4").unwrap(), Some(Event::Turn(4)));
    }

    #[test]
    fn test_parse_status_with_source() {
        let event = parse_event("|-status|p2a: Machamp|par|[from] ability: Static|[of] p1a: Pikachu")
            .unwrap()
            .unwrap();

        let Event::Status {
            mon,
            status,
            source,
        } = event
        else {
            panic!("wrong variant");
        };
        assert_eq!(mon.player, Player::P2);
        assert_eq!(status, "par");

        let source = source.unwrap();
        assert!(source.is_ability("Static"));
        assert_eq!(source.of.as_ref().unwrap().name, "Pikachu");
    }

    #[test]
    fn test_parse_curestatus() {
        let event = parse_event("|-curestatus|p1a: Crobat|slp|[from] ability: Insomnia")
            .unwrap()
            .unwrap();

        let Event::CureStatus { status, source, .. } = event else {
            panic!("wrong variant");
        };
        assert_eq!(status, "slp");
        assert_eq!(source.unwrap().ability(), Some("Insomnia"));
    }

    #[test]
    fn test_parse_heal_with_item_source() {
        let event = parse_event("|-heal|p1a: Blissey|88/100|[from] item: Leftovers")
            .unwrap()
            .unwrap();

        let Event::Heal { hp, source, .. } = event else {
            panic!("wrong variant");
        };
        assert_eq!(hp.current, 88);
        assert!(source.unwrap().is_item("Leftovers"));
    }

    #[test]
    fn test_parse_unboost() {
        let event = parse_event("|-unboost|p2a: Salamence|atk|1")
            .unwrap()
            .unwrap();

        let Event::Unboost { stat, amount, .. } = event else {
            panic!("wrong variant");
        };
        assert_eq!(stat, Stat::Atk);
        assert_eq!(amount, 1);
    }

    #[test]
    fn test_parse_weather_upkeep() {
        let event = parse_event("|-weather|Sandstorm|[upkeep]").unwrap().unwrap();
        assert_eq!(
            event,
            Event::Weather {
                weather: "Sandstorm".to_string(),
                upkeep: true,
                source: None,
            }
        );
    }

    #[test]
    fn test_parse_switch() {
        let event = parse_event("|switch|p1a: Sparky|Pikachu, L50, M|100/100")
            .unwrap()
            .unwrap();

        let Event::Switch { mon, details, hp } = event else {
            panic!("wrong variant");
        };
        assert_eq!(mon.name, "Sparky");
        assert_eq!(details.species, "Pikachu");
        assert_eq!(hp.unwrap().max, Some(100));
    }

    #[test]
    fn test_parse_enditem_eat() {
        let event = parse_event("|-enditem|p1a: Zapdos|Lum Berry|[eat]")
            .unwrap()
            .unwrap();

        let Event::EndItem { item, eat, .. } = event else {
            panic!("wrong variant");
        };
        assert_eq!(item, "Lum Berry");
        assert!(eat);
    }

    #[test]
    fn test_parse_ability_traced() {
        let event =
            parse_event("|-ability|p1a: Gardevoir|Pressure|[from] ability: Trace|[of] p2a: Zapdos")
                .unwrap()
                .unwrap();

        let Event::Ability {
            ability, source, ..
        } = event
        else {
            panic!("wrong variant");
        };
        assert_eq!(ability, "Pressure");
        let source = source.unwrap();
        assert!(source.is_ability("Trace"));
        assert_eq!(source.of.as_ref().unwrap().player, Player::P2);
    }

    #[test]
    fn test_parse_cant() {
        let event = parse_event("|cant|p1a: Snorlax|slp").unwrap().unwrap();

        let Event::Cant { reason, move_name, .. } = event else {
            panic!("wrong variant");
        };
        assert_eq!(reason, "slp");
        assert_eq!(move_name, None);
    }

    #[test]
    fn test_parse_event_log() {
        let log = "|move|p1a: Pikachu|Thunderbolt|p2a: Gyarados\n\
                   |-immune|p2a: Gyarados|[from] ability: Volt Absorb\n\
                   |upkeep\n\
                   |turn|2";
        let events = parse_event_log(log).unwrap();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], Event::Move { .. }));
        assert!(matches!(events[3], Event::Turn(2)));
    }
}
