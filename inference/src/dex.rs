//! Game data lookup
//!
//! The [`Dex`] is a pure lookup table: species ability pools and movepools,
//! move metadata, and the inference-relevant effects of abilities and items.
//! It holds no battle state and is shared immutably by every hook.
//!
//! Ability behavior is a closed [`AbilityEffect`] enum rather than callbacks,
//! so each dispatcher can enumerate candidates with a plain `match` and the
//! compiler checks hook coverage when a new effect kind is added.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zoroark_protocol::Stat;

use crate::error::{InferenceError, Result};
use crate::state::counters::MajorStatus;

/// Pokemon type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Normal,
    Fire,
    Water,
    Electric,
    Grass,
    Ice,
    Fighting,
    Poison,
    Ground,
    Flying,
    Psychic,
    Bug,
    Rock,
    Ghost,
    Dragon,
    Dark,
    Steel,
}

/// Field weather.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WeatherKind {
    Sun,
    Rain,
    Sand,
    Hail,
}

impl WeatherKind {
    pub fn from_protocol(name: &str) -> Option<Self> {
        match name {
            "SunnyDay" => Some(WeatherKind::Sun),
            "RainDance" => Some(WeatherKind::Rain),
            "Sandstorm" => Some(WeatherKind::Sand),
            "Hail" => Some(WeatherKind::Hail),
            _ => None,
        }
    }

    pub fn as_protocol(&self) -> &'static str {
        match self {
            WeatherKind::Sun => "SunnyDay",
            WeatherKind::Rain => "RainDance",
            WeatherKind::Sand => "Sandstorm",
            WeatherKind::Hail => "Hail",
        }
    }

    /// Does this weather deal residual damage?
    pub fn damaging(&self) -> bool {
        matches!(self, WeatherKind::Sand | WeatherKind::Hail)
    }

    /// Types that take no residual damage from this weather.
    pub fn immune_types(&self) -> &'static [TypeKind] {
        match self {
            WeatherKind::Sand => &[TypeKind::Rock, TypeKind::Ground, TypeKind::Steel],
            WeatherKind::Hail => &[TypeKind::Ice],
            WeatherKind::Sun | WeatherKind::Rain => &[],
        }
    }
}

/// Which kind of move-damage trigger an effect responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveQualifier {
    /// Any damaging hit.
    Damage,
    /// A contact hit.
    Contact,
    /// A contact hit that knocked the holder out.
    ContactKo,
}

impl MoveQualifier {
    /// Contact effects that punish the attacker still fire when the hit was
    /// lethal, so a `Contact` effect also answers a `ContactKo` trigger.
    pub fn answers(&self, trigger: MoveQualifier) -> bool {
        *self == trigger || (*self == MoveQualifier::Contact && trigger == MoveQualifier::ContactKo)
    }
}

/// What a type-blocking ability does instead of letting the move land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockAction {
    /// Plain immunity (Levitate).
    Nothing,
    /// Heals the holder (Volt Absorb, Water Absorb).
    Heal,
    /// Boosts a stat (Motor Drive style).
    Boost { stat: Stat, amount: i8 },
    /// Starts a volatile condition (Flash Fire).
    StartVolatile,
}

/// What a contact-punishing effect does to the attacker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactAction {
    /// May inflict one of these statuses (Static, Flame Body).
    Status { statuses: Vec<MajorStatus> },
    /// Deals fixed-fraction damage (Rough Skin, Aftermath).
    Damage,
}

/// One inference-relevant behavior of an ability. An ability may carry
/// several. The variant determines which dispatcher considers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbilityEffect {
    /// Cures one of these statuses on switch-in (on-start).
    StartCureStatus { statuses: Vec<MajorStatus> },
    /// Announces itself on switch-in with an ability event (Pressure).
    Announce,
    /// Copies the foe's ability on switch-in (Trace).
    CopyFoeAbility,
    /// Reveals the foe's held item on switch-in (Frisk).
    RevealItem,
    /// Reveals one of the foe's moves on switch-in (Forewarn).
    WarnMove,
    /// Lowers a foe stat on switch-in (Intimidate).
    BoostFoes { stat: Stat, amount: i8 },
    /// Blocks moves of a type (on-block).
    BlockMoveType { typ: TypeKind, action: BlockAction },
    /// Blocks these status afflictions (on-block).
    BlockStatus { statuses: Vec<MajorStatus> },
    /// Prevents stat drops; `stats: None` means all stats (on-try-unboost).
    ProtectUnboost { stats: Option<Vec<Stat>> },
    /// Reflects one of these statuses onto the causer (on-status).
    SyncStatus { statuses: Vec<MajorStatus> },
    /// Punishes incoming hits (on-move-damage).
    ContactEffect {
        qualifier: MoveQualifier,
        action: ContactAction,
    },
    /// Changes the holder's type to the type of the hit taken (on-move-damage).
    TypeChange,
    /// Damages a foe draining HP from the holder (on-move-drain).
    InvertDrain,
    /// Takes no residual damage from this weather (on-weather).
    WeatherImmunity { weather: WeatherKind },
    /// Cures one of these statuses whenever present (on-update).
    UpdateCureStatus { statuses: Vec<MajorStatus> },
    /// Chance to cure one of these statuses at end of turn (on-residual).
    ResidualCure { statuses: Vec<MajorStatus> },
    /// Boosts a stat every turn (on-residual).
    ResidualBoost { stat: Stat, amount: i8 },
    /// Cures major status on switch-out (Natural Cure).
    CureOnSwitchOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityData {
    pub name: String,
    pub effects: Vec<AbilityEffect>,
}

/// One inference-relevant behavior of a held item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemEffect {
    /// Consumed to cure one of these statuses (Lum Berry, Cheri Berry).
    CureStatus { statuses: Vec<MajorStatus> },
    /// End-of-turn heal; `poison_only` items damage non-poison holders
    /// instead (Leftovers, Black Sludge).
    ResidualHeal { poison_only: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemData {
    pub name: String,
    pub effects: Vec<ItemEffect>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveData {
    pub name: String,
    pub max_pp: u32,
    pub typ: TypeKind,
    pub contact: bool,
    /// Major status this move can inflict, if any.
    pub inflicts: Option<MajorStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesData {
    pub name: String,
    pub types: Vec<TypeKind>,
    /// Abilities this species can legally have.
    pub abilities: Vec<String>,
    /// Moves this species can legally know.
    pub movepool: Vec<String>,
}

/// Immutable game data lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dex {
    species: BTreeMap<String, SpeciesData>,
    abilities: BTreeMap<String, AbilityData>,
    items: BTreeMap<String, ItemData>,
    moves: BTreeMap<String, MoveData>,
}

impl Dex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a dex from its JSON serialization.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn add_species(&mut self, data: SpeciesData) {
        self.species.insert(data.name.clone(), data);
    }

    pub fn add_ability(&mut self, data: AbilityData) {
        self.abilities.insert(data.name.clone(), data);
    }

    pub fn add_item(&mut self, data: ItemData) {
        self.items.insert(data.name.clone(), data);
    }

    pub fn add_move(&mut self, data: MoveData) {
        self.moves.insert(data.name.clone(), data);
    }

    pub fn species(&self, name: &str) -> Result<&SpeciesData> {
        self.species.get(name).ok_or(InferenceError::UnknownName {
            kind: "species",
            name: name.to_string(),
        })
    }

    pub fn ability(&self, name: &str) -> Result<&AbilityData> {
        self.abilities
            .get(name)
            .ok_or(InferenceError::UnknownName {
                kind: "ability",
                name: name.to_string(),
            })
    }

    pub fn item(&self, name: &str) -> Result<&ItemData> {
        self.items.get(name).ok_or(InferenceError::UnknownName {
            kind: "item",
            name: name.to_string(),
        })
    }

    pub fn move_data(&self, name: &str) -> Result<&MoveData> {
        self.moves.get(name).ok_or(InferenceError::UnknownName {
            kind: "move",
            name: name.to_string(),
        })
    }

    /// All item names, for seeding an unrevealed item's possibility set.
    pub fn item_names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }
}

/// A small gen-4-flavored dex covering the effects the engine infers over.
/// Real deployments load full data with [`Dex::from_json`].
pub fn sample_dex() -> Dex {
    use AbilityEffect::*;
    use MajorStatus::*;

    let mut dex = Dex::new();

    let moves = [
        ("Tackle", 35, TypeKind::Normal, true, None),
        ("Quick Attack", 30, TypeKind::Normal, true, None),
        ("Thunderbolt", 15, TypeKind::Electric, false, None),
        ("Thunder Wave", 20, TypeKind::Electric, false, Some(Paralysis)),
        ("Surf", 15, TypeKind::Water, false, None),
        ("Ice Beam", 10, TypeKind::Ice, false, None),
        ("Flamethrower", 15, TypeKind::Fire, false, None),
        ("Earthquake", 10, TypeKind::Ground, false, None),
        ("Crunch", 15, TypeKind::Dark, true, None),
        ("Giga Drain", 10, TypeKind::Grass, false, None),
        ("Splash", 40, TypeKind::Normal, false, None),
        ("Protect", 10, TypeKind::Normal, false, None),
        ("Substitute", 10, TypeKind::Normal, false, None),
        ("Baton Pass", 40, TypeKind::Normal, false, None),
        ("U-turn", 20, TypeKind::Bug, true, None),
        ("Mimic", 10, TypeKind::Normal, false, None),
        ("Transform", 10, TypeKind::Normal, false, None),
        ("Hypnosis", 20, TypeKind::Psychic, false, Some(Sleep)),
        ("Toxic", 10, TypeKind::Poison, false, Some(Toxic)),
        ("Will-O-Wisp", 15, TypeKind::Fire, false, Some(Burn)),
        ("Waterfall", 15, TypeKind::Water, true, None),
        ("Dragon Dance", 20, TypeKind::Dragon, false, None),
        ("Psychic", 10, TypeKind::Psychic, false, None),
        ("Shadow Ball", 15, TypeKind::Ghost, false, None),
        ("Rest", 10, TypeKind::Psychic, false, None),
        ("Sludge Bomb", 10, TypeKind::Poison, false, Some(Poison)),
    ];
    for (name, max_pp, typ, contact, inflicts) in moves {
        dex.add_move(MoveData {
            name: name.to_string(),
            max_pp,
            typ,
            contact,
            inflicts,
        });
    }

    let abilities: Vec<(&str, Vec<AbilityEffect>)> = vec![
        (
            "Static",
            vec![ContactEffect {
                qualifier: MoveQualifier::Contact,
                action: ContactAction::Status {
                    statuses: vec![Paralysis],
                },
            }],
        ),
        (
            "Flame Body",
            vec![ContactEffect {
                qualifier: MoveQualifier::Contact,
                action: ContactAction::Status {
                    statuses: vec![Burn],
                },
            }],
        ),
        (
            "Rough Skin",
            vec![ContactEffect {
                qualifier: MoveQualifier::Contact,
                action: ContactAction::Damage,
            }],
        ),
        (
            "Aftermath",
            vec![ContactEffect {
                qualifier: MoveQualifier::ContactKo,
                action: ContactAction::Damage,
            }],
        ),
        (
            "Intimidate",
            vec![BoostFoes {
                stat: Stat::Atk,
                amount: 1,
            }],
        ),
        ("Trace", vec![CopyFoeAbility]),
        ("Pressure", vec![Announce]),
        ("Mold Breaker", vec![Announce]),
        ("Frisk", vec![RevealItem]),
        ("Forewarn", vec![WarnMove]),
        (
            "Insomnia",
            vec![
                StartCureStatus {
                    statuses: vec![Sleep],
                },
                BlockStatus {
                    statuses: vec![Sleep],
                },
                UpdateCureStatus {
                    statuses: vec![Sleep],
                },
            ],
        ),
        (
            "Vital Spirit",
            vec![
                StartCureStatus {
                    statuses: vec![Sleep],
                },
                BlockStatus {
                    statuses: vec![Sleep],
                },
                UpdateCureStatus {
                    statuses: vec![Sleep],
                },
            ],
        ),
        (
            "Limber",
            vec![
                BlockStatus {
                    statuses: vec![Paralysis],
                },
                UpdateCureStatus {
                    statuses: vec![Paralysis],
                },
            ],
        ),
        (
            "Water Veil",
            vec![
                BlockStatus {
                    statuses: vec![Burn],
                },
                UpdateCureStatus {
                    statuses: vec![Burn],
                },
            ],
        ),
        (
            "Immunity",
            vec![
                BlockStatus {
                    statuses: vec![Poison, Toxic],
                },
                UpdateCureStatus {
                    statuses: vec![Poison, Toxic],
                },
            ],
        ),
        (
            "Synchronize",
            vec![SyncStatus {
                statuses: vec![Burn, Paralysis, Poison, Toxic],
            }],
        ),
        (
            "Volt Absorb",
            vec![BlockMoveType {
                typ: TypeKind::Electric,
                action: BlockAction::Heal,
            }],
        ),
        (
            "Water Absorb",
            vec![BlockMoveType {
                typ: TypeKind::Water,
                action: BlockAction::Heal,
            }],
        ),
        (
            "Flash Fire",
            vec![BlockMoveType {
                typ: TypeKind::Fire,
                action: BlockAction::StartVolatile,
            }],
        ),
        (
            "Levitate",
            vec![BlockMoveType {
                typ: TypeKind::Ground,
                action: BlockAction::Nothing,
            }],
        ),
        ("Clear Body", vec![ProtectUnboost { stats: None }]),
        (
            "Hyper Cutter",
            vec![ProtectUnboost {
                stats: Some(vec![Stat::Atk]),
            }],
        ),
        (
            "Keen Eye",
            vec![ProtectUnboost {
                stats: Some(vec![Stat::Accuracy]),
            }],
        ),
        ("Liquid Ooze", vec![InvertDrain]),
        ("Color Change", vec![TypeChange]),
        (
            "Shed Skin",
            vec![ResidualCure {
                statuses: vec![Burn, Paralysis, Sleep, Freeze, Poison, Toxic],
            }],
        ),
        (
            "Speed Boost",
            vec![ResidualBoost {
                stat: Stat::Spe,
                amount: 1,
            }],
        ),
        ("Natural Cure", vec![CureOnSwitchOut]),
        (
            "Magic Guard",
            vec![
                WeatherImmunity {
                    weather: WeatherKind::Sand,
                },
                WeatherImmunity {
                    weather: WeatherKind::Hail,
                },
            ],
        ),
        (
            "Ice Body",
            vec![WeatherImmunity {
                weather: WeatherKind::Hail,
            }],
        ),
        // abilities with no inference-visible behavior
        ("Inner Focus", vec![]),
        ("Serene Grace", vec![]),
        ("Swift Swim", vec![]),
        ("Chlorophyll", vec![]),
        ("Sand Veil", vec![]),
        ("Torrent", vec![]),
        ("Blaze", vec![]),
        ("Overgrow", vec![]),
        ("Cute Charm", vec![]),
        ("Hustle", vec![]),
        ("Sturdy", vec![]),
        ("Rock Head", vec![]),
        ("Thick Fat", vec![]),
        ("Own Tempo", vec![]),
    ];
    for (name, effects) in abilities {
        dex.add_ability(AbilityData {
            name: name.to_string(),
            effects,
        });
    }

    let items: Vec<(&str, Vec<ItemEffect>)> = vec![
        (
            "Leftovers",
            vec![ItemEffect::ResidualHeal { poison_only: false }],
        ),
        (
            "Black Sludge",
            vec![ItemEffect::ResidualHeal { poison_only: true }],
        ),
        (
            "Lum Berry",
            vec![ItemEffect::CureStatus {
                statuses: vec![Burn, Paralysis, Sleep, Freeze, Poison, Toxic],
            }],
        ),
        (
            "Cheri Berry",
            vec![ItemEffect::CureStatus {
                statuses: vec![Paralysis],
            }],
        ),
        (
            "Chesto Berry",
            vec![ItemEffect::CureStatus {
                statuses: vec![Sleep],
            }],
        ),
        ("Choice Band", vec![]),
        ("Choice Scarf", vec![]),
        ("Life Orb", vec![]),
        ("Focus Sash", vec![]),
        ("Expert Belt", vec![]),
    ];
    for (name, effects) in items {
        dex.add_item(ItemData {
            name: name.to_string(),
            effects,
        });
    }

    let species: Vec<(&str, Vec<TypeKind>, Vec<&str>, Vec<&str>)> = vec![
        (
            "Pikachu",
            vec![TypeKind::Electric],
            vec!["Static"],
            vec!["Thunderbolt", "Quick Attack", "Thunder Wave", "Substitute"],
        ),
        (
            "Gyarados",
            vec![TypeKind::Water, TypeKind::Flying],
            vec!["Intimidate"],
            vec!["Waterfall", "Dragon Dance", "Earthquake", "Ice Beam", "Taunt"],
        ),
        (
            "Gardevoir",
            vec![TypeKind::Psychic],
            vec!["Synchronize", "Trace"],
            vec!["Psychic", "Thunderbolt", "Will-O-Wisp", "Hypnosis"],
        ),
        (
            "Hypno",
            vec![TypeKind::Psychic],
            vec!["Insomnia", "Forewarn"],
            vec!["Psychic", "Hypnosis", "Protect", "Toxic"],
        ),
        (
            "Zapdos",
            vec![TypeKind::Electric, TypeKind::Flying],
            vec!["Pressure"],
            vec!["Thunderbolt", "Roost", "Substitute", "Baton Pass"],
        ),
        (
            "Blissey",
            vec![TypeKind::Normal],
            vec!["Natural Cure", "Serene Grace"],
            vec!["Protect", "Toxic", "Ice Beam", "Thunder Wave"],
        ),
        (
            "Jolteon",
            vec![TypeKind::Electric],
            vec!["Volt Absorb"],
            vec!["Thunderbolt", "Baton Pass", "Substitute", "Shadow Ball"],
        ),
        (
            "Weezing",
            vec![TypeKind::Poison],
            vec!["Levitate"],
            vec!["Sludge Bomb", "Will-O-Wisp", "Protect", "Rest"],
        ),
        (
            "Garchomp",
            vec![TypeKind::Dragon, TypeKind::Ground],
            vec!["Sand Veil"],
            vec!["Earthquake", "Crunch", "Substitute", "Protect"],
        ),
        (
            "Kecleon",
            vec![TypeKind::Normal],
            vec!["Color Change"],
            vec!["Shadow Ball", "Thunder Wave", "Protect", "Rest"],
        ),
        (
            "Yanmega",
            vec![TypeKind::Bug, TypeKind::Flying],
            vec!["Speed Boost", "Frisk"],
            vec!["U-turn", "Protect", "Giga Drain", "Shadow Ball"],
        ),
        (
            "Tentacruel",
            vec![TypeKind::Water, TypeKind::Poison],
            vec!["Clear Body", "Liquid Ooze"],
            vec!["Surf", "Sludge Bomb", "Toxic", "Protect", "Giga Drain"],
        ),
        (
            "Ditto",
            vec![TypeKind::Normal],
            vec!["Limber"],
            vec!["Transform"],
        ),
        (
            "Dragonite",
            vec![TypeKind::Dragon, TypeKind::Flying],
            vec!["Inner Focus"],
            vec!["Earthquake", "Ice Beam", "Thunderbolt", "Flamethrower", "Surf", "Protect"],
        ),
        (
            "Clefable",
            vec![TypeKind::Normal],
            vec!["Magic Guard", "Cute Charm"],
            vec!["Ice Beam", "Thunderbolt", "Protect", "Toxic"],
        ),
        (
            "Machamp",
            vec![TypeKind::Fighting],
            vec!["Guts", "No Guard"],
            vec!["Tackle", "Earthquake", "Protect", "Rest"],
        ),
    ];
    // referenced by species above but with no tracked behavior
    for name in ["Guts", "No Guard"] {
        dex.add_ability(AbilityData {
            name: name.to_string(),
            effects: vec![],
        });
    }
    dex.add_move(MoveData {
        name: "Taunt".to_string(),
        max_pp: 20,
        typ: TypeKind::Dark,
        contact: false,
        inflicts: None,
    });
    dex.add_move(MoveData {
        name: "Roost".to_string(),
        max_pp: 10,
        typ: TypeKind::Flying,
        contact: false,
        inflicts: None,
    });
    for (name, types, abilities, movepool) in species {
        dex.add_species(SpeciesData {
            name: name.to_string(),
            types,
            abilities: abilities.into_iter().map(str::to_string).collect(),
            movepool: movepool.into_iter().map(str::to_string).collect(),
        });
    }

    dex
}
