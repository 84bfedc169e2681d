use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A numbered game generation (1 = Red/Blue/Yellow).
///
/// Generations are totally ordered; the most recent one is resolved once per
/// run from the canonical source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(u32);

impl Generation {
    /// Wrap a raw generation number.
    pub const fn new(number: u32) -> Self {
        Self(number)
    }

    /// The raw generation number.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The following generation.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Directory name used for this generation's snapshot (`gen-3`).
    pub fn dir_name(self) -> String {
        format!("gen-{}", self.0)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Generation {
    fn from(number: u32) -> Self {
        Self(number)
    }
}

/// Kinds of resources read from the canonical source.
///
/// The first four are collectable categories; the rest are only fetched while
/// assembling a collectable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Abilities
    Ability,
    /// Held and bag items
    Item,
    /// Moves
    Move,
    /// Species, written out as their default pokemon
    Species,
    /// A concrete pokemon (variety of a species)
    Pokemon,
    /// Alternate appearance of a pokemon
    PokemonForm,
    /// Generation metadata
    Generation,
    /// Group of game versions sharing data
    VersionGroup,
    /// Evolution chain of a species family
    EvolutionChain,
    /// TM/HM record
    Machine,
}

impl ResourceKind {
    /// Categories that can be requested for collection.
    pub const COLLECTABLE: [Self; 4] = [Self::Ability, Self::Item, Self::Move, Self::Species];

    /// Path segment of this kind's endpoint under the API base URL.
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::Ability => "ability",
            Self::Item => "item",
            Self::Move => "move",
            Self::Species => "pokemon-species",
            Self::Pokemon => "pokemon",
            Self::PokemonForm => "pokemon-form",
            Self::Generation => "generation",
            Self::VersionGroup => "version-group",
            Self::EvolutionChain => "evolution-chain",
            Self::Machine => "machine",
        }
    }

    /// Short name used on the command line and in reports.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ability => "ability",
            Self::Item => "item",
            Self::Move => "move",
            Self::Species => "species",
            Self::Pokemon => "pokemon",
            Self::PokemonForm => "pokemon-form",
            Self::Generation => "generation",
            Self::VersionGroup => "version-group",
            Self::EvolutionChain => "evolution-chain",
            Self::Machine => "machine",
        }
    }

    /// Output directory for a collectable kind inside a generation snapshot.
    pub const fn output_dir(self) -> &'static str {
        match self {
            Self::Species => "pokemon",
            other => other.as_str(),
        }
    }

    /// Key under which the generation endpoint lists resources of this kind.
    ///
    /// Items are not listed per generation and return `None`.
    pub const fn generation_listing_key(self) -> Option<&'static str> {
        match self {
            Self::Ability => Some("abilities"),
            Self::Move => Some("moves"),
            Self::Species => Some("pokemon_species"),
            _ => None,
        }
    }

    /// Whether this kind can be requested for collection.
    pub const fn is_collectable(self) -> bool {
        matches!(self, Self::Ability | Self::Item | Self::Move | Self::Species)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ability" | "abilities" => Ok(Self::Ability),
            "item" | "items" => Ok(Self::Item),
            "move" | "moves" => Ok(Self::Move),
            "species" | "pokemon" => Ok(Self::Species),
            other => Err(format!(
                "unknown category '{other}' (expected one of: ability, item, move, species)"
            )),
        }
    }
}

/// Identifies one entity of the canonical source.
///
/// Ordering is by kind, then numeric id. `name` is the join key with
/// change-log records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    /// Category of the entity
    pub kind: ResourceKind,
    /// Numeric id assigned by the canonical source
    pub id: u32,
    /// Canonical slug (`pikachu`, `thunder-shock`)
    pub name: String,
}

impl ResourceId {
    /// Create a new identifier.
    pub fn new(kind: ResourceKind, id: u32, name: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.kind, self.name, self.id)
    }
}

/// One row of a category summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// Numeric id
    pub id: u32,
    /// Entity name
    pub name: String,
    /// Relative path of the entity document inside the generation snapshot
    pub pointer: String,
    /// Default sprite URL, for items and species
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprite: Option<String>,
}
