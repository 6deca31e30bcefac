// src/core/relation.rs
use crate::core::types::ResourceId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The eight compass predicates shared by text annotations and the knowledge base.
///
/// Serialized as the camelCase local name; deserialized from anything
/// [`Direction::from_predicate`] accepts, including full predicate URIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "String")]
pub enum Direction {
    North,
    NorthEast,
    NorthWest,
    South,
    SouthEast,
    SouthWest,
    East,
    West,
}

use Direction::*;

impl Direction {
    pub const ALL: [Direction; 8] = [North, NorthEast, NorthWest, South, SouthEast, SouthWest, East, West];

    pub fn opposite(self) -> Direction {
        match self {
            North => South,
            NorthEast => SouthWest,
            NorthWest => SouthEast,
            South => North,
            SouthEast => NorthWest,
            SouthWest => NorthEast,
            East => West,
            West => East,
        }
    }

    /// KB edge directions accepted along a path from the subject's candidate
    /// to the object's candidate when the text says `subject <self> object`.
    pub fn compatible_kb(self) -> &'static [Direction] {
        match self {
            North => &[South, SouthEast, SouthWest, East, West],
            NorthEast => &[South, SouthWest, West],
            NorthWest => &[South, SouthEast, East],
            South => &[North, NorthEast, NorthWest, East, West],
            SouthEast => &[North, NorthWest, West],
            SouthWest => &[North, NorthEast, East],
            East => &[North, NorthWest, SouthWest, West, South],
            West => &[North, NorthEast, SouthEast, East, South],
        }
    }

    /// Same check for a path walked from the object's candidate back to the subject's.
    pub fn compatible_kb_reversed(self) -> &'static [Direction] {
        self.opposite().compatible_kb()
    }

    /// Local name of the predicate, e.g. `north` or `northEast`.
    pub fn predicate_name(self) -> &'static str {
        match self {
            North => "north",
            NorthEast => "northEast",
            NorthWest => "northWest",
            South => "south",
            SouthEast => "southEast",
            SouthWest => "southWest",
            East => "east",
            West => "west",
        }
    }

    /// Parses a predicate URI or local name (`...#northEast`, `north_east`, `NE`).
    pub fn from_predicate(predicate: &str) -> Option<Direction> {
        let local = predicate.rsplit(['/', '#', ':']).next().unwrap_or(predicate);
        let key: String = local
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let key = key.strip_suffix("of").unwrap_or(&key);
        match key {
            "north" | "n" | "nord" => Some(North),
            "northeast" | "ne" | "nordest" => Some(NorthEast),
            "northwest" | "nw" | "nordouest" => Some(NorthWest),
            "south" | "s" | "sud" => Some(South),
            "southeast" | "se" | "sudest" => Some(SouthEast),
            "southwest" | "sw" | "sudouest" => Some(SouthWest),
            "east" | "e" | "est" => Some(East),
            "west" | "w" | "ouest" => Some(West),
            _ => None,
        }
    }
}

impl TryFrom<String> for Direction {
    type Error = String;

    fn try_from(predicate: String) -> Result<Self, Self::Error> {
        Direction::from_predicate(&predicate).ok_or_else(|| format!("unknown direction predicate `{predicate}`"))
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.predicate_name())
    }
}

/// Edge label of a mini-graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Relation {
    SameBag,
    SameRoute,
    SameSequence,
    Spatial(Direction),
}

impl Relation {
    pub fn is_spatial(self) -> bool {
        matches!(self, Relation::Spatial(_))
    }

    /// Structural relations are the ones derived from the text layout.
    pub fn is_structural(self) -> bool {
        !self.is_spatial()
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            Relation::Spatial(d) => Some(d),
            _ => None,
        }
    }
}

/// A directed spatial statement `subject <direction> object`, from the text or the KB.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpatialTriple {
    pub subject: ResourceId,
    pub direction: Direction,
    pub object: ResourceId,
}

impl SpatialTriple {
    pub fn new(subject: impl Into<ResourceId>, direction: Direction, object: impl Into<ResourceId>) -> Self {
        Self { subject: subject.into(), direction, object: object.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_is_an_involution() {
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite(), d);
            assert_ne!(d.opposite(), d);
        }
    }

    #[test]
    fn north_accepts_southern_and_lateral_edges() {
        let accepted = North.compatible_kb();
        assert!(accepted.contains(&South));
        assert!(accepted.contains(&East));
        assert!(!accepted.contains(&North));
        assert!(!accepted.contains(&NorthEast));
        assert_eq!(North.compatible_kb_reversed(), South.compatible_kb());
    }

    #[test]
    fn tables_never_accept_the_text_direction_itself() {
        for d in Direction::ALL {
            assert!(!d.compatible_kb().contains(&d));
        }
    }

    #[test]
    fn parses_predicate_spellings() {
        assert_eq!(Direction::from_predicate("http://example.org/rlsp#northEast"), Some(NorthEast));
        assert_eq!(Direction::from_predicate("south_west"), Some(SouthWest));
        assert_eq!(Direction::from_predicate("westOf"), Some(West));
        assert_eq!(Direction::from_predicate("NW"), Some(NorthWest));
        assert_eq!(Direction::from_predicate("http://fr.dbpedia.org/property/sudOuest"), Some(SouthWest));
        assert_eq!(Direction::from_predicate("near"), None);
    }

    #[test]
    fn triples_read_predicate_uris() {
        let json = r#"[
            {"subject": "http://doc/a", "direction": "http://example.org/rlsp#northEast", "object": "http://doc/b"},
            {"subject": "http://doc/b", "direction": "sudOuest", "object": "http://doc/c"}
        ]"#;
        let triples: Vec<SpatialTriple> = serde_json::from_str(json).unwrap();
        assert_eq!(triples[0].direction, NorthEast);
        assert_eq!(triples[1].direction, SouthWest);
        assert_eq!(serde_json::to_string(&SouthWest).unwrap(), "\"southWest\"");

        let unknown = serde_json::from_str::<Direction>("\"near\"").unwrap_err();
        assert!(unknown.to_string().contains("near"));
    }
}
