//! Synchronizable entity kinds and their dependency order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of entity kinds that participate in sync.
///
/// Each kind carries a dependency rank so that seeding and apply phases can
/// process referenced kinds before their dependents (a movement references
/// its category, muscles, and equipment; a muscle references its
/// descriptor and antagonists).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Free-form description attached to most other kinds.
    Descriptor,
    /// Grouping of movements (may reference a parent category).
    MovementCategory,
    /// A muscle, optionally linked to antagonist muscles.
    Muscle,
    /// A piece of training equipment.
    Equipment,
    /// A movement, referencing category, muscles, and equipment.
    Movement,
    /// Anything the wire names that this build does not know.
    Unidentified,
}

/// Entity kinds in dependency-safe processing order.
///
/// Referenced kinds come before their dependents; `Unidentified` is not a
/// member because it is never processed.
pub const SYNC_ORDER: [EntityKind; 5] = [
    EntityKind::Descriptor,
    EntityKind::MovementCategory,
    EntityKind::Muscle,
    EntityKind::Equipment,
    EntityKind::Movement,
];

impl EntityKind {
    /// Returns the dependency rank. Lower ranks are processed first;
    /// unknown kinds sort last.
    pub fn rank(&self) -> u32 {
        SYNC_ORDER
            .iter()
            .position(|k| k == self)
            .map(|i| i as u32)
            .unwrap_or(u32::MAX)
    }

    /// Returns the URL path segment used by the sync API routes.
    pub fn route_segment(&self) -> &'static str {
        match self {
            EntityKind::Descriptor => "descriptor",
            EntityKind::MovementCategory => "movement-category",
            EntityKind::Muscle => "muscle",
            EntityKind::Equipment => "equipment",
            EntityKind::Movement => "movement",
            EntityKind::Unidentified => "unidentified",
        }
    }

    /// Returns the canonical name used in outbox rows and logs.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Descriptor => "Descriptor",
            EntityKind::MovementCategory => "MovementCategory",
            EntityKind::Muscle => "Muscle",
            EntityKind::Equipment => "Equipment",
            EntityKind::Movement => "Movement",
            EntityKind::Unidentified => "Unidentified",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = std::convert::Infallible;

    /// Accepts both canonical names and route segments; anything else maps
    /// to `Unidentified` rather than failing, so an unknown wire name can
    /// be skipped instead of crashing a batch.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "Descriptor" | "descriptor" => EntityKind::Descriptor,
            "MovementCategory" | "movement-category" => EntityKind::MovementCategory,
            "Muscle" | "muscle" => EntityKind::Muscle,
            "Equipment" | "equipment" => EntityKind::Equipment,
            "Movement" | "movement" => EntityKind::Movement,
            _ => EntityKind::Unidentified,
        };
        Ok(kind)
    }
}
