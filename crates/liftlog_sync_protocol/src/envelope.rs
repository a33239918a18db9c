//! Per-entity sync envelopes.
//!
//! Each synchronizable kind has one immutable payload struct. The generic
//! engine only ever reads the handful of fields exposed by the [`Envelope`]
//! trait; everything else is consumed by that kind's processor.

use chrono::{DateTime, Utc};
use liftlog_domain::{Authority, BaseCategory, BodySection, EntityKind, StableId};
use serde::{Deserialize, Serialize};

/// The fields the generic sync machinery needs from any envelope.
pub trait Envelope {
    /// Stable identifier of the entity.
    fn stable_id(&self) -> StableId;
    /// Timestamp of the last mutation.
    fn updated_at(&self) -> DateTime<Utc>;
    /// Monotonic sequence breaking timestamp ties.
    fn updated_seq(&self) -> i64;
    /// Soft-delete marker.
    fn is_deleted(&self) -> bool;
    /// Ownership tag governing overwrites.
    fn authority(&self) -> Authority;
}

macro_rules! impl_envelope {
    ($ty:ty) => {
        impl Envelope for $ty {
            fn stable_id(&self) -> StableId {
                self.guid
            }
            fn updated_at(&self) -> DateTime<Utc> {
                self.updated_at_utc
            }
            fn updated_seq(&self) -> i64 {
                self.updated_seq
            }
            fn is_deleted(&self) -> bool {
                self.is_deleted
            }
            fn authority(&self) -> Authority {
                self.authority
            }
        }
    };
}

/// Drops nil ids and duplicates while preserving order; tombstoned owners
/// always get an empty set (a deleted muscle cannot remain anyone's
/// antagonist).
fn normalize_refs(ids: Option<&Vec<StableId>>, tombstoned: bool) -> Vec<StableId> {
    if tombstoned {
        return Vec::new();
    }
    let mut seen = Vec::new();
    for id in ids.into_iter().flatten() {
        if !id.is_nil() && !seen.contains(id) {
            seen.push(*id);
        }
    }
    seen
}

/// Sync payload for a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescriptorEnvelope {
    /// Stable identifier.
    pub guid: StableId,
    /// Free-form description text.
    pub content: String,
    /// Timestamp of last mutation.
    pub updated_at_utc: DateTime<Utc>,
    /// Monotonic write sequence.
    pub updated_seq: i64,
    /// Tombstone flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// Ownership tag.
    #[serde(default)]
    pub authority: Authority,
}

impl_envelope!(DescriptorEnvelope);

/// Sync payload for a piece of equipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EquipmentEnvelope {
    /// Stable identifier.
    pub guid: StableId,
    /// Display name.
    pub name: String,
    /// Optional descriptor reference.
    #[serde(default)]
    pub descriptor_guid: Option<StableId>,
    /// Timestamp of last mutation.
    pub updated_at_utc: DateTime<Utc>,
    /// Monotonic write sequence.
    pub updated_seq: i64,
    /// Tombstone flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// Ownership tag.
    #[serde(default)]
    pub authority: Authority,
}

impl_envelope!(EquipmentEnvelope);

/// Sync payload for a muscle, including its antagonist references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MuscleEnvelope {
    /// Stable identifier.
    pub guid: StableId,
    /// Display name.
    pub name: String,
    /// Optional descriptor reference.
    #[serde(default)]
    pub descriptor_guid: Option<StableId>,
    /// Body section classification.
    #[serde(default)]
    pub body_section: BodySection,
    /// Antagonist muscle references.
    #[serde(default)]
    pub antagonist_guids: Option<Vec<StableId>>,
    /// Timestamp of last mutation.
    pub updated_at_utc: DateTime<Utc>,
    /// Monotonic write sequence.
    pub updated_seq: i64,
    /// Tombstone flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// Ownership tag.
    #[serde(default)]
    pub authority: Authority,
}

impl_envelope!(MuscleEnvelope);

impl MuscleEnvelope {
    /// Desired antagonist set: deduped, nil-free, empty when tombstoned.
    pub fn desired_antagonists(&self) -> Vec<StableId> {
        normalize_refs(self.antagonist_guids.as_ref(), self.is_deleted)
    }
}

/// Sync payload for a movement category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MovementCategoryEnvelope {
    /// Stable identifier.
    pub guid: StableId,
    /// Display name.
    pub name: String,
    /// Optional descriptor reference.
    #[serde(default)]
    pub descriptor_guid: Option<StableId>,
    /// Optional parent category reference.
    #[serde(default)]
    pub parent_category_guid: Option<StableId>,
    /// Base categories this category belongs to.
    #[serde(default)]
    pub base_categories: Vec<BaseCategory>,
    /// Timestamp of last mutation.
    pub updated_at_utc: DateTime<Utc>,
    /// Monotonic write sequence.
    pub updated_seq: i64,
    /// Tombstone flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// Ownership tag.
    #[serde(default)]
    pub authority: Authority,
}

impl_envelope!(MovementCategoryEnvelope);

impl MovementCategoryEnvelope {
    /// Desired base-category set: deduped, empty when tombstoned.
    pub fn desired_base_categories(&self) -> Vec<BaseCategory> {
        if self.is_deleted {
            return Vec::new();
        }
        let mut seen = Vec::new();
        for base in &self.base_categories {
            if !seen.contains(base) {
                seen.push(*base);
            }
        }
        seen
    }
}

/// Sync payload for a movement, referencing category, muscles, and
/// equipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MovementEnvelope {
    /// Stable identifier.
    pub guid: StableId,
    /// Display name.
    pub name: String,
    /// Optional descriptor reference.
    #[serde(default)]
    pub descriptor_guid: Option<StableId>,
    /// Primary muscle references.
    #[serde(default)]
    pub primary_muscles: Option<Vec<StableId>>,
    /// Secondary muscle references.
    #[serde(default)]
    pub secondary_muscles: Option<Vec<StableId>>,
    /// Equipment references.
    #[serde(default)]
    pub equipment: Option<Vec<StableId>>,
    /// Category reference.
    #[serde(default)]
    pub category: Option<StableId>,
    /// Movement this one is a variant of.
    #[serde(default)]
    pub variant_of: Option<StableId>,
    /// Timestamp of last mutation.
    pub updated_at_utc: DateTime<Utc>,
    /// Monotonic write sequence.
    pub updated_seq: i64,
    /// Tombstone flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// Ownership tag.
    #[serde(default)]
    pub authority: Authority,
}

impl_envelope!(MovementEnvelope);

impl MovementEnvelope {
    /// Desired primary-muscle set.
    pub fn desired_primary_muscles(&self) -> Vec<StableId> {
        normalize_refs(self.primary_muscles.as_ref(), self.is_deleted)
    }

    /// Desired secondary-muscle set. A muscle already listed as primary is
    /// dropped from the secondary set.
    pub fn desired_secondary_muscles(&self) -> Vec<StableId> {
        let primary = self.desired_primary_muscles();
        normalize_refs(self.secondary_muscles.as_ref(), self.is_deleted)
            .into_iter()
            .filter(|id| !primary.contains(id))
            .collect()
    }

    /// Desired equipment set.
    pub fn desired_equipment(&self) -> Vec<StableId> {
        normalize_refs(self.equipment.as_ref(), self.is_deleted)
    }
}

/// A sync envelope for any entity kind.
///
/// The union is internally tagged with a `"Type"` discriminator so an
/// outbox payload snapshot is self-describing; pull endpoints carry bare
/// per-kind payloads and are widened by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum SyncEnvelope {
    /// Descriptor payload.
    Descriptor(DescriptorEnvelope),
    /// Equipment payload.
    Equipment(EquipmentEnvelope),
    /// Muscle payload.
    Muscle(MuscleEnvelope),
    /// Movement category payload.
    MovementCategory(MovementCategoryEnvelope),
    /// Movement payload.
    Movement(MovementEnvelope),
}

impl SyncEnvelope {
    /// Returns the entity kind of this envelope.
    pub fn kind(&self) -> EntityKind {
        match self {
            SyncEnvelope::Descriptor(_) => EntityKind::Descriptor,
            SyncEnvelope::Equipment(_) => EntityKind::Equipment,
            SyncEnvelope::Muscle(_) => EntityKind::Muscle,
            SyncEnvelope::MovementCategory(_) => EntityKind::MovementCategory,
            SyncEnvelope::Movement(_) => EntityKind::Movement,
        }
    }
}

impl Envelope for SyncEnvelope {
    fn stable_id(&self) -> StableId {
        match self {
            SyncEnvelope::Descriptor(e) => e.stable_id(),
            SyncEnvelope::Equipment(e) => e.stable_id(),
            SyncEnvelope::Muscle(e) => e.stable_id(),
            SyncEnvelope::MovementCategory(e) => e.stable_id(),
            SyncEnvelope::Movement(e) => e.stable_id(),
        }
    }

    fn updated_at(&self) -> DateTime<Utc> {
        match self {
            SyncEnvelope::Descriptor(e) => e.updated_at(),
            SyncEnvelope::Equipment(e) => e.updated_at(),
            SyncEnvelope::Muscle(e) => e.updated_at(),
            SyncEnvelope::MovementCategory(e) => e.updated_at(),
            SyncEnvelope::Movement(e) => e.updated_at(),
        }
    }

    fn updated_seq(&self) -> i64 {
        match self {
            SyncEnvelope::Descriptor(e) => e.updated_seq(),
            SyncEnvelope::Equipment(e) => e.updated_seq(),
            SyncEnvelope::Muscle(e) => e.updated_seq(),
            SyncEnvelope::MovementCategory(e) => e.updated_seq(),
            SyncEnvelope::Movement(e) => e.updated_seq(),
        }
    }

    fn is_deleted(&self) -> bool {
        match self {
            SyncEnvelope::Descriptor(e) => e.is_deleted(),
            SyncEnvelope::Equipment(e) => e.is_deleted(),
            SyncEnvelope::Muscle(e) => e.is_deleted(),
            SyncEnvelope::MovementCategory(e) => e.is_deleted(),
            SyncEnvelope::Movement(e) => e.is_deleted(),
        }
    }

    fn authority(&self) -> Authority {
        match self {
            SyncEnvelope::Descriptor(e) => e.authority(),
            SyncEnvelope::Equipment(e) => e.authority(),
            SyncEnvelope::Muscle(e) => e.authority(),
            SyncEnvelope::MovementCategory(e) => e.authority(),
            SyncEnvelope::Movement(e) => e.authority(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn muscle(deleted: bool, antagonists: Vec<StableId>) -> MuscleEnvelope {
        MuscleEnvelope {
            guid: StableId::from_bytes([1; 16]),
            name: "Biceps".into(),
            descriptor_guid: None,
            body_section: BodySection::UpperBody,
            antagonist_guids: Some(antagonists),
            updated_at_utc: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            updated_seq: 7,
            is_deleted: deleted,
            authority: Authority::Bidirectional,
        }
    }

    #[test]
    fn envelope_is_tagged_with_type() {
        let env = SyncEnvelope::Muscle(muscle(false, vec![]));
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"Type\":\"Muscle\""));
        assert!(json.contains("\"UpdatedAtUtc\""));
        assert!(json.contains("\"UpdatedSeq\":7"));

        let back: SyncEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), EntityKind::Muscle);
        assert_eq!(back, env);
    }

    #[test]
    fn tombstone_empties_relationship_lists() {
        let other = StableId::from_bytes([2; 16]);
        let env = muscle(true, vec![other]);
        assert!(env.desired_antagonists().is_empty());
    }

    #[test]
    fn desired_refs_drop_nil_and_duplicates() {
        let a = StableId::from_bytes([2; 16]);
        let b = StableId::from_bytes([3; 16]);
        let env = muscle(false, vec![a, StableId::nil(), b, a]);
        assert_eq!(env.desired_antagonists(), vec![a, b]);
    }

    #[test]
    fn secondary_muscles_exclude_primaries() {
        let a = StableId::from_bytes([4; 16]);
        let b = StableId::from_bytes([5; 16]);
        let env = MovementEnvelope {
            guid: StableId::new(),
            name: "Bench Press".into(),
            descriptor_guid: None,
            primary_muscles: Some(vec![a]),
            secondary_muscles: Some(vec![a, b]),
            equipment: None,
            category: None,
            variant_of: None,
            updated_at_utc: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            updated_seq: 1,
            is_deleted: false,
            authority: Authority::Bidirectional,
        };

        assert_eq!(env.desired_secondary_muscles(), vec![b]);
    }

    #[test]
    fn missing_optional_fields_use_defaults() {
        let json = r#"{
            "Guid": "22222222-2222-2222-2222-222222222222",
            "Name": "Barbell",
            "UpdatedAtUtc": "2024-01-01T00:00:00Z",
            "UpdatedSeq": 3
        }"#;

        let env: EquipmentEnvelope = serde_json::from_str(json).unwrap();
        assert!(!env.is_deleted);
        assert_eq!(env.authority, Authority::Bidirectional);
        assert!(env.descriptor_guid.is_none());
    }
}
