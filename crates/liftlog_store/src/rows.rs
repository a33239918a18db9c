//! Row types for the typed tables.
//!
//! Every entity row pairs a local `u64` row id with the globally stable
//! [`StableId`]. Foreign keys between rows use local ids; stable ids only
//! appear at the sync boundary.

use chrono::{DateTime, Utc};
use liftlog_domain::{Authority, BaseCategory, BodySection, MuscleRole, StableId};

/// Audit columns shared by every entity row.
#[derive(Debug, Clone, PartialEq)]
pub struct Audit {
    /// Timestamp of the last mutation.
    pub updated_at_utc: DateTime<Utc>,
    /// Monotonic per-store write sequence.
    pub updated_seq: i64,
    /// Soft-delete marker. Tombstoned rows are retained.
    pub is_deleted: bool,
    /// Ownership tag governing sync overwrites.
    pub authority: Authority,
}

/// A free-form description attached to other entities.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorRow {
    /// Local row id.
    pub id: u64,
    /// Stable identifier.
    pub guid: StableId,
    /// Description text.
    pub content: String,
    /// Audit columns.
    pub audit: Audit,
}

/// A piece of training equipment.
#[derive(Debug, Clone, PartialEq)]
pub struct EquipmentRow {
    /// Local row id.
    pub id: u64,
    /// Stable identifier.
    pub guid: StableId,
    /// Display name.
    pub name: String,
    /// Local id of the attached descriptor, if any.
    pub descriptor_id: Option<u64>,
    /// Audit columns.
    pub audit: Audit,
}

/// A muscle.
#[derive(Debug, Clone, PartialEq)]
pub struct MuscleRow {
    /// Local row id.
    pub id: u64,
    /// Stable identifier.
    pub guid: StableId,
    /// Display name.
    pub name: String,
    /// Local id of the attached descriptor, if any.
    pub descriptor_id: Option<u64>,
    /// Body section classification.
    pub body_section: BodySection,
    /// Audit columns.
    pub audit: Audit,
}

/// A movement category.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementCategoryRow {
    /// Local row id.
    pub id: u64,
    /// Stable identifier.
    pub guid: StableId,
    /// Display name.
    pub name: String,
    /// Local id of the attached descriptor, if any.
    pub descriptor_id: Option<u64>,
    /// Local id of the parent category, if any.
    pub parent_category_id: Option<u64>,
    /// Audit columns.
    pub audit: Audit,
}

/// A movement.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementRow {
    /// Local row id.
    pub id: u64,
    /// Stable identifier.
    pub guid: StableId,
    /// Display name.
    pub name: String,
    /// Local id of the attached descriptor, if any.
    pub descriptor_id: Option<u64>,
    /// Local id of the category, if any.
    pub category_id: Option<u64>,
    /// Local id of the movement this one varies, if any.
    pub variant_of_id: Option<u64>,
    /// Audit columns.
    pub audit: Audit,
}

/// Join row linking a muscle to one of its antagonists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuscleAntagonistRow {
    /// Owning muscle.
    pub muscle_id: u64,
    /// Antagonist muscle.
    pub antagonist_id: u64,
}

/// Join row linking a movement to a worked muscle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementMuscleRow {
    /// Owning movement.
    pub movement_id: u64,
    /// Worked muscle.
    pub muscle_id: u64,
    /// Whether the muscle is a primary or secondary mover.
    pub role: MuscleRole,
}

/// Join row linking a movement to required equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementEquipmentRow {
    /// Owning movement.
    pub movement_id: u64,
    /// Required equipment.
    pub equipment_id: u64,
}

/// Join row linking a category to a base category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryBaseRow {
    /// Owning category.
    pub category_id: u64,
    /// Base category membership.
    pub base: BaseCategory,
}
