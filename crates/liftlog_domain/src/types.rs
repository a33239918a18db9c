//! Shared domain enumerations.

use serde::{Deserialize, Serialize};

/// Which side owns a record's field values.
///
/// Governs whether an incoming value may overwrite a local edit: a
/// server-owned record is never modified by client pushes, a client-owned
/// record is never overwritten by pulls, and bidirectional records follow
/// last-writer-wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Authority {
    /// The client owns the field values.
    ClientOwned,
    /// The server owns the field values.
    ServerOwned,
    /// Either side may write; conflicts resolve last-writer-wins.
    #[default]
    Bidirectional,
}

/// Body section targeted by a muscle or movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BodySection {
    /// Shoulders, arms, chest, upper back.
    UpperBody,
    /// Core and lower back.
    MidSection,
    /// Hips, legs.
    LowerBody,
    /// Not classified.
    #[default]
    Undefined,
}

/// Base movement categories used to group exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BaseCategory {
    /// Body-weight movements.
    BodyWeight,
    /// Barbell/dumbbell work.
    Weightlifting,
    /// Cardiovascular work.
    Cardio,
    /// Stretching and mobility.
    Flexibility,
    /// Mixed modality.
    Hybrid,
}

/// Role a muscle plays in a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MuscleRole {
    /// Prime mover.
    Primary,
    /// Assisting muscle.
    Secondary,
}
