//! Error types for the custody engine.
//!
//! Every engine operation fails with exactly one specific variant, so
//! callers can branch on the cause without re-deriving it.

use facility_storage::StorageError;
use facility_types::{CellId, FirearmSerial, OccupantId, StaffId};
use thiserror::Error;

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input, e.g. a zero capacity or an empty name.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A capacity reduction cannot be absorbed by same-kind cells of the block.
    #[error(
        "capacity unavailable for {cell}: {required} occupant(s) to relocate, {available} free place(s) in candidate cells"
    )]
    CapacityUnavailable {
        cell: CellId,
        required: u32,
        available: u32,
    },

    #[error("{cell} is full (capacity {capacity})")]
    CellFull { cell: CellId, capacity: u32 },

    #[error("{occupant} is not present in {cell}")]
    NotPresent { cell: CellId, occupant: OccupantId },

    #[error("{occupant} is already housed in {cell}")]
    OccupantAlreadyHoused { occupant: OccupantId, cell: CellId },

    /// The same holder already has this firearm checked out.
    #[error("{firearm} is already assigned to {holder}")]
    AlreadyAssigned {
        firearm: FirearmSerial,
        holder: StaffId,
    },

    /// Another holder has this firearm checked out.
    #[error("{firearm} is not available, currently held by {holder}")]
    FirearmNotAvailable {
        firearm: FirearmSerial,
        holder: StaffId,
    },

    #[error("{0} has no active assignment")]
    NoActiveAssignment(FirearmSerial),

    #[error("{staff} still holds {firearm}")]
    StaffHoldsFirearm {
        staff: StaffId,
        firearm: FirearmSerial,
    },

    #[error("{0} cannot supervise themselves")]
    SelfSupervision(StaffId),

    #[error("placing {subordinate} under {supervisor} would close a supervision cycle")]
    CycleDetected {
        subordinate: StaffId,
        supervisor: StaffId,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("timed out acquiring lock on {resource}")]
    LockTimeout { resource: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    pub(crate) fn not_found(entity: &'static str, id: &impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// The fieldless kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::CapacityUnavailable { .. } => ErrorKind::CapacityUnavailable,
            EngineError::CellFull { .. } => ErrorKind::CellFull,
            EngineError::NotPresent { .. } => ErrorKind::NotPresent,
            EngineError::OccupantAlreadyHoused { .. } => ErrorKind::OccupantAlreadyHoused,
            EngineError::AlreadyAssigned { .. } => ErrorKind::AlreadyAssigned,
            EngineError::FirearmNotAvailable { .. } => ErrorKind::FirearmNotAvailable,
            EngineError::NoActiveAssignment(_) => ErrorKind::NoActiveAssignment,
            EngineError::StaffHoldsFirearm { .. } => ErrorKind::StaffHoldsFirearm,
            EngineError::SelfSupervision(_) => ErrorKind::SelfSupervision,
            EngineError::CycleDetected { .. } => ErrorKind::CycleDetected,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::LockTimeout { .. } => ErrorKind::LockTimeout,
            EngineError::Storage(_) => ErrorKind::Storage,
        }
    }
}

/// Error kinds, for callers that only branch on the cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    CapacityUnavailable,
    CellFull,
    NotPresent,
    OccupantAlreadyHoused,
    AlreadyAssigned,
    FirearmNotAvailable,
    NoActiveAssignment,
    StaffHoldsFirearm,
    SelfSupervision,
    CycleDetected,
    NotFound,
    LockTimeout,
    Storage,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
