//! Entity records
//!
//! Records are plain data. Ownership of relationships is one-directional:
//! a [`Cell`] owns its occupant list, while an [`Occupant`] only remembers
//! the id of the cell it is in. The engine keeps both sides consistent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AssignmentId, BlockId, CellId, FirearmSerial, OccupantId, PrisonId, StaffId};

/// A block of cells within a prison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub kind: String,
    pub prison_id: PrisonId,
}

impl Block {
    pub fn new(id: BlockId, kind: impl Into<String>, prison_id: PrisonId) -> Self {
        Self {
            id,
            kind: kind.into(),
            prison_id,
        }
    }
}

/// A cell housing occupants up to a fixed capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub block_id: BlockId,
    pub kind: String,
    pub capacity: u32,

    /// Occupants in placement order; index 0 has been housed the longest.
    pub occupants: Vec<OccupantId>,
}

impl Cell {
    pub fn new(id: CellId, block_id: BlockId, kind: impl Into<String>, capacity: u32) -> Self {
        Self {
            id,
            block_id,
            kind: kind.into(),
            capacity,
            occupants: Vec::new(),
        }
    }

    /// Number of occupants currently housed.
    pub fn occupancy(&self) -> u32 {
        self.occupants.len() as u32
    }

    /// Free places left, never negative.
    pub fn available(&self) -> u32 {
        self.capacity.saturating_sub(self.occupancy())
    }

    pub fn is_full(&self) -> bool {
        self.occupancy() >= self.capacity
    }

    pub fn contains(&self, occupant: &OccupantId) -> bool {
        self.occupants.iter().any(|o| o == occupant)
    }
}

/// A person housed in at most one cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub id: OccupantId,
    pub name: String,

    /// Back-reference for lookup; `None` while unhoused.
    pub cell_id: Option<CellId>,
}

impl Occupant {
    pub fn new(id: OccupantId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            cell_id: None,
        }
    }
}

/// A firearm identified by its serial number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Firearm {
    pub serial: FirearmSerial,
    pub kind: String,
}

impl Firearm {
    pub fn new(serial: FirearmSerial, kind: impl Into<String>) -> Self {
        Self {
            serial,
            kind: kind.into(),
        }
    }
}

/// One issue of a firearm to a staff member
///
/// Records are never deleted when the firearm comes back; `returned` is
/// flipped instead, so the full custody history stays available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderAssignment {
    pub id: AssignmentId,
    pub returned: bool,
    pub issued_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl HolderAssignment {
    /// Create an active (unreturned) assignment.
    pub fn issue(id: AssignmentId, issued_at: DateTime<Utc>) -> Self {
        Self {
            id,
            returned: false,
            issued_at,
            returned_at: None,
        }
    }

    pub fn firearm(&self) -> &FirearmSerial {
        &self.id.firearm
    }

    pub fn holder(&self) -> &StaffId {
        &self.id.holder
    }

    pub fn is_active(&self) -> bool {
        !self.returned
    }
}

/// A staff member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staff {
    pub id: StaffId,
    pub name: String,
    pub role: String,
}

impl Staff {
    pub fn new(id: StaffId, name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            role: role.into(),
        }
    }
}

/// "`supervisor` oversees `subordinate`"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisionEdge {
    pub supervisor: StaffId,
    pub subordinate: StaffId,
    pub since: DateTime<Utc>,
}
