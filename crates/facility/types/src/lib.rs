//! Facility Types - identifiers and entity records for the custody engine
//!
//! Shared vocabulary for the storage contract and the engine:
//! blocks, cells, occupants, firearms and their holder assignments, staff,
//! and supervision edges.

#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod entity;
pub mod ids;

pub use entity::{Block, Cell, Firearm, HolderAssignment, Occupant, Staff, SupervisionEdge};
pub use ids::{AssignmentId, BlockId, CellId, FirearmSerial, OccupantId, PrisonId, StaffId};
