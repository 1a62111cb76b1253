//! Facility storage abstractions.
//!
//! This crate defines the Entity Store contract the custody engine reads
//! from and writes through:
//! - per-entity read traits (get by id, get children by parent id)
//! - a status-filtered query for active firearm assignments
//! - atomic [`WriteBatch`] commits
//!
//! Design stance:
//! - The store checks referential existence and nothing else.
//! - Capacity, exclusivity and acyclicity are enforced by the engine.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod batch;
mod error;
pub mod memory;
mod traits;

pub use batch::{RecordKey, WriteBatch, WriteOp};
pub use error::{StorageError, StorageResult};
pub use traits::{
    AssignmentStore, BatchStore, BlockStore, CellStore, FacilityStorage, FirearmStore,
    OccupantStore, StaffStore, SupervisionStore,
};
