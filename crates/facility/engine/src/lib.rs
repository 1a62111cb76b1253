//! # Facility Engine - Custody Invariants for Cells, Firearms and Staff
//!
//! This crate keeps three constrained relationships consistent on top of an
//! Entity Store that only checks referential existence.
//!
//! ## Key Components
//!
//! - [`CapacityAllocator`]: every cell holds at most `capacity` occupants;
//!   shrinking a cell relocates its excess occupants within the block, or
//!   fails without moving anyone
//! - [`HolderRegistry`]: a firearm has at most one active assignment, and
//!   returned assignments are kept as history
//! - [`SupervisionGraph`]: each staff member has at most one supervisor and
//!   the supervision relation never forms a cycle
//! - [`FacilityEngine`]: the three managers over one store
//!
//! ## Example
//!
//! ```rust,no_run
//! use facility_engine::FacilityEngine;
//! use facility_types::{Block, BlockId, FirearmSerial, PrisonId};
//!
//! # async fn example() -> facility_engine::Result<()> {
//! let engine = FacilityEngine::in_memory();
//!
//! let block = engine
//!     .capacity()
//!     .create_block(Block::new(BlockId::new("B"), "general", PrisonId::new("north")))
//!     .await?;
//! let cell = engine.capacity().create_cell(&block.id, "standard", 2).await?;
//! let occupant = engine.capacity().admit_occupant("J. Doe").await?;
//! engine.capacity().add_occupant(&cell.id, &occupant.id).await?;
//!
//! let officer = engine.supervision().register_staff("R. Roe", "officer").await?;
//! let serial = FirearmSerial::new("SN123");
//! engine.holders().register_firearm(serial.clone(), "pistol").await?;
//! engine.holders().assign(&serial, &officer.id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Consistency
//!
//! Each operation takes the locks of the resources it touches (see
//! [`locks`]), re-reads what it needs, checks everything in memory, and then
//! writes through a single atomic [`WriteBatch`](facility_storage::WriteBatch).
//! A failed operation leaves the store untouched.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod capacity;
pub mod config;
pub mod engine;
pub mod error;
pub mod holders;
pub mod locks;
pub mod reallocation;
pub mod supervision;

pub use capacity::{BlockOccupancy, CapacityAllocator, CellOccupancy};
pub use config::{ConfigError, EngineConfig, ExcessOrder, LockConfig, ReallocationConfig};
pub use engine::FacilityEngine;
pub use error::{EngineError, ErrorKind, Result};
pub use holders::HolderRegistry;
pub use reallocation::{plan_capacity_change, ReallocationPlan, Relocation};
pub use supervision::SupervisionGraph;
