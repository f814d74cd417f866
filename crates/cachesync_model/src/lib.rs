//! # cachesync model
//!
//! Data types shared by every cachesync crate.
//!
//! This crate provides:
//! - [`Entity`], the identifiable record exchanged with the remote source
//! - [`EntityKind`] and [`KindSpec`] describing collection kinds and their nested kind
//! - [`SyncState`], the pending-change marker carried by every cached record
//! - [`LocalRecord`] and [`StorageId`], the store-side wrapper of an entity
//! - [`Timestamp`], the parsed `lastUpdated` / `created` value
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
mod kind;
mod record;
mod state;
mod timestamp;

pub use entity::{to_ids, to_map, Entity};
pub use error::{ModelError, ModelResult};
pub use kind::{EntityKind, KindSpec, NestedSpec};
pub use record::{LocalRecord, StorageId};
pub use state::SyncState;
pub use timestamp::Timestamp;
