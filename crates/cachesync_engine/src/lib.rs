//! # cachesync engine
//!
//! Two-phase synchronization of a local entity cache with a remote source.
//!
//! This crate provides:
//! - [`Reconciler`], which classifies cached entities against a remote
//!   collection into a [`ReconcilePlan`]
//! - [`BatchApplier`], the only writer of the local store during a round
//! - [`SyncOrchestrator`], which runs push-then-pull rounds
//! - [`SyncWorker`], which runs rounds off the caller's thread
//!
//! ## Architecture
//!
//! The engine implements a **push-then-pull** model:
//! 1. Push every pending local mutation (deletes, then puts, then removed
//!    nested items) and commit the resulting store changes in one batch
//! 2. Pull each tracked kind: list it remotely, reconcile, download changed
//!    owners in full, and commit one batch per kind
//!
//! ## Key Invariants
//!
//! - Pull runs only after the push fully succeeded
//! - A pending local mutation is never overwritten or re-created by a pull
//! - Equal timestamps mean no change, so repeating a pull is a no-op
//! - Every batch is atomic; a failed phase writes nothing
//! - The core never retries
//!
//! ## Example
//!
//! ```rust
//! use cachesync_engine::{SyncConfig, SyncOrchestrator};
//! use cachesync_model::{Entity, KindSpec, Timestamp};
//! use cachesync_remote::MemoryRemote;
//! use cachesync_store::{LocalStore, MemoryStore};
//! use std::sync::Arc;
//!
//! let remote = Arc::new(MemoryRemote::new());
//! remote.put("charts", Entity::new("c1", "Bars").with_last_updated(Timestamp::now()));
//!
//! let store = Arc::new(MemoryStore::new());
//! let engine = SyncOrchestrator::new(
//!     SyncConfig::new([KindSpec::flat("charts")]),
//!     Arc::clone(&store),
//!     remote,
//! );
//!
//! let report = engine.run_round().unwrap();
//! assert!(report.is_success());
//! assert!(store.find(&"charts".into(), "c1").unwrap().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod config;
mod error;
mod orchestrator;
mod reconcile;
mod worker;

pub use applier::BatchApplier;
pub use config::{ExpansionStrategy, OverlapPolicy, PullScope, SyncConfig};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use orchestrator::{
    CancelHandle, EngineState, KindOutcome, KindStatus, PullOutcome, PushOutcome, RoundReport,
    SyncOrchestrator, SyncStats,
};
pub use reconcile::{PlanCounts, PlanStep, ReconcilePlan, Reconciler};
pub use worker::{RoundTicket, SyncWorker};
