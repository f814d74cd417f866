//! # cachesync testkit
//!
//! Test utilities for cachesync.
//!
//! This crate provides:
//! - Fixtures: timestamps, entity builders, tracked kinds and seeded stores
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cachesync_testkit::prelude::*;
//!
//! #[test]
//! fn pulls_new_chart() {
//!     let fixture = SyncFixture::new();
//!     fixture.remote.put("charts", entity("c1", 10));
//!     // ... run a round against fixture.store
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
