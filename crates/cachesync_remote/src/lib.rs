//! # cachesync remote
//!
//! Access to the authoritative remote source.
//!
//! This crate provides:
//! - [`RemoteFetcher`], the blocking read/write contract the sync core uses
//! - [`Mutation`], a change pushed to the remote source
//! - [`FetchRequest`] and [`MutationRequest`], the wire shape of every call
//! - [`HttpFetcher`], a fetcher over any [`HttpClient`]
//! - [`MemoryRemote`], an in-memory remote for tests
//!
//! ## Example
//!
//! ```rust
//! use cachesync_model::{Entity, KindSpec, Timestamp};
//! use cachesync_remote::{MemoryRemote, RemoteFetcher};
//!
//! let remote = MemoryRemote::new();
//! remote.put("charts", Entity::new("c1", "Bars").with_last_updated(Timestamp::now()));
//!
//! let charts = remote.fetch_collection(&KindSpec::flat("charts"), &[], false).unwrap();
//! assert_eq!(charts.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod fetcher;
mod http;
mod memory;
mod request;

pub use error::{RemoteError, RemoteResult};
pub use fetcher::{Mutation, RemoteFetcher};
pub use http::{HttpClient, HttpFetcher, HttpRequest, HttpResponse};
pub use memory::{MemoryRemote, RemoteCall};
pub use request::{FetchRequest, Method, MutationRequest, IDENTITY_FIELDS};
