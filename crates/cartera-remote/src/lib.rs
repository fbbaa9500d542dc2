//! # cartera-remote
//!
//! Interfaces to the two external collaborators of the sync layer: the
//! hosted document database ([`RemoteStore`]) and the object storage
//! service ([`BlobStorage`]).
//!
//! The traits describe exactly what the core consumes: document CRUD,
//! equality queries, atomic batch writes, server-assigned timestamps and
//! live snapshot subscriptions on one side; blob put/delete with durable
//! URLs on the other. [`MemoryStore`] and [`FsBlobStore`] are in-process
//! implementations of those contracts, used by the test suite and by
//! local deployments.

pub mod blobs;
pub mod memory;
pub mod query;
pub mod store;

mod error;

pub use blobs::{BlobStorage, FsBlobStore};
pub use error::{BlobError, RemoteError, Result};
pub use memory::MemoryStore;
pub use query::{Direction, Filter, Query};
pub use store::{RemoteStore, Subscription, WriteOp};
