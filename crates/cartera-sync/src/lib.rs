//! # cartera-sync
//!
//! Client-side data-synchronization layer for the single-advisor
//! portfolio panel.
//!
//! The remote document database owns clients, messages, brokers and
//! documents; this crate mirrors those collections into typed, sorted,
//! live-updating local state ([`mirror`]), performs every write with its
//! side-effect choreography ([`gateway`]), keeps the session-local
//! activity timeline and notification feed ([`emitter`]), and ties the
//! whole thing to the authentication session ([`store`]).
//!
//! The UI reads the published `watch` collections and calls the gateway;
//! it never mutates the read state itself. A write becomes visible once
//! the remote store pushes the updated snapshot back through the mirror.

pub mod emitter;
pub mod gateway;
pub mod mirror;
pub mod retry;
pub mod store;

mod error;

pub use emitter::{ActivityDraft, Emitter, NotificationDraft};
pub use error::{Result, SyncError};
pub use gateway::{ClientUpdate, Gateway, NewClient, NewDocument, NewMessage};
pub use mirror::{Collections, EntityKind};
pub use retry::RetryPolicy;
pub use store::DataStore;

use tracing_subscriber::{fmt, EnvFilter};

/// Install the process-wide tracing subscriber. Safe to call more than
/// once; later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cartera_sync=debug,cartera_remote=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
