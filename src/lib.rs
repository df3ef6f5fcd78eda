//! planedb — the authoritative in-memory state store for a job-scheduling
//! control plane.
//!
//! Driven by a replicated log: the replication FSM supplies log indices and
//! applies writes serially; readers run lock-free over stable views, register
//! watch channels, and block with a deadline via [`memdb::WatchSet`].
//! Snapshots are O(1) copy-on-write views and restores load raw records in
//! one transaction. Every record returned from a read is shared and must be
//! treated as a constant; the write paths copy-on-write.

pub mod error;
pub mod memdb;
pub mod models;
pub mod store;

pub use error::{PlanedbError, PlanedbErrorCode};
pub use memdb::{WatchChannel, WatchSet};
pub use store::{StateRestore, StateSnapshot, StateStore};
