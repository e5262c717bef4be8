//! Sync Module
//!
//! Client-side actions over a local store and a list of record servers.
//!
//! ## Model
//! - Mutations are local-first: the local store is updated and the call
//!   returns; replication to every server runs in the background
//! - Each server is independent: one failure emits a warning event and
//!   never blocks or rolls back the others
//! - `read_and_wait` is the blocking, remote-authoritative read path
//! - Versions are reconciled by `updatedAt`, latest wins

mod client;
mod database;
mod reconcile;
mod replicator;

pub use client::ServerClient;
pub use database::{Database, RemoveResult, WriteRequest};
pub use replicator::{ReplicationEvent, ReplicationOutcome, ReplicationReport, Replicator};
