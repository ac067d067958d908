//! Persisted queue state (SQLite via sqlx).
//!
//! One row per job mirroring every field of the in-memory record. The engine
//! never reads the database while running; [`PersistenceMirror`] follows its
//! events and writes snapshots. On start the rows are loaded back through
//! [`crate::engine::EngineBuilder::restore`].

mod db;
mod jobs;
mod mirror;
mod types;

pub use db::QueueDb;
pub use mirror::{MirrorHandle, PersistenceMirror};
