//! mdq-core: download queue and job-execution engine.
//!
//! Jobs are submitted to an [`Engine`], admitted under a concurrency cap,
//! and carried through fetch, postprocess and finalize by worker tasks.
//! Callers observe them through snapshots and [`events`], and steer them with
//! pause, resume, cancel and retry. [`queue_db`] persists the queue across
//! restarts.

pub mod config;
pub mod logging;

pub mod admission;
pub mod control;
pub mod destination;
pub mod engine;
pub mod error;
pub mod events;
pub mod fetch;
pub mod job;
pub mod postprocess;
pub mod queue_db;
pub mod retry;
pub mod storage;
pub mod store;
mod worker;

pub use engine::{Engine, EngineBuilder, EngineConfig};
pub use error::{QueueError, QueueResult};
pub use events::{EventKind, JobEvent, Publisher, Subscription};
pub use job::{FailureKind, Job, JobError, JobId, JobSnapshot, JobState, NewJob, Stage, TagHints};
pub use queue_db::{MirrorHandle, PersistenceMirror, QueueDb};
