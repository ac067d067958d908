//! Job row operations on [`super::QueueDb`].

mod read;
mod write;
