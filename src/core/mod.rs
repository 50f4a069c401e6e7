//! Core library modules for drive-mirror
//!
//! This module contains the internal implementation of the mirror pipeline:
//! source browsing, destination stores, streaming, scheduling and reporting.

pub mod config;
pub mod error;
pub mod model;
pub mod retry;
pub mod s3;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod stream;
pub mod summary;
pub mod walker;
pub mod worker;
pub mod mirror;

// Re-export main types for internal use
pub use mirror::Mirror;
pub use scheduler::Scheduler;
pub use walker::{TreeWalker, WalkStats};
pub use worker::{TransferWorker, WorkerOptions};
