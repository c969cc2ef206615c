//! # Profile Replay
//!
//! Second phase of the directory sync: reads the batch files staged by an
//! extraction connector and pushes each row to a remote profile store,
//! one account at a time.
//!
//! Per-account failures are logged (`FAILURE`) and the run moves on; a
//! failure to reach the store at all aborts the remaining files.

pub mod config;
pub mod replayer;
pub mod store;

pub use config::ReplayConfig;
pub use dirsync_core::PropertyChange;
pub use replayer::{staged_files, ProfileReplayer};
pub use store::LoggingProfileStore;
