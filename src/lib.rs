//! s3push - one-way incremental upload of a local tree to S3
//!
//! A local walk and a paginated bucket listing run concurrently; the local
//! side is indexed in memory, each remote object is matched against it, and
//! every new or changed file is uploaded by a bounded pool of workers.

pub mod cli;
pub mod config;
pub mod error;
pub mod progress;
pub mod retry;
pub mod storage;
pub mod sync;
pub mod types;
pub mod uri;

pub use config::Config;
pub use error::{Error, Result};
pub use sync::{SyncEngine, SyncTarget};
pub use types::*;
