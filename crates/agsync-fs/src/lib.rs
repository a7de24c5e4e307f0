//! Filesystem layer for Antigravity Sync
//!
//! Decides which files are eligible for synchronization, guards the local
//! repository against concurrent sync processes, and moves content between
//! the user's working directory and the repository working tree.

pub mod checksum;
pub mod conflict;
pub mod constants;
pub mod copy;
pub mod error;
pub mod filter;
pub mod io;
pub mod lock;
pub mod path;
pub mod record;

pub use conflict::{ConflictArea, is_conflict_artifact};
pub use constants::SyncPath;
pub use copy::{ChangeCopyEngine, CopyOptions, InboundScope, PullStats, PushStats};
pub use error::{Error, Result};
pub use filter::FilterEngine;
pub use lock::{LockGuard, LockManager};
pub use path::NormalizedPath;
pub use record::FileRecord;
