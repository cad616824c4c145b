//! Configuration.
//!
//! Settings are merged field-by-field from these tiers, lowest first:
//! 1. **Defaults** - built in
//! 2. **Project** - `$CWD/task-tracker/config.yaml`
//! 3. **User** - `~/.task-tracker/config.yaml`
//! 4. **Environment** - see below
//!
//! Command-line flags are applied on top by the binary.
//!
//! ## Environment Variables
//! - `TASK_TRACKER_CONFIG_PATH` - Explicit config file (replaces tiers 2 and 3)
//! - `TASK_TRACKER_DB_PATH` - Database path
//! - `TASK_TRACKER_MEDIA_DIR` - Media directory
//! - `TASK_TRACKER_HOST` / `TASK_TRACKER_PORT` - Listen address
//! - `TASK_TRACKER_PAGE_SIZE` - Results per list page

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier};
pub use merge::deep_merge;
pub use types::*;
