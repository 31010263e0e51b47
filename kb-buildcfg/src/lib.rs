//! Shared constants: on-disk names and the package version string.
//!
//! Every other crate in the workspace imports these instead of repeating
//! string literals for the metadata directory layout.

/// Package version, as `MAJOR.MINOR.PATCH`.
pub const PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the hidden metadata directory created under a repository root.
pub const META_DIR_NAME: &str = ".krico-backup";

/// Advisory exclusive lock file, directly under the metadata directory.
pub const LOCK_FILE_NAME: &str = "krico-backup.lock";

/// Config file, directly under the metadata directory.
pub const CONFIG_FILE_NAME: &str = "config";

/// Log directory, directly under the metadata directory.
pub const LOG_DIR_NAME: &str = "log";

/// HEAD pointer file, directly under the log directory.
pub const LOG_HEAD_NAME: &str = "HEAD";

/// Subject registry directory, directly under the metadata directory.
pub const DIRS_DIR_NAME: &str = "dirs";

/// Content-addressed pool directory, directly under the metadata directory.
pub const HLINKS_DIR_NAME: &str = "hlinks";

/// Per-subject file holding the subject's relative path.
pub const TARGET_FILE_NAME: &str = "target";

/// Per-subject file holding the absolute source directory.
pub const SOURCE_FILE_NAME: &str = "source";

/// Symlink to the most recently completed snapshot.
pub const CURRENT_LINK_NAME: &str = "current";

/// Symlink to the snapshot before `current`.
pub const PREVIOUS_LINK_NAME: &str = "previous";

/// Config key under which `initialize` records its timestamp.
pub const CONFIG_KEY_INIT_TS: &str = "metadata.init-ts";
