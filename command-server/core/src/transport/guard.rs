//! Directory Guard
//!
//! Validates the communication directory before any request from it is
//! trusted. The directory lives in a shared temp location, so another user
//! could have created it first, swapped it for a symlink, or loosened its
//! permissions between runs. Every activation re-checks it.
//!
//! # Checks
//!
//! - Created with mode 0700 if missing
//! - Must be a real directory, not a symlink (checked with `lstat`)
//! - No group or other write bit
//! - Owned by the current user (Unix only)

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Mode for a newly created communication directory
pub const DIRECTORY_MODE: u32 = 0o700;

/// Write bits that must never be set on the directory
const FOREIGN_WRITE_BITS: u32 = 0o022;

/// Reasons the communication directory cannot be trusted
#[derive(Debug, Error)]
pub enum GuardError {
    /// The directory could not be created
    #[error("Failed to create communication directory {path:?}: {source}")]
    Create {
        /// Directory path
        path: PathBuf,
        /// Underlying IO error
        source: io::Error,
    },

    /// The directory could not be inspected
    #[error("Failed to inspect communication directory {path:?}: {source}")]
    Stat {
        /// Directory path
        path: PathBuf,
        /// Underlying IO error
        source: io::Error,
    },

    /// The path is a symbolic link
    #[error("Communication directory {0:?} is a symbolic link")]
    Symlink(PathBuf),

    /// The path exists but is not a directory
    #[error("Communication directory {0:?} is not a directory")]
    NotADirectory(PathBuf),

    /// Group or other users may write into the directory
    #[error("Communication directory {path:?} is writable by other users (mode {mode:o})")]
    WritableByOthers {
        /// Directory path
        path: PathBuf,
        /// Permission bits found
        mode: u32,
    },

    /// The directory belongs to someone else
    #[error("Communication directory {path:?} is owned by uid {actual}, expected {expected}")]
    WrongOwner {
        /// Directory path
        path: PathBuf,
        /// Current user
        expected: u32,
        /// Owner found on disk
        actual: u32,
    },
}

/// Create the directory if needed and verify it is safe to use
pub fn ensure(path: &Path) -> Result<(), GuardError> {
    tracing::debug!(path = ?path, "Preparing communication directory");
    create_private_dir(path).map_err(|source| GuardError::Create {
        path: path.to_path_buf(),
        source,
    })?;

    let result = validate(path);
    if let Err(ref e) = result {
        tracing::warn!(path = ?path, error = %e, "Rejecting communication directory");
    }
    result
}

/// Verify an existing directory without creating it
pub fn validate(path: &Path) -> Result<(), GuardError> {
    let metadata = fs::symlink_metadata(path).map_err(|source| GuardError::Stat {
        path: path.to_path_buf(),
        source,
    })?;

    let file_type = metadata.file_type();
    if file_type.is_symlink() {
        return Err(GuardError::Symlink(path.to_path_buf()));
    }
    if !file_type.is_dir() {
        return Err(GuardError::NotADirectory(path.to_path_buf()));
    }

    check_permissions(path, &metadata)
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new()
        .recursive(true)
        .mode(DIRECTORY_MODE)
        .create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> io::Result<()> {
    fs::DirBuilder::new().recursive(true).create(path)
}

#[cfg(unix)]
fn check_permissions(path: &Path, metadata: &fs::Metadata) -> Result<(), GuardError> {
    use std::os::unix::fs::MetadataExt;

    let mode = metadata.mode() & 0o7777;
    if mode & FOREIGN_WRITE_BITS != 0 {
        return Err(GuardError::WritableByOthers {
            path: path.to_path_buf(),
            mode,
        });
    }

    if let Some(expected) = super::resolver::current_uid() {
        let actual = metadata.uid();
        if actual != expected {
            return Err(GuardError::WrongOwner {
                path: path.to_path_buf(),
                expected,
                actual,
            });
        }
    }

    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(_path: &Path, _metadata: &fs::Metadata) -> Result<(), GuardError> {
    // The temp root is already per-user here
    Ok(())
}
