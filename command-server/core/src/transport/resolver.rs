//! Communication Directory Resolver
//!
//! Derives the rendezvous directory shared by the client and the host. Both
//! sides compute it independently, so the derivation must stay byte-for-byte
//! identical on each side:
//!
//! ```text
//! <temp root>/<service name>-<uid>   (Unix)
//! <temp root>/<service name>         (platforms without numeric uids,
//!                                     where the temp root is per-user)
//! ```

use std::path::{Path, PathBuf};

/// File the client writes requests to
pub const REQUEST_FILE_NAME: &str = "request.json";

/// File the host writes responses to
pub const RESPONSE_FILE_NAME: &str = "response.json";

/// Source of the ambient values the directory is derived from
pub trait PathProvider: Send + Sync {
    /// Platform temp root
    fn temp_root(&self) -> PathBuf;

    /// Numeric id of the current user, `None` where the platform has none
    fn user_id(&self) -> Option<u32>;
}

/// Reads the temp root and user id from the running process
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemPaths;

impl PathProvider for SystemPaths {
    fn temp_root(&self) -> PathBuf {
        std::env::temp_dir()
    }

    fn user_id(&self) -> Option<u32> {
        current_uid()
    }
}

/// Fixed temp root and user id
///
/// Used for a configured temp root and in tests.
#[derive(Clone, Debug)]
pub struct FixedPaths {
    root: PathBuf,
    uid: Option<u32>,
}

impl FixedPaths {
    /// Pin both values
    pub fn new(root: impl Into<PathBuf>, uid: Option<u32>) -> Self {
        Self {
            root: root.into(),
            uid,
        }
    }

    /// Pin the root, keep the process's user id
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self::new(root, current_uid())
    }
}

impl PathProvider for FixedPaths {
    fn temp_root(&self) -> PathBuf {
        self.root.clone()
    }

    fn user_id(&self) -> Option<u32> {
        self.uid
    }
}

/// Numeric id of the current user
#[cfg(unix)]
#[must_use]
pub fn current_uid() -> Option<u32> {
    Some(unsafe { libc::getuid() })
}

/// Numeric id of the current user
#[cfg(not(unix))]
#[must_use]
pub fn current_uid() -> Option<u32> {
    None
}

/// Compute the communication directory path
pub fn resolve(provider: &dyn PathProvider, service_name: &str) -> PathBuf {
    let name = match provider.user_id() {
        Some(uid) => format!("{service_name}-{uid}"),
        None => service_name.to_string(),
    };
    provider.temp_root().join(name)
}

/// The resolved rendezvous directory and the paths inside it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommunicationDir {
    path: PathBuf,
}

impl CommunicationDir {
    /// Wrap an already resolved path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve the directory for `service_name`
    pub fn resolve(provider: &dyn PathProvider, service_name: &str) -> Self {
        Self::new(resolve(provider, service_name))
    }

    /// The directory itself
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the request file
    #[must_use]
    pub fn request_path(&self) -> PathBuf {
        self.path.join(REQUEST_FILE_NAME)
    }

    /// Path of the response file
    #[must_use]
    pub fn response_path(&self) -> PathBuf {
        self.path.join(RESPONSE_FILE_NAME)
    }
}
