//! Read-only filesystem access used for `file://` targets.

use sp_core::SpidyError;
use sp_core::SpidyResult;
use std::path::Path;

/// Filesystem operations the gate needs. The gate never writes.
pub trait FileSystem {
    fn exists(&self, path: &Path) -> bool;
    fn read_to_string(&self, path: &Path) -> SpidyResult<String>;
}

/// Host filesystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> SpidyResult<String> {
        std::fs::read_to_string(path).map_err(|error| {
            SpidyError::io(
                "fs.read_failed",
                format!("failed to read `{}`", path.display()),
                error,
            )
        })
    }
}
