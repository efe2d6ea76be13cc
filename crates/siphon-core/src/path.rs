//! Remote → local path mapping.

use crate::error::{BridgeError, Result};
use std::path::{Component, Path, PathBuf};

/// Maps remote absolute paths under `basedir` to local paths under `outdir`
#[derive(Debug, Clone)]
pub struct PathResolver {
    basedir: PathBuf,
    outdir: PathBuf,
}

impl PathResolver {
    /// Create a resolver for one processing context
    pub fn new(basedir: impl Into<PathBuf>, outdir: impl Into<PathBuf>) -> Self {
        Self {
            basedir: basedir.into(),
            outdir: outdir.into(),
        }
    }

    /// Remote base directory
    #[must_use]
    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    /// Local output directory
    #[must_use]
    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    /// Compute `outdir / relative(remote, basedir)` without touching the disk.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::PathOutsideBase`] if `remote` is not under the
    /// base directory or contains `..` components.
    pub fn local_path(&self, remote: &str) -> Result<PathBuf> {
        let outside = || BridgeError::PathOutsideBase {
            path: remote.to_string(),
            basedir: self.basedir.clone(),
        };

        let relative = Path::new(remote)
            .strip_prefix(&self.basedir)
            .map_err(|_| outside())?;

        let mut local = self.outdir.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => local.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(outside());
                }
            }
        }

        Ok(local)
    }

    /// Resolve `remote` to its local path, creating the parent directory first.
    ///
    /// Directory existence is checked on every call.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::PathOutsideBase`] for unmappable paths and
    /// [`BridgeError::Io`] if the parent cannot be created (for example when a
    /// component exists as a regular file).
    pub async fn resolve(&self, remote: &str) -> Result<PathBuf> {
        let local = self.local_path(remote)?;

        if let Some(parent) = local.parent() {
            let is_dir = tokio::fs::metadata(parent)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);

            if !is_dir {
                tracing::trace!("Creating directory {}", parent.display());
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BridgeError::io(parent, e))?;
            }
        }

        Ok(local)
    }
}
