//! Per-process processing context.

use crate::path::PathResolver;
use std::path::{Path, PathBuf};

/// Name of the top-level directory of an extracted bundle layout
pub const PAYLOAD_DIR: &str = "Payload";

/// Inputs of one attached process: where files come from and where they go
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    label: String,
    basedir: PathBuf,
    outdir: PathBuf,
}

impl ProcessingContext {
    /// Create a context writing files under `outdir` exactly as they sit under `basedir`
    pub fn new(
        label: impl Into<String>,
        basedir: impl Into<PathBuf>,
        outdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            label: label.into(),
            basedir: basedir.into(),
            outdir: outdir.into(),
        }
    }

    /// Create a context using the bundle layout `output_root/Payload/<basename(basedir)>`
    ///
    /// # Examples
    ///
    /// ```
    /// use siphon_core::ProcessingContext;
    /// use std::path::Path;
    ///
    /// let ctx = ProcessingContext::for_bundle("main", "/var/containers/Bundle/Application/X/Demo.app", "dump");
    /// assert_eq!(ctx.outdir(), Path::new("dump/Payload/Demo.app"));
    /// ```
    pub fn for_bundle(
        label: impl Into<String>,
        basedir: impl Into<PathBuf>,
        output_root: impl AsRef<Path>,
    ) -> Self {
        let basedir = basedir.into();
        let mut outdir = output_root.as_ref().join(PAYLOAD_DIR);
        if let Some(name) = basedir.file_name() {
            outdir.push(name);
        }
        Self::new(label, basedir, outdir)
    }

    /// Identity of the attached process, used in logs
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
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

    /// Path resolver for this context
    #[must_use]
    pub fn resolver(&self) -> PathResolver {
        PathResolver::new(self.basedir.clone(), self.outdir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_layout() {
        let ctx = ProcessingContext::for_bundle(
            "plugin-412",
            "/private/var/containers/Bundle/Application/ABCD/Demo.app",
            "/tmp/dump",
        );
        assert_eq!(ctx.label(), "plugin-412");
        assert_eq!(ctx.outdir(), Path::new("/tmp/dump/Payload/Demo.app"));

        let local = ctx
            .resolver()
            .local_path("/private/var/containers/Bundle/Application/ABCD/Demo.app/Demo")
            .unwrap();
        assert_eq!(local, PathBuf::from("/tmp/dump/Payload/Demo.app/Demo"));
    }

    #[test]
    fn test_flat_layout() {
        let ctx = ProcessingContext::new("main", "/a/b", "/out");
        assert_eq!(ctx.basedir(), Path::new("/a/b"));
        assert_eq!(ctx.outdir(), Path::new("/out"));
    }
}
