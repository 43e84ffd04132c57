//! Internal file-backed datastore plugin
//!
//! The fixed plugin the registry itself is persisted through. One file per
//! (module, datastore kind); stores go through a temporary file followed by
//! an atomic rename, so readers either see the previous tree or the new one,
//! never a torn write.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{MetaError, Result};
use crate::plugin::{DatastoreKind, DatastorePlugin};

/// File-backed plugin rooted at a data directory
#[derive(Debug)]
pub struct FilePlugin {
    dir: PathBuf,
}

impl FilePlugin {
    /// Name used in plugin bindings
    pub const NAME: &'static str = "file";

    /// Create the plugin, creating the data directory if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| Self::err("store", e))?;
        Ok(Self { dir })
    }

    fn path(&self, module: &str, ds: DatastoreKind) -> PathBuf {
        self.dir.join(format!("{}.{}", module, ds.as_str()))
    }

    fn err(op: &'static str, e: std::io::Error) -> MetaError {
        MetaError::Plugin {
            plugin: Self::NAME.to_string(),
            op,
            message: e.to_string(),
        }
    }
}

impl DatastorePlugin for FilePlugin {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn store(&self, module: &str, ds: DatastoreKind, tree: &[u8]) -> Result<()> {
        let path = self.path(module, ds);
        let tmp = path.with_extension(format!("{}.tmp", ds.as_str()));

        let mut file = fs::File::create(&tmp).map_err(|e| Self::err("store", e))?;
        file.write_all(tree).map_err(|e| Self::err("store", e))?;
        file.sync_all().map_err(|e| Self::err("store", e))?;
        drop(file);

        fs::rename(&tmp, &path).map_err(|e| Self::err("store", e))?;
        debug!(module, datastore = %ds, bytes = tree.len(), "stored tree");
        Ok(())
    }

    fn load(&self, module: &str, ds: DatastoreKind) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path(module, ds)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::err("load", e)),
        }
    }
}
