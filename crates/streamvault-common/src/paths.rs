//! Record file locations.
//!
//! A recording lives in two files derived from one base path: a scratch file
//! (`<base>.data`) holding muxed tag bodies while publishing is in progress,
//! and the final container (`<base>.<ext>`) written once at teardown. The two
//! roles get distinct types so one cannot be opened where the other is meant.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Suffix of the header-less scratch file.
pub const SCRATCH_EXTENSION: &str = "data";

/// Path of the scratch file written during publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchPath(PathBuf);

impl ScratchPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

/// Path of the finalized container file read by playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalPath(PathBuf);

impl FinalPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

/// Scratch and final paths of one stream name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPaths {
    pub scratch: ScratchPath,
    pub final_file: FinalPath,
}

/// Maps stream names to record files under a root directory.
#[derive(Debug, Clone)]
pub struct RecordStore {
    root: PathBuf,
    extension: String,
}

impl RecordStore {
    /// Create a store rooted at `root` writing final files with `extension`.
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    /// Root directory of all recordings.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extension of final container files.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Base path (no extension) for a stream name.
    ///
    /// Names that would escape the root directory are rejected.
    ///
    /// # Examples
    ///
    /// ```
    /// use streamvault_common::paths::RecordStore;
    ///
    /// let store = RecordStore::new("/records", "flv");
    /// assert!(store.record_filename_base("cam1").is_ok());
    /// assert!(store.record_filename_base("../etc/passwd").is_err());
    /// assert!(store.record_filename_base("").is_err());
    /// ```
    pub fn record_filename_base(&self, stream_name: &str) -> Result<PathBuf> {
        if stream_name.is_empty() {
            return Err(Error::invalid_input("empty stream name"));
        }
        if stream_name.contains(['/', '\\']) || stream_name == "." || stream_name == ".." {
            return Err(Error::invalid_input(format!(
                "stream name {stream_name:?} is not a plain file name"
            )));
        }
        Ok(self.root.join(stream_name))
    }

    /// Scratch and final paths for a stream name.
    pub fn record_paths(&self, stream_name: &str) -> Result<RecordPaths> {
        let base = self.record_filename_base(stream_name)?;
        Ok(RecordPaths {
            scratch: ScratchPath(with_suffix(&base, SCRATCH_EXTENSION)),
            final_file: FinalPath(with_suffix(&base, &self.extension)),
        })
    }

    /// Create the root directory if it does not exist.
    pub fn ensure_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }
}

// `Path::with_extension` would replace a dotted suffix already in the name.
fn with_suffix(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}
