//! Output file allocation.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::Result;

/// Extension for still images.
pub const PHOTO_EXTENSION: &str = "jpg";
/// Extension for recordings.
pub const VIDEO_EXTENSION: &str = "mp4";

/// Hands out fresh, uniquely named files in one directory.
///
/// Names are random v4 UUIDs; there is no collision handling beyond that.
#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    /// Store rooted at `dir`. The directory is created on first allocation.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory files are created in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create an empty `<uuid>.<extension>` file and return its path.
    ///
    /// # Arguments
    ///
    /// * `extension` - File extension without the dot
    ///
    /// # Returns
    ///
    /// Path of the new file. The directory is created when missing and an
    /// existing file is never reused.
    pub fn allocate(&self, extension: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.{extension}", Uuid::new_v4()));
        OpenOptions::new().write(true).create_new(true).open(&path)?;
        Ok(path)
    }
}
