use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::Result;
use crate::providers::Image;

/// Source of the per-stock binary artifact.
pub trait ArtifactStore {
    /// `Ok(None)` when no artifact exists for `code`.
    fn load(&self, code: &str) -> Result<Option<Image>>;
}

/// Screenshots captured as `<dir>/<code>.png`.
#[derive(Debug, Clone)]
pub struct ScreenshotDir {
    dir: PathBuf,
}

impl ScreenshotDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, code: &str) -> PathBuf {
        self.dir.join(format!("{code}.png"))
    }
}

impl ArtifactStore for ScreenshotDir {
    fn load(&self, code: &str) -> Result<Option<Image>> {
        match std::fs::read(self.path_for(code)) {
            Ok(bytes) => Ok(Some(Image::png(bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
