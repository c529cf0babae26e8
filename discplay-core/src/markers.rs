use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct MarkerFile {
    path: PathBuf,
}

impl MarkerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the marker and leave it world read/writable.
    pub fn write(&self, value: impl Display) -> io::Result<()> {
        fs::write(&self.path, value.to_string())?;
        set_world_writable(&self.path)
    }

    /// Write, logging instead of failing.
    pub fn store(&self, value: impl Display) {
        if let Err(e) = self.write(value) {
            log::warn!("Failed to update marker {}: {}", self.path.display(), e);
        }
    }

    /// Trimmed contents, or `None` when missing or blank.
    pub fn read(&self) -> Option<String> {
        let text = fs::read_to_string(&self.path).ok()?;
        let value = text.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    pub fn read_track(&self) -> Option<u32> {
        self.read()?.parse().ok()
    }
}

#[cfg(unix)]
fn set_world_writable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o666))
}

#[cfg(not(unix))]
fn set_world_writable(_path: &Path) -> io::Result<()> {
    Ok(())
}
