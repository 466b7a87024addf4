use std::{
    io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use tokio::fs;

/// Scratch directory owned by exactly one execution
///
/// Removed by [`ScratchWorkspace::destroy`], or synchronously on drop if the
/// owning future is cancelled before that.
pub struct ScratchWorkspace {
    path: PathBuf,
    removed: bool,
}

impl ScratchWorkspace {
    /// Create `root/name`, failing if it already exists
    pub async fn create(root: &Path, name: &str) -> io::Result<Self> {
        fs::create_dir_all(root).await?;
        let path = root.join(name);
        fs::create_dir(&path).await?;
        let workspace = Self {
            path,
            removed: false,
        };
        fs::set_permissions(&workspace.path, std::fs::Permissions::from_mode(0o700)).await?;
        log::trace!("Created workspace {:?}", workspace.path);
        Ok(workspace)
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    /// Write the single source file, returning its path
    pub async fn write_source(&self, file: &str, source: &str) -> io::Result<PathBuf> {
        let path = self.path.join(file);
        fs::write(&path, source).await?;
        Ok(path)
    }
    pub async fn destroy(mut self) {
        self.removed = true;
        if let Err(err) = fs::remove_dir_all(&self.path).await {
            log::warn!("Fail cleaning up workspace {:?}: {}", self.path, err);
        } else {
            log::trace!("Removed workspace {:?}", self.path);
        }
    }
}

impl Drop for ScratchWorkspace {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(err) = std::fs::remove_dir_all(&self.path) {
            log::warn!("Fail cleaning up workspace {:?}: {}", self.path, err);
        }
    }
}
