//! Project filesystem adapter (spec §6).
//!
//! Reads/writes text files under a project root and enumerates the tree
//! recursively, excluding `.git`, `__pycache__`, `node_modules`, and any
//! dot-directory. Writes are atomic per file (write-to-temp + rename).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::Result;

const EXCLUDED_DIRS: &[&str] = &[".git", "__pycache__", "node_modules"];

#[async_trait]
pub trait ProjectFilesystem: Send + Sync {
    async fn read_file(&self, project_root: &Path, relative_path: &str) -> Result<Option<String>>;
    async fn write_file(&self, project_root: &Path, relative_path: &str, content: &str) -> Result<()>;
    async fn delete_file(&self, project_root: &Path, relative_path: &str) -> Result<()>;
    async fn file_exists(&self, project_root: &Path, relative_path: &str) -> bool;

    /// Enumerate all files under the project root as relative, `/`-separated
    /// paths, excluding `.git`/`__pycache__`/`node_modules`/dot-directories.
    async fn list_files(&self, project_root: &Path) -> Result<Vec<String>>;
}

pub struct TokioProjectFilesystem;

impl TokioProjectFilesystem {
    pub fn new() -> Self {
        Self
    }

    fn is_excluded_dir(name: &str) -> bool {
        name.starts_with('.') || EXCLUDED_DIRS.contains(&name)
    }

    fn walk(root: &Path, current: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(current)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy().to_string();

            if file_type.is_dir() {
                if Self::is_excluded_dir(&name_str) {
                    continue;
                }
                Self::walk(root, &entry.path(), out)?;
            } else if file_type.is_file() {
                if let Ok(relative) = entry.path().strip_prefix(root) {
                    out.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        Ok(())
    }
}

impl Default for TokioProjectFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProjectFilesystem for TokioProjectFilesystem {
    async fn read_file(&self, project_root: &Path, relative_path: &str) -> Result<Option<String>> {
        let path = project_root.join(relative_path);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, project_root: &Path, relative_path: &str, content: &str) -> Result<()> {
        let path = project_root.join(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp_path: PathBuf = {
            let mut name = path.file_name().unwrap_or_default().to_os_string();
            name.push(".tmp");
            path.with_file_name(name)
        };
        let mut tmp = fs::File::create(&tmp_path).await?;
        tmp.write_all(content.as_bytes()).await?;
        tmp.flush().await?;
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn delete_file(&self, project_root: &Path, relative_path: &str) -> Result<()> {
        let path = project_root.join(relative_path);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn file_exists(&self, project_root: &Path, relative_path: &str) -> bool {
        fs::metadata(project_root.join(relative_path)).await.is_ok()
    }

    async fn list_files(&self, project_root: &Path) -> Result<Vec<String>> {
        let root = project_root.to_path_buf();
        let files = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            if root.exists() {
                Self::walk(&root, &root, &mut out)?;
            }
            Ok::<_, std::io::Error>(out)
        })
        .await
        .map_err(|e| crate::error::FactoryError::internal(e.to_string()))??;
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let fs_adapter = TokioProjectFilesystem::new();
        fs_adapter
            .write_file(dir.path(), "a/b.txt", "hello")
            .await
            .unwrap();
        let content = fs_adapter.read_file(dir.path(), "a/b.txt").await.unwrap();
        assert_eq!(content, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn list_files_excludes_dot_and_vendor_dirs() {
        let dir = tempdir().unwrap();
        let fs_adapter = TokioProjectFilesystem::new();
        fs_adapter.write_file(dir.path(), "src/main.rs", "fn main() {}").await.unwrap();
        fs_adapter
            .write_file(dir.path(), "node_modules/pkg/index.js", "ignored")
            .await
            .unwrap();
        fs_adapter
            .write_file(dir.path(), ".git/HEAD", "ignored")
            .await
            .unwrap();

        let files = fs_adapter.list_files(dir.path()).await.unwrap();
        assert!(files.iter().any(|f| f == "src/main.rs"));
        assert!(!files.iter().any(|f| f.contains("node_modules")));
        assert!(!files.iter().any(|f| f.starts_with(".git")));
    }

    #[tokio::test]
    async fn read_missing_file_returns_none() {
        let dir = tempdir().unwrap();
        let fs_adapter = TokioProjectFilesystem::new();
        assert_eq!(fs_adapter.read_file(dir.path(), "missing.txt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_missing_file_is_ok() {
        let dir = tempdir().unwrap();
        let fs_adapter = TokioProjectFilesystem::new();
        fs_adapter.delete_file(dir.path(), "missing.txt").await.unwrap();
    }
}
