use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Failure to persist an output document.
#[derive(Debug, Error)]
#[error("Failed to {action} '{}': {source}", .path.display())]
pub struct WriteError {
    pub action: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl WriteError {
    fn new(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Writes `content` to `path` atomically.
///
/// The content goes to a uniquely named temporary sibling, is synced to
/// disk, and is then renamed over `path`. On failure the temporary file is
/// removed and any existing file at `path` is left untouched, so readers
/// never see a truncated document. Missing parent directories are created.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), WriteError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| WriteError::new("create directory", parent, e))?;
    }

    let temp_path = temp_sibling(path);

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .map_err(|e| WriteError::new("create temporary file", &temp_path, e))?;

    let written = file
        .write_all(content)
        .map_err(|e| WriteError::new("write temporary file", &temp_path, e))
        .and_then(|()| {
            file.sync_all()
                .map_err(|e| WriteError::new("sync temporary file", &temp_path, e))
        });
    drop(file);

    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    // On Windows, rename fails if destination exists, so remove it first
    #[cfg(windows)]
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(WriteError::new("replace", path, e));
        }
    }

    std::fs::rename(&temp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        WriteError::new("rename temporary file onto", path, e)
    })
}

/// A sibling of `path` named `<stem>.tmp.<pid>.<seq>.<nanos>`. The process
/// id and a process-wide counter keep names unique across concurrent
/// writers; the timestamp separates runs that reuse a pid.
fn temp_sibling(path: &Path) -> PathBuf {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    path.with_extension(format!("tmp.{}.{seq}.{nanos:x}", std::process::id()))
}

/// A transient file that is deleted when the guard is dropped.
///
/// Used for the raw feed download so the artifact disappears on every exit
/// path of a run, including early returns on error.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    /// Claims `<file name>.download` next to `output`.
    pub fn beside(output: &Path) -> Self {
        let file_name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "feed".to_string());
        Self {
            path: output.with_file_name(format!("{file_name}.download")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed download artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove download artifact")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("podsieve_fs_{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.contains(".tmp."))
            .collect()
    }

    #[test]
    fn test_write_atomic_creates_file() {
        let dir = test_dir("create");
        let path = dir.join("out.xml");

        write_atomic(&path, b"<rss/>").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<rss/>");
        assert!(leftovers(&dir).is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_write_atomic_replaces_existing() {
        let dir = test_dir("replace");
        let path = dir.join("out.xml");
        std::fs::write(&path, "old").unwrap();

        write_atomic(&path, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_write_atomic_creates_parent_directories() {
        let dir = test_dir("parents");
        let path = dir.join("a").join("b").join("out.xml");

        write_atomic(&path, b"nested").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "nested");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_write_atomic_into_directory_path_fails_cleanly() {
        let dir = test_dir("is_dir");
        let path = dir.join("taken");
        std::fs::create_dir_all(&path).unwrap();

        let err = write_atomic(&path, b"data").unwrap_err();
        assert!(err.to_string().contains("Failed to"));
        assert!(path.is_dir());
        assert!(leftovers(&dir).is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_temp_artifact_removed_on_drop() {
        let dir = test_dir("artifact");
        let output = dir.join("mirror.xml");

        let artifact = TempArtifact::beside(&output);
        assert_eq!(artifact.path(), dir.join("mirror.xml.download"));
        std::fs::write(artifact.path(), "raw").unwrap();
        let path = artifact.path().to_path_buf();

        drop(artifact);
        assert!(!path.exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_temp_artifact_drop_without_file_is_quiet() {
        let dir = test_dir("artifact_missing");
        let artifact = TempArtifact::beside(&dir.join("never.xml"));
        drop(artifact);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_temp_siblings_are_unique() {
        let path = Path::new("/srv/feeds/mirror.xml");
        let first = temp_sibling(path);
        let second = temp_sibling(path);

        assert_ne!(first, second);
        assert_eq!(first.parent(), path.parent());
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(&format!("mirror.tmp.{}.", std::process::id())));
    }

    #[test]
    fn test_concurrent_writes_to_one_directory() {
        let dir = test_dir("concurrent");
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = dir.join(format!("out{i}.xml"));
                std::thread::spawn(move || write_atomic(&path, b"<rss/>"))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 8);
        assert!(leftovers(&dir).is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }
}
