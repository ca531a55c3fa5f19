//! Blob store backed by a local directory.
//!
//! Each container is a subdirectory of the store root and each key a
//! slash-delimited relative path inside it: `{root}/{container}/{key}`.

use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use url::Url;
use walkdir::WalkDir;

use crate::error::StorageError;
use crate::traits::{BlobReader, BlobStore, ObjectInfo, ObjectMetadata, PresignMethod};
use crate::types::apply_delimiter;

/// Default provider identifier for [`LocalDirBlobStore`].
pub const LOCAL_PROVIDER_ID: &str = "local";

/// Blob store over a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalDirBlobStore {
    id: String,
    root_path: PathBuf,
}

impl LocalDirBlobStore {
    /// Create a new local store.
    ///
    /// # Arguments
    /// * `root_path` - Directory holding one subdirectory per container (must be absolute)
    ///
    /// # Errors
    /// Returns error if path is not absolute.
    pub fn new(root_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root: PathBuf = root_path.into();
        if !root.is_absolute() {
            return Err(StorageError::InvalidConfig {
                message: format!("LocalDirBlobStore root must be absolute: {}", root.display()),
            });
        }
        Ok(Self {
            id: LOCAL_PROVIDER_ID.to_string(),
            root_path: root,
        })
    }

    /// Override the provider identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Root directory of the store.
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Resolve the container directory, failing if it does not exist.
    fn container_dir(&self, container: &str) -> Result<PathBuf, StorageError> {
        if container.is_empty() || container.contains('/') || container == ".." {
            return Err(StorageError::InvalidConfig {
                message: format!("Invalid container name: {:?}", container),
            });
        }
        let dir: PathBuf = self.root_path.join(container);
        if !dir.is_dir() {
            return Err(StorageError::ContainerNotFound {
                container: container.to_string(),
            });
        }
        Ok(dir)
    }

    /// Resolve an object path. Keys may not climb out of the container.
    fn object_path(&self, container: &str, key: &str) -> Result<PathBuf, StorageError> {
        if key.split('/').any(|segment| segment == "..") {
            return Err(StorageError::AccessDenied {
                container: container.to_string(),
                key: key.to_string(),
                message: "key escapes the container directory".to_string(),
            });
        }
        let dir: PathBuf = self.container_dir(container)?;
        Ok(key
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(dir, |path, segment| path.join(segment)))
    }
}

/// Convert an I/O error on an object into the storage taxonomy.
fn map_io_error(container: &str, key: &str, path: &Path, err: std::io::Error) -> StorageError {
    match err.kind() {
        std::io::ErrorKind::NotFound => StorageError::NotFound {
            container: container.to_string(),
            key: key.to_string(),
        },
        std::io::ErrorKind::PermissionDenied => StorageError::AccessDenied {
            container: container.to_string(),
            key: key.to_string(),
            message: err.to_string(),
        },
        _ => StorageError::io_error(path.display().to_string(), &err),
    }
}

fn mtime_secs(metadata: &std::fs::Metadata) -> Option<i64> {
    metadata
        .modified()
        .ok()
        .and_then(|t: std::time::SystemTime| t.duration_since(UNIX_EPOCH).ok())
        .map(|d: Duration| d.as_secs() as i64)
}

/// Key prefix up to its last `/`: the deepest directory the prefix fully names.
fn prefix_dir(prefix: &str) -> &str {
    match prefix.rfind('/') {
        Some(idx) => &prefix[..idx],
        None => "",
    }
}

/// Collect files under `start` whose container-relative key starts with `prefix`.
///
/// Stops after `limit` matches when given.
fn walk_prefix(
    container_dir: &Path,
    start: &Path,
    container: &str,
    prefix: &str,
    limit: Option<usize>,
) -> Result<Vec<ObjectInfo>, StorageError> {
    let mut objects: Vec<ObjectInfo> = Vec::new();
    if !start.is_dir() {
        return Ok(objects);
    }

    for entry in WalkDir::new(start).follow_links(false).sort_by_file_name() {
        let entry: walkdir::DirEntry = entry.map_err(|e| {
            let message: String = e.to_string();
            match e.io_error().map(std::io::Error::kind) {
                Some(std::io::ErrorKind::PermissionDenied) => StorageError::AccessDenied {
                    container: container.to_string(),
                    key: prefix.to_string(),
                    message,
                },
                _ => StorageError::IoError {
                    path: start.display().to_string(),
                    message,
                },
            }
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let relative: &Path = match entry.path().strip_prefix(container_dir) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let key: String = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if !key.starts_with(prefix) {
            continue;
        }

        let metadata: std::fs::Metadata = entry
            .metadata()
            .map_err(|e| StorageError::IoError {
                path: entry.path().display().to_string(),
                message: e.to_string(),
            })?;
        objects.push(ObjectInfo::file(key, metadata.len(), mtime_secs(&metadata)));

        if limit.map_or(false, |limit| objects.len() >= limit) {
            break;
        }
    }

    objects.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(objects)
}

impl LocalDirBlobStore {
    /// Walk the subtree a prefix names on the blocking pool.
    async fn walk(
        &self,
        container: &str,
        prefix: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        let container_dir: PathBuf = self.container_dir(container)?;
        let start: PathBuf = self.object_path(container, prefix_dir(prefix))?;
        let container_name: String = container.to_string();
        let prefix_owned: String = prefix.to_string();

        tokio::task::spawn_blocking(move || {
            walk_prefix(&container_dir, &start, &container_name, &prefix_owned, limit)
        })
        .await
        .map_err(|e| StorageError::Other {
            message: format!("Directory walk failed: {}", e),
        })?
    }
}

#[async_trait]
impl BlobStore for LocalDirBlobStore {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn list(
        &self,
        container: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        let objects: Vec<ObjectInfo> = self.walk(container, prefix, None).await?;

        if recursive {
            Ok(objects)
        } else {
            Ok(apply_delimiter(prefix, objects))
        }
    }

    async fn has_any(&self, container: &str, prefix: &str) -> Result<bool, StorageError> {
        let found: Vec<ObjectInfo> = self.walk(container, prefix, Some(1)).await?;
        Ok(!found.is_empty())
    }

    async fn get_metadata(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StorageError> {
        let path: PathBuf = self.object_path(container, key)?;
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(ObjectMetadata {
                size: metadata.len(),
                last_modified: mtime_secs(&metadata),
                content_type: None,
                etag: None,
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_io_error(container, key, &path, e)),
        }
    }

    async fn open_read(&self, container: &str, key: &str) -> Result<BlobReader, StorageError> {
        let path: PathBuf = self.object_path(container, key)?;
        let file: tokio::fs::File = tokio::fs::File::open(&path)
            .await
            .map_err(|e| map_io_error(container, key, &path, e))?;
        Ok(Box::pin(file))
    }

    async fn presign(
        &self,
        container: &str,
        key: &str,
        _method: PresignMethod,
        _ttl: Duration,
    ) -> Result<Url, StorageError> {
        let path: PathBuf = self.object_path(container, key)?;
        Url::from_file_path(&path).map_err(|_| StorageError::InvalidConfig {
            message: format!("Cannot express {} as a file URL", path.display()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path: PathBuf = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn fixture() -> (TempDir, LocalDirBlobStore) {
        let dir: TempDir = TempDir::new().unwrap();
        write(dir.path(), "artifacts/job/1/log.txt", b"hello");
        write(dir.path(), "artifacts/job/1/out/app.jar", b"1234567");
        write(dir.path(), "artifacts/job/2/log.txt", b"x");
        let store: LocalDirBlobStore = LocalDirBlobStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_relative_root_rejected() {
        let result = LocalDirBlobStore::new("relative/root");
        assert!(matches!(result, Err(StorageError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_recursive_and_delimited_list() {
        let (_dir, store) = fixture();

        let all: Vec<ObjectInfo> = store.list("artifacts", "job/1/", true).await.unwrap();
        let keys: Vec<&str> = all.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["job/1/log.txt", "job/1/out/app.jar"]);
        assert_eq!(all[1].size, Some(7));

        let top: Vec<ObjectInfo> = store.list("artifacts", "job/", false).await.unwrap();
        let keys: Vec<&str> = top.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["job/1/", "job/2/"]);
    }

    #[tokio::test]
    async fn test_list_walks_only_the_prefix_subtree() {
        let (dir, store) = fixture();
        write(dir.path(), "artifacts/job/10/log.txt", b"y");
        write(dir.path(), "artifacts/jobs.txt", b"z");

        let partial: Vec<ObjectInfo> = store.list("artifacts", "job/1", true).await.unwrap();
        let keys: Vec<&str> = partial.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["job/1/log.txt", "job/1/out/app.jar", "job/10/log.txt"]);

        let top: Vec<ObjectInfo> = store.list("artifacts", "job", true).await.unwrap();
        assert_eq!(top.len(), 5);

        assert!(store.list("artifacts", "job/9/", true).await.unwrap().is_empty());
        assert!(store
            .list("artifacts", "job/1/log.txt/", true)
            .await
            .unwrap()
            .is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_ignores_unreadable_sibling() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, store) = fixture();
        let locked: PathBuf = dir.path().join("artifacts").join("job").join("2");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        let listed = store.list("artifacts", "job/1/", true).await;
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(listed.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_has_any() {
        let (_dir, store) = fixture();
        assert!(store.has_any("artifacts", "job/1/").await.unwrap());
        assert!(store.has_any("artifacts", "").await.unwrap());
        assert!(!store.has_any("artifacts", "job/9/").await.unwrap());
        assert!(!store.has_any("artifacts", "job/1/log.txt/").await.unwrap());
    }

    #[tokio::test]
    async fn test_metadata_and_open() {
        let (_dir, store) = fixture();

        let meta: ObjectMetadata = store
            .get_metadata("artifacts", "job/1/log.txt")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.size, 5);
        assert!(store.get_metadata("artifacts", "job/1").await.unwrap().is_none());
        assert!(store.get_metadata("artifacts", "job/9").await.unwrap().is_none());

        let mut reader: BlobReader = store.open_read("artifacts", "job/1/log.txt").await.unwrap();
        let mut content: Vec<u8> = Vec::new();
        reader.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"hello");

        let missing = store.open_read("artifacts", "job/1/none.txt").await;
        assert!(matches!(missing, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_missing_container() {
        let (_dir, store) = fixture();
        let result = store.list("stashes", "", true).await;
        assert!(matches!(result, Err(StorageError::ContainerNotFound { .. })));
    }

    #[tokio::test]
    async fn test_escaping_key_denied() {
        let (_dir, store) = fixture();
        let result = store.get_metadata("artifacts", "../secret").await;
        assert!(matches!(result, Err(StorageError::AccessDenied { .. })));
    }

    #[tokio::test]
    async fn test_presign_is_file_url() {
        let (dir, store) = fixture();
        let url: Url = store
            .presign("artifacts", "job/1/log.txt", PresignMethod::Get, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(url.scheme(), "file");
        assert_eq!(
            url.to_file_path().unwrap(),
            dir.path().join("artifacts").join("job").join("1").join("log.txt")
        );
    }
}
