//! Directory-backed store for local development: `<root>/<bucket>/<key>`.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use crate::application::storage::{ObjectStore, StoreError};

#[derive(Debug)]
pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn resolve(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let bucket_path = Path::new(bucket);
        let key_path = Path::new(key);
        if !is_relative_inside(bucket_path) || bucket_path.components().count() != 1 {
            return Err(StoreError::InvalidKey {
                key: bucket.to_string(),
            });
        }
        if !is_relative_inside(key_path) {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
            });
        }

        Ok(self.root.join(bucket_path).join(key_path))
    }
}

fn is_relative_inside(path: &Path) -> bool {
    !path.is_absolute()
        && path.components().all(|component| {
            !matches!(
                component,
                Component::ParentDir | Component::Prefix(_) | Component::RootDir
            )
        })
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        let absolute = self.resolve(bucket, key)?;
        match fs::read(&absolute).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::not_found(bucket, key))
            }
            Err(err) => Err(StoreError::transport(format!(
                "failed to read `{}`: {err}",
                absolute.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn store_with(files: &[(&str, &[u8])]) -> (TempDir, FilesystemObjectStore) {
        let dir = TempDir::new().expect("tempdir");
        for (path, contents) in files {
            let absolute = dir.path().join(path);
            std::fs::create_dir_all(absolute.parent().expect("parent")).expect("mkdir");
            std::fs::write(absolute, contents).expect("write fixture");
        }
        let store = FilesystemObjectStore::new(dir.path().to_path_buf()).expect("store");
        (dir, store)
    }

    #[tokio::test]
    async fn reads_objects_under_bucket_directory() {
        let (_dir, store) = store_with(&[("scores/library/song.xml", b"<score-partwise/>")]);
        let bytes = store
            .get("scores", "library/song.xml")
            .await
            .expect("object");
        assert_eq!(bytes, Bytes::from_static(b"<score-partwise/>"));
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let (_dir, store) = store_with(&[]);
        let err = store.get("scores", "nope.xml").await.expect_err("missing");
        assert!(matches!(err, StoreError::NotFound { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn traversal_outside_the_root_is_rejected() {
        let (_dir, store) = store_with(&[("secret.xml", b"secret")]);
        for (bucket, key) in [
            ("scores", "../secret.xml"),
            ("scores", "/etc/passwd"),
            ("..", "secret.xml"),
            ("a/b", "song.xml"),
        ] {
            let err = store.get(bucket, key).await.expect_err("rejected");
            assert!(
                matches!(err, StoreError::InvalidKey { .. }),
                "{bucket}/{key}: {err:?}"
            );
        }
    }
}
