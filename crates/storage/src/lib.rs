mod error;

pub use error::{StorageError, StorageResult};
pub use opendal::Buffer;
use opendal::{services::Fs, Operator};
use std::path::{Path, PathBuf};

/// Local filesystem storage rooted at a fixed directory.
///
/// All paths passed in are keys relative to the root, normalized the way
/// opendal does: leading `/` and empty segments are dropped. Nothing else is
/// sanitized.
#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
    op: Operator,
}

impl Storage {
    pub fn new_fs(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = Storage::path_to_string(root)?;
        let mut builder = Fs::default();
        builder.root(root.as_str());
        let op: Operator = Operator::new(builder)?.finish();

        Ok(Self {
            op,
            root: PathBuf::from(root),
        })
    }

    fn path_to_string(path: impl AsRef<Path>) -> StorageResult<String> {
        match path.as_ref().to_str() {
            Some(path) => Ok(path.to_string()),
            None => Err(StorageError::PathError(
                path.as_ref().to_string_lossy().to_string(),
            )),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// To indicate that a path is a directory, it is compulsory to include a trailing / in the path. Failure to do so may result in NotADirectory error being returned by OpenDAL.
    /// https://opendal.apache.org/docs/rust/opendal/struct.BlockingOperator.html#method.create_dir
    pub async fn create_dir(&self, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = normalize_key(&Storage::path_to_string(path)?);
        let path = if path.ends_with('/') {
            path
        } else {
            format!("{}/", path)
        };
        self.op
            .create_dir(path.as_str())
            .await
            .map_err(StorageError::from)
    }

    pub async fn read(&self, path: impl AsRef<Path>) -> StorageResult<Buffer> {
        let path = normalize_key(&Storage::path_to_string(path)?);
        self.op
            .read(path.as_str())
            .await
            .map_err(StorageError::from)
    }

    /// Write bytes to `path`, replacing any existing file.
    /// If parent dirs do not exist, they are created.
    pub async fn write(&self, path: impl AsRef<Path>, bs: impl Into<Buffer>) -> StorageResult<()> {
        let path = normalize_key(&Storage::path_to_string(path)?);
        tracing::debug!(path = %path, "writing file");
        self.op
            .write(path.as_str(), bs)
            .await
            .map_err(StorageError::from)
    }

    /// Filesystem path the operator uses for `path`.
    pub fn get_actual_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root
            .join(normalize_key(&path.as_ref().to_string_lossy()))
    }
}

/// Normalize a key the same way opendal does before hitting the backend.
pub fn normalize_key(path: &str) -> String {
    let has_trailing = path.ends_with('/');
    let mut key = path
        .split('/')
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if has_trailing && !key.is_empty() {
        key.push('/');
    }
    key
}

#[cfg(test)]
mod storage_test {
    use super::{normalize_key, Storage};

    fn init_storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let storage = Storage::new_fs(dir.path()).expect("create storage");
        (dir, storage)
    }

    #[tokio::test]
    async fn test_write_then_read_is_byte_identical() {
        let (_dir, storage) = init_storage();
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        storage.write("blob.bin", data.clone()).await.unwrap();
        let read_data = storage.read("blob.bin").await.unwrap();
        assert_eq!(read_data.to_vec(), data);
    }

    #[tokio::test]
    async fn test_write_overwrites_existing_file() {
        let (_dir, storage) = init_storage();
        storage.write("a.txt", b"first version".to_vec()).await.unwrap();
        storage.write("a.txt", b"second".to_vec()).await.unwrap();
        let read_data = storage.read("a.txt").await.unwrap();
        assert_eq!(read_data.to_vec(), b"second".to_vec());
    }

    #[tokio::test]
    async fn test_write_file_but_dir_not_exist() {
        let (dir, storage) = init_storage();
        let path = "test_dir_not_exist/test_dir_not_exist2/test.txt";
        storage.write(path, b"hello world".to_vec()).await.unwrap();
        assert!(dir.path().join(path).is_file());
    }

    #[tokio::test]
    async fn test_create_dir_with_and_without_trailing_slash() {
        let (dir, storage) = init_storage();
        storage.create_dir("uploads").await.unwrap();
        storage.create_dir("nested/dir/").await.unwrap();
        assert!(dir.path().join("uploads").is_dir());
        assert!(dir.path().join("nested/dir").is_dir());
        // creating an existing dir is not an error
        storage.create_dir("uploads").await.unwrap();
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("uploads/cat.jpg"), "uploads/cat.jpg");
        assert_eq!(normalize_key("/uploads//a/b.jpg"), "uploads/a/b.jpg");
        assert_eq!(normalize_key("uploads/dir/"), "uploads/dir/");
        assert_eq!(normalize_key("uploads/./c.jpg"), "uploads/./c.jpg");
        assert_eq!(normalize_key("/"), "");
    }

    #[tokio::test]
    async fn test_absolute_key_stays_under_root() {
        let (dir, storage) = init_storage();
        let key = "uploads//tmp/host/secret.jpg";
        storage.write(key, b"bytes".to_vec()).await.unwrap();

        let actual = storage.get_actual_path(key);
        assert_eq!(actual, dir.path().join("uploads/tmp/host/secret.jpg"));
        assert_eq!(std::fs::read(&actual).unwrap(), b"bytes");
        assert_eq!(
            storage.read("/uploads/tmp/host/secret.jpg").await.unwrap().to_vec(),
            b"bytes".to_vec()
        );
    }

    #[test]
    fn test_get_actual_path() {
        let (dir, storage) = init_storage();
        assert_eq!(
            storage.get_actual_path("uploads/cat.jpg"),
            dir.path().join("uploads/cat.jpg")
        );
    }
}
