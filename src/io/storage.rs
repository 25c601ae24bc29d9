use crate::io::LocalStorage;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};

/// Local storage rooted at a directory on disk
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl LocalStorage for FsStorage {
    fn try_get_local_path(&self, file_name: &str) -> Option<PathBuf> {
        let path = self.root.join(file_name);
        path.is_file().then_some(path)
    }

    fn local_path_for(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    fn read_bytes(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write a sibling file, then rename into place
        let partial = partial_path(path);
        fs::write(&partial, bytes)?;
        fs::rename(&partial, path)
    }
}

/// `ui.ab` -> `ui.ab.partial`
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// In-memory local storage for hosts without a file system
#[derive(Default)]
pub struct MemoryStorage {
    files: RwLock<AHashMap<PathBuf, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file as if it shipped with the client
    pub fn insert(&self, file_name: &str, bytes: Vec<u8>) {
        self.files.write().insert(PathBuf::from(file_name), bytes);
    }

    pub fn remove(&self, file_name: &str) -> bool {
        self.files.write().remove(Path::new(file_name)).is_some()
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.files.read().contains_key(Path::new(file_name))
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl LocalStorage for MemoryStorage {
    fn try_get_local_path(&self, file_name: &str) -> Option<PathBuf> {
        let path = PathBuf::from(file_name);
        self.files.read().contains_key(&path).then_some(path)
    }

    fn local_path_for(&self, file_name: &str) -> PathBuf {
        PathBuf::from(file_name)
    }

    fn read_bytes(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        self.files.read().get(path).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not in memory storage", path.display()),
            )
        })
    }

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        self.files.write().insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_roundtrip() -> std::io::Result<()> {
        let storage = MemoryStorage::new();
        assert!(storage.try_get_local_path("ui.ab").is_none());

        let path = storage.local_path_for("ui.ab");
        storage.write_bytes(&path, &[1, 2, 3])?;

        let found = storage.try_get_local_path("ui.ab");
        assert_eq!(found.as_deref(), Some(path.as_path()));
        assert_eq!(storage.read_bytes(&path)?, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_memory_storage_missing_read() {
        let storage = MemoryStorage::new();
        let err = storage.read_bytes(Path::new("nope")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_fs_storage_write_creates_dirs() -> std::io::Result<()> {
        let root = std::env::temp_dir().join(format!("archetype_bundle_fs_{}", std::process::id()));
        let storage = FsStorage::new(&root);
        assert!(storage.try_get_local_path("nested/ui.ab").is_none());

        let path = storage.local_path_for("nested/ui.ab");
        storage.write_bytes(&path, b"bundle")?;
        assert_eq!(storage.try_get_local_path("nested/ui.ab"), Some(path.clone()));
        assert_eq!(storage.read_bytes(&path)?, b"bundle".to_vec());

        fs::remove_dir_all(&root)?;
        Ok(())
    }

    #[test]
    fn test_partial_path_keeps_extension() {
        assert_eq!(partial_path(Path::new("b/ui.ab")), PathBuf::from("b/ui.ab.partial"));
        assert_ne!(partial_path(Path::new("ui.ab")), partial_path(Path::new("ui.cd")));
        assert_ne!(partial_path(Path::new("x.partial")), PathBuf::from("x.partial"));
    }

    #[test]
    fn test_fs_storage_sibling_extensions_coexist() -> std::io::Result<()> {
        let root = std::env::temp_dir()
            .join(format!("archetype_bundle_fs_ext_{}", std::process::id()));
        let storage = FsStorage::new(&root);

        storage.write_bytes(&storage.local_path_for("ui.ab"), b"ab")?;
        storage.write_bytes(&storage.local_path_for("ui.cd"), b"cd")?;
        storage.write_bytes(&storage.local_path_for("x.partial"), b"x")?;

        assert_eq!(storage.read_bytes(&root.join("ui.ab"))?, b"ab".to_vec());
        assert_eq!(storage.read_bytes(&root.join("ui.cd"))?, b"cd".to_vec());
        assert_eq!(storage.read_bytes(&root.join("x.partial"))?, b"x".to_vec());
        assert!(!root.join("ui.ab.partial").exists());

        fs::remove_dir_all(&root)?;
        Ok(())
    }
}
