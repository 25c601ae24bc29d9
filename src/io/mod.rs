// Collaborator boundary
//
// The loader core never touches files, sockets or bundle formats directly:
// - LocalStorage: where bundle files live on this device
// - Fetcher: how missing bundles are pulled from a remote
// - BundleDecoder / BundleImage: how bytes become extractable assets
//
// All collaborators are `Send + Sync` because they are called from
// background jobs.

pub mod fetch;
pub mod pack;
pub mod storage;

pub use fetch::{MirrorFetcher, OfflineFetcher};
pub use pack::{PackedBundle, PackedBundleDecoder, PackedBundleImage};
pub use storage::{FsStorage, MemoryStorage};

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Type-erased asset payload handed out by a [`BundleImage`]
pub type AssetData = Arc<dyn Any + Send + Sync>;

/// Decoded, in-memory bundle
pub trait BundleImage: Send + Sync + 'static {
    /// Extract one named asset
    fn extract(&self, asset_name: &str) -> Option<AssetData>;

    /// Approximate resident size in bytes
    fn memory_size(&self) -> usize {
        0
    }
}

/// Turns raw bundle bytes into a [`BundleImage`]
pub trait BundleDecoder: Send + Sync + 'static {
    fn decode(&self, bundle_name: &str, bytes: &[u8]) -> Result<Arc<dyn BundleImage>, String>;
}

/// Local bundle file storage
pub trait LocalStorage: Send + Sync + 'static {
    /// Path of an existing local copy, `None` if it must be downloaded
    fn try_get_local_path(&self, file_name: &str) -> Option<PathBuf>;

    /// Path a downloaded file should be written to
    fn local_path_for(&self, file_name: &str) -> PathBuf;

    fn read_bytes(&self, path: &Path) -> std::io::Result<Vec<u8>>;

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()>;
}

/// Remote byte source
pub trait Fetcher: Send + Sync + 'static {
    /// Blocking fetch; runs on a background job
    fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, String>;
}
