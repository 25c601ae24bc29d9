//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use archetype_bundle::prelude::*;
//! ```

pub use crate::asset::AssetHandle;
pub use crate::bundle::BundleState;
pub use crate::config::LoaderConfig;
pub use crate::coordinator::{LoadCoordinator, LoaderStats};
pub use crate::error::{BundleError, Result};
pub use crate::io::{
    BundleDecoder, BundleImage, Fetcher, FsStorage, LocalStorage, MemoryStorage, MirrorFetcher,
    PackedBundle, PackedBundleDecoder,
};
pub use crate::manifest::{Manifest, ManifestEntry};
pub use crate::runner::{InlineRunner, JobRunner};

#[cfg(feature = "parallel")]
pub use crate::runner::ThreadPoolRunner;
