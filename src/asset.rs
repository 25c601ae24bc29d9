//! Per-asset state inside a bundle, and the handles handed to callers.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::bundle::BundleId;
use crate::coordinator::AssetCallback;
use crate::io::AssetData;

/// Load state of one asset within its bundle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetState {
    /// Not extracted from the bundle image
    Unloaded,
    /// Async request queued (waiting for the bundle or for extraction)
    Loading,
    /// Extracted; at least one handle is outstanding
    Loaded,
}

/// Bookkeeping for one named asset, created from the manifest and never
/// destroyed. Cycles between unloaded and loaded any number of times.
pub struct AssetRecord {
    name: Arc<str>,
    state: AssetState,
    use_count: u32,
    data: Option<AssetData>,
    pending: Vec<AssetCallback>,
}

impl AssetRecord {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            state: AssetState::Unloaded,
            use_count: 0,
            data: None,
            pending: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn state(&self) -> AssetState {
        self.state
    }

    /// Number of live handles
    pub fn use_count(&self) -> u32 {
        self.use_count
    }

    pub fn is_in_use(&self) -> bool {
        self.use_count > 0
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// No live handles and no queued requests
    pub fn is_idle(&self) -> bool {
        self.use_count == 0 && self.pending.is_empty()
    }

    pub(crate) fn cached(&self) -> Option<&AssetData> {
        self.data.as_ref()
    }

    /// Queue a continuation; returns true if it is the first outstanding one
    pub(crate) fn push_pending(&mut self, callback: AssetCallback) -> bool {
        self.pending.push(callback);
        if self.pending.len() == 1 {
            self.state = if self.use_count > 0 {
                AssetState::Loaded
            } else {
                AssetState::Loading
            };
            true
        } else {
            false
        }
    }

    pub(crate) fn take_pending(&mut self) -> Vec<AssetCallback> {
        if self.state == AssetState::Loading && self.use_count == 0 {
            self.state = AssetState::Unloaded;
        }
        std::mem::take(&mut self.pending)
    }

    /// Record a new live handle over `data`
    pub(crate) fn acquire(&mut self, data: AssetData) {
        self.data = Some(data);
        self.use_count += 1;
        self.state = AssetState::Loaded;
    }

    /// Drop one live handle; returns true when the asset became unused
    pub(crate) fn release(&mut self) -> bool {
        self.use_count = self.use_count.saturating_sub(1);
        if self.use_count == 0 {
            self.data = None;
            if self.pending.is_empty() {
                self.state = AssetState::Unloaded;
            } else {
                self.state = AssetState::Loading;
            }
            true
        } else {
            false
        }
    }

    /// Forget everything extracted from the (now released) bundle image
    pub(crate) fn reset(&mut self) {
        self.state = AssetState::Unloaded;
        self.use_count = 0;
        self.data = None;
    }
}

impl fmt::Debug for AssetRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetRecord")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("use_count", &self.use_count)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// One live reference to an extracted asset.
///
/// Every handle returned by a load counts once against its asset; hand it
/// back through [`crate::LoadCoordinator::unload_asset`] to release it. The
/// payload itself may be cloned out freely with [`AssetHandle::data`].
pub struct AssetHandle {
    owner: u64,
    bundle: BundleId,
    generation: u32,
    bundle_name: Arc<str>,
    asset_name: Arc<str>,
    data: AssetData,
}

impl AssetHandle {
    pub(crate) fn new(
        owner: u64,
        bundle: BundleId,
        generation: u32,
        bundle_name: Arc<str>,
        asset_name: Arc<str>,
        data: AssetData,
    ) -> Self {
        Self {
            owner,
            bundle,
            generation,
            bundle_name,
            asset_name,
            data,
        }
    }

    /// Id of the coordinator that issued this handle
    pub fn owner(&self) -> u64 {
        self.owner
    }

    pub fn bundle_id(&self) -> BundleId {
        self.bundle
    }

    /// Load generation of the owning bundle this handle was issued under
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn bundle_name(&self) -> &str {
        &self.bundle_name
    }

    pub fn asset_name(&self) -> &str {
        &self.asset_name
    }

    pub fn data(&self) -> &AssetData {
        &self.data
    }

    /// Typed view of the payload
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }
}

impl fmt::Debug for AssetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetHandle")
            .field("bundle", &self.bundle_name)
            .field("asset", &self.asset_name)
            .field("generation", &self.generation)
            .finish()
    }
}
