// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bundle records: per-bundle state machine, dependency edges and owned assets.
//!
//! ```text
//!   NONE ──async──▶ WAIT_FOR_LOAD ──no local file──▶ DOWNLOADING ──┐
//!    ▲  ╲                 │                                        ▼
//!    │   ╲─sync───────────┴────────local file──────────────▶ LOADING ──▶ LOADED
//!    │                                                             │        │
//!    └──────────────── failure ◀───────────────────────────────────┘        │
//!    └──────────────── eviction (tick) ◀────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use slotmap::new_key_type;
use smallvec::SmallVec;

use crate::asset::AssetRecord;
use crate::coordinator::{BundleCallback, DownloadCallback};
use crate::io::BundleImage;

new_key_type! {
    /// Stable bundle identifier backed by slotmap's generational keys.
    pub struct BundleId;
}

/// Dependency edge list; most bundles have a handful of direct edges
pub type BundleEdges = SmallVec<[BundleId; 4]>;

/// Lifecycle state of a bundle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BundleState {
    /// Never requested, failed, or evicted
    #[default]
    None,
    /// Async load requested; waiting for parents before reading bytes
    WaitForLoad,
    /// Fetching bytes from the remote
    Downloading,
    /// Decoding bytes into an image
    Loading,
    /// Image resident; assets may be extracted
    Loaded,
}

impl BundleState {
    /// An async load owns the bundle right now
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            BundleState::WaitForLoad | BundleState::Downloading | BundleState::Loading
        )
    }
}

/// In-flight download bookkeeping
#[derive(Clone, Copy, Debug)]
pub(crate) struct DownloadTicket {
    pub id: u64,
    pub elapsed: Duration,
}

/// State for one bundle named in the manifest
pub struct BundleRecord {
    name: Arc<str>,
    file_name: String,
    pub(crate) state: BundleState,
    pub(crate) parents: BundleEdges,
    pub(crate) children: BundleEdges,
    pub(crate) assets: AHashMap<String, AssetRecord>,
    pub(crate) image: Option<Arc<dyn BundleImage>>,
    /// Bumped on every successful load; handles carry it
    pub(crate) generation: u32,
    pub(crate) pending_load: Vec<BundleCallback>,
    pub(crate) pending_download: Vec<DownloadCallback>,
    pub(crate) download: Option<DownloadTicket>,
    /// Parents an async load is still waiting on
    pub(crate) unresolved_parents: usize,
    pub(crate) failed_parent: Option<String>,
    /// Remaining debounce before eviction; `None` when not counting
    pub(crate) unload_deadline: Option<Duration>,
}

impl BundleRecord {
    pub(crate) fn new<I, S>(name: &str, file_name: String, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let assets = assets
            .into_iter()
            .map(|asset| {
                let asset = asset.as_ref();
                (asset.to_string(), AssetRecord::new(asset))
            })
            .collect();

        Self {
            name: Arc::from(name),
            file_name,
            state: BundleState::None,
            parents: BundleEdges::new(),
            children: BundleEdges::new(),
            assets,
            image: None,
            generation: 0,
            pending_load: Vec::new(),
            pending_download: Vec::new(),
            download: None,
            unresolved_parents: 0,
            failed_parent: None,
            unload_deadline: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        self.name.clone()
    }

    /// File name in local storage and on the remote
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn state(&self) -> BundleState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state == BundleState::Loaded
    }

    /// Bundles this one requires, in manifest order
    pub fn parents(&self) -> &[BundleId] {
        &self.parents
    }

    /// Bundles that require this one
    pub fn children(&self) -> &[BundleId] {
        &self.children
    }

    pub fn asset(&self, name: &str) -> Option<&AssetRecord> {
        self.assets.get(name)
    }

    pub fn asset_names(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }

    pub fn image(&self) -> Option<&Arc<dyn BundleImage>> {
        self.image.as_ref()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn unload_deadline(&self) -> Option<Duration> {
        self.unload_deadline
    }

    pub fn is_downloading(&self) -> bool {
        self.download.is_some()
    }

    /// Every owned asset has no live handle and no queued request
    pub fn assets_idle(&self) -> bool {
        self.assets.values().all(AssetRecord::is_idle)
    }

    pub(crate) fn add_child(&mut self, child: BundleId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn add_parent(&mut self, parent: BundleId) {
        if !self.parents.contains(&parent) {
            self.parents.push(parent);
        }
    }

    /// LOADING/WAIT_FOR_LOAD → LOADED
    pub(crate) fn install_image(&mut self, image: Arc<dyn BundleImage>) {
        self.image = Some(image);
        self.state = BundleState::Loaded;
        self.generation = self.generation.wrapping_add(1);
        self.unload_deadline = None;
        self.failed_parent = None;
    }

    /// LOADED → NONE: drop the image and everything extracted from it
    pub(crate) fn release_image(&mut self) -> Option<Arc<dyn BundleImage>> {
        self.state = BundleState::None;
        self.unload_deadline = None;
        for asset in self.assets.values_mut() {
            asset.reset();
        }
        self.image.take()
    }

    /// In-flight load failed; back to an inert, retryable state
    pub(crate) fn mark_failed(&mut self) {
        self.state = BundleState::None;
        self.image = None;
        self.unresolved_parents = 0;
        self.failed_parent = None;
    }

    pub(crate) fn cancel_unload(&mut self) {
        self.unload_deadline = None;
    }
}

impl std::fmt::Debug for BundleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleRecord")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("parents", &self.parents.len())
            .field("children", &self.children.len())
            .field("assets", &self.assets.len())
            .field("generation", &self.generation)
            .field("unload_deadline", &self.unload_deadline)
            .finish()
    }
}
