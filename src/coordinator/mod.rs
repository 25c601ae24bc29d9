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

//! LoadCoordinator: owns the bundle registry and drives every load, download
//! and eviction.
//!
//! All record mutation happens on the thread that owns the coordinator.
//! Background jobs report back over a channel which [`LoadCoordinator::pump`]
//! drains; [`LoadCoordinator::tick`] pumps, ages download watchdogs and
//! advances eviction countdowns. Eviction never happens anywhere else.

mod async_load;
mod download;
mod eviction;
mod sync_load;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use tracing::{debug, warn};

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::asset::AssetHandle;
use crate::bundle::{BundleId, BundleState};
use crate::config::LoaderConfig;
use crate::error::{BundleError, Result};
use crate::graph::{BundleRegistry, DependencyGraphBuilder};
use crate::io::{
    BundleDecoder, BundleImage, Fetcher, LocalStorage, MemoryStorage, OfflineFetcher,
    PackedBundleDecoder,
};
use crate::manifest::Manifest;
use crate::runner::{Completion, InlineRunner, JobRunner};

/// Process-unique coordinator id, stamped into every handle it issues
fn next_owner_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Continuation for a bundle load
pub type BundleCallback = Box<dyn FnOnce(&mut LoadCoordinator, Result<Arc<dyn BundleImage>>)>;

/// Continuation for an asset load
pub type AssetCallback = Box<dyn FnOnce(&mut LoadCoordinator, Result<AssetHandle>)>;

/// Continuation for a download
pub type DownloadCallback = Box<dyn FnOnce(&mut LoadCoordinator, Result<Arc<Vec<u8>>>)>;

/// Loader counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LoaderStats {
    pub bundles_loaded: u64,
    pub bundles_evicted: u64,
    pub load_failures: u64,
    pub downloads_started: u64,
    pub downloads_failed: u64,
    pub decode_jobs: u64,
    pub assets_extracted: u64,
}

/// Collaborators and config for a [`LoadCoordinator`]
pub struct LoadCoordinatorBuilder {
    manifest: Manifest,
    config: LoaderConfig,
    storage: Arc<dyn LocalStorage>,
    fetcher: Arc<dyn Fetcher>,
    decoder: Arc<dyn BundleDecoder>,
    runner: Arc<dyn JobRunner>,
}

impl LoadCoordinatorBuilder {
    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn storage(mut self, storage: Arc<dyn LocalStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn BundleDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn runner(mut self, runner: Arc<dyn JobRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Build the dependency graph and the coordinator
    pub fn build(self) -> Result<LoadCoordinator> {
        self.config.validate()?;
        let registry = DependencyGraphBuilder::build(&self.manifest, &self.config)?;
        let (completions_tx, completions_rx) = unbounded();

        Ok(LoadCoordinator {
            id: next_owner_id(),
            config: self.config,
            registry,
            storage: self.storage,
            fetcher: self.fetcher,
            decoder: self.decoder,
            runner: self.runner,
            completions_tx,
            completions_rx,
            in_flight: 0,
            next_ticket: 1,
            stats: LoaderStats::default(),
        })
    }
}

/// Global bundle registry plus the sync/async load pipelines
pub struct LoadCoordinator {
    id: u64,
    config: LoaderConfig,
    registry: BundleRegistry,
    storage: Arc<dyn LocalStorage>,
    fetcher: Arc<dyn Fetcher>,
    decoder: Arc<dyn BundleDecoder>,
    runner: Arc<dyn JobRunner>,
    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
    /// Jobs spawned whose completion has not been pumped yet
    in_flight: usize,
    next_ticket: u64,
    stats: LoaderStats,
}

impl LoadCoordinator {
    /// Start building a coordinator over `manifest`.
    ///
    /// Defaults: [`LoaderConfig::default`], [`MemoryStorage`], an offline
    /// fetcher, [`PackedBundleDecoder`] and [`InlineRunner`].
    pub fn builder(manifest: Manifest) -> LoadCoordinatorBuilder {
        LoadCoordinatorBuilder {
            manifest,
            config: LoaderConfig::default(),
            storage: Arc::new(MemoryStorage::new()),
            fetcher: Arc::new(OfflineFetcher),
            decoder: Arc::new(PackedBundleDecoder),
            runner: Arc::new(InlineRunner),
        }
    }

    /// Process-unique id; handles issued by another coordinator are rejected
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn registry(&self) -> &BundleRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &LoaderStats {
        &self.stats
    }

    /// No background job is outstanding
    pub fn is_idle(&self) -> bool {
        self.in_flight == 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn bundle_state(&self, name: &str) -> Option<BundleState> {
        self.registry.by_name(name).map(|r| r.state())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.bundle_state(name) == Some(BundleState::Loaded)
    }

    /// Live handles outstanding for an asset
    pub fn asset_use_count(&self, bundle: &str, asset: &str) -> Option<u32> {
        self.registry
            .by_name(bundle)
            .and_then(|r| r.asset(asset))
            .map(|a| a.use_count())
    }

    /// Remaining debounce before eviction, if counting
    pub fn pending_unload(&self, name: &str) -> Option<Duration> {
        self.registry
            .by_name(name)
            .and_then(|r| r.unload_deadline())
    }

    /// Bundle names in manifest order
    pub fn bundle_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.registry.iter().map(|(_, r)| r.name())
    }

    /// Direct dependencies of a bundle
    pub fn dependencies_of(&self, name: &str) -> Option<Vec<&str>> {
        let record = self.registry.by_name(name)?;
        Some(self.names(record.parents()))
    }

    /// Bundles that directly depend on a bundle
    pub fn dependents_of(&self, name: &str) -> Option<Vec<&str>> {
        let record = self.registry.by_name(name)?;
        Some(self.names(record.children()))
    }

    /// Bundle owning an asset name (first match in manifest order)
    pub fn asset_owner(&self, asset: &str) -> Option<&str> {
        self.registry
            .asset_owner(asset)
            .and_then(|id| self.registry.get(id))
            .map(|r| r.name())
    }

    /// Per-frame entry point: apply finished jobs, age downloads, then run
    /// eviction countdowns.
    pub fn tick(&mut self, delta: Duration) {
        #[cfg(feature = "profiling")]
        let _span = info_span!("bundles.tick", delta_ms = delta.as_millis() as u64).entered();

        self.pump();
        self.age_downloads(delta);
        self.advance_unloads(delta);
    }

    /// Apply every completion that background jobs have reported so far.
    ///
    /// Completions may spawn further jobs; with [`InlineRunner`] those report
    /// immediately and are applied in the same pump.
    pub fn pump(&mut self) -> usize {
        #[cfg(feature = "profiling")]
        let _span = info_span!("bundles.pump", in_flight = self.in_flight).entered();

        let mut applied = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            applied += 1;
            match completion {
                Completion::Decoded { bundle, result } => self.on_decoded(bundle, result),
                Completion::Downloaded {
                    bundle,
                    ticket,
                    result,
                } => self.on_downloaded(bundle, ticket, result),
                Completion::Extracted {
                    bundle,
                    generation,
                    asset,
                    data,
                } => self.on_extracted(bundle, generation, asset, data),
            }
        }
        applied
    }

    fn names(&self, ids: &[BundleId]) -> Vec<&str> {
        ids.iter()
            .filter_map(|&id| self.registry.get(id))
            .map(|r| r.name())
            .collect()
    }

    fn lookup(&self, name: &str) -> Result<BundleId> {
        self.registry.id(name).ok_or_else(|| {
            warn!(bundle = %name, "unknown bundle requested");
            BundleError::UnknownBundle(name.to_string())
        })
    }

    fn lookup_asset(&self, bundle: &str, asset: &str) -> Result<BundleId> {
        let id = self.lookup(bundle)?;
        let listed = self
            .registry
            .get(id)
            .is_some_and(|r| r.asset(asset).is_some());
        if listed {
            Ok(id)
        } else {
            warn!(%bundle, %asset, "unknown asset requested");
            Err(BundleError::UnknownAsset {
                bundle: bundle.to_string(),
                asset: asset.to_string(),
            })
        }
    }

    fn bundle_name(&self, id: BundleId) -> String {
        self.registry
            .get(id)
            .map(|r| r.name().to_string())
            .unwrap_or_else(|| format!("{id:?}"))
    }

    /// Register a new live handle on an asset whose bundle is loaded
    fn acquire_asset(
        &mut self,
        id: BundleId,
        asset: &str,
        data: crate::io::AssetData,
    ) -> Result<AssetHandle> {
        let Some(record) = self.registry.get_mut(id) else {
            return Err(BundleError::UnknownBundle(format!("{id:?}")));
        };
        record.cancel_unload();
        let generation = record.generation;
        let bundle_name = record.shared_name();
        let Some(asset_record) = record.assets.get_mut(asset) else {
            return Err(BundleError::UnknownAsset {
                bundle: bundle_name.to_string(),
                asset: asset.to_string(),
            });
        };
        asset_record.acquire(data.clone());
        debug!(bundle = %bundle_name, %asset, uses = asset_record.use_count(), "asset acquired");
        Ok(AssetHandle::new(
            self.id,
            id,
            generation,
            bundle_name,
            asset_record.shared_name(),
            data,
        ))
    }

    fn spawn_job(&mut self, job: crate::runner::Job) {
        self.in_flight += 1;
        self.runner.spawn(job);
    }
}
