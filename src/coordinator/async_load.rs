//! Non-blocking load path.
//!
//! A bundle's async load runs WAIT_FOR_LOAD → (DOWNLOADING) → LOADING →
//! LOADED/NONE. Only the first request for a bundle starts that pipeline;
//! later requests queue behind it and are drained in registration order.

use std::path::PathBuf;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, info, warn};

use super::{AssetCallback, BundleCallback, LoadCoordinator};
use crate::asset::AssetHandle;
use crate::bundle::{BundleId, BundleState};
use crate::error::{BundleError, Result};
use crate::io::{AssetData, BundleImage};
use crate::runner::Completion;

/// Where a decode job gets its bytes
enum DecodeSource {
    Local(PathBuf),
    Downloaded(Arc<Vec<u8>>),
}

impl LoadCoordinator {
    /// Request a bundle without blocking.
    ///
    /// `callback` runs exactly once: immediately if the bundle is already
    /// loaded (or the name is unknown), otherwise from a later pump once the
    /// single in-flight load for this bundle finishes.
    pub fn load_bundle_async<F>(&mut self, name: &str, callback: F)
    where
        F: FnOnce(&mut LoadCoordinator, Result<Arc<dyn BundleImage>>) + 'static,
    {
        match self.lookup(name) {
            Ok(id) => self.request_bundle(id, Box::new(callback)),
            Err(err) => callback(self, Err(err)),
        }
    }

    /// Request an asset without blocking.
    ///
    /// Queues behind any outstanding request for the same asset; triggers an
    /// async load of the owning bundle if it is not resident.
    pub fn load_asset_async<F>(&mut self, bundle: &str, asset: &str, callback: F)
    where
        F: FnOnce(&mut LoadCoordinator, Result<AssetHandle>) + 'static,
    {
        let id = match self.lookup_asset(bundle, asset) {
            Ok(id) => id,
            Err(err) => return callback(self, Err(err)),
        };
        let callback: AssetCallback = Box::new(callback);

        let Some(record) = self.registry.get_mut(id) else {
            return callback(self, Err(BundleError::UnknownBundle(bundle.to_string())));
        };
        let loaded = record.is_loaded();
        let Some(asset_record) = record.assets.get_mut(asset) else {
            return callback(
                self,
                Err(BundleError::UnknownAsset {
                    bundle: bundle.to_string(),
                    asset: asset.to_string(),
                }),
            );
        };

        // Already extracted and nobody queued ahead: hand out another handle now
        if loaded && !asset_record.has_pending() {
            if let Some(data) = asset_record.cached().cloned() {
                let handle = self.acquire_asset(id, asset, data);
                return callback(self, handle);
            }
        }

        if !asset_record.push_pending(callback) {
            debug!(%bundle, %asset, "asset request coalesced");
            return;
        }

        if loaded {
            self.spawn_extract(id, asset.to_string());
        } else {
            let asset = asset.to_string();
            self.request_bundle(
                id,
                Box::new(move |coordinator, result| {
                    coordinator.on_asset_bundle_ready(id, asset, result)
                }),
            );
        }
    }

    pub(crate) fn request_bundle(&mut self, id: BundleId, callback: BundleCallback) {
        let Some(record) = self.registry.get_mut(id) else {
            return callback(self, Err(BundleError::UnknownBundle(format!("{id:?}"))));
        };

        match record.state() {
            BundleState::Loaded => {
                record.cancel_unload();
                match record.image().cloned() {
                    Some(image) => callback(self, Ok(image)),
                    None => {
                        let name = record.name().to_string();
                        callback(
                            self,
                            Err(BundleError::DecodeFailed {
                                bundle: name,
                                reason: "loaded bundle has no image".to_string(),
                            }),
                        )
                    }
                }
            }
            state if state.is_in_flight() => {
                record.pending_load.push(callback);
                debug!(
                    bundle = %record.name(),
                    ?state,
                    queued = record.pending_load.len(),
                    "bundle request coalesced"
                );
            }
            _ => {
                record.pending_load.push(callback);
                record.state = BundleState::WaitForLoad;
                debug!(bundle = %record.name(), "bundle queued for async load");
                self.begin_async_load(id);
            }
        }
    }

    /// WAIT_FOR_LOAD: make sure every parent is loaded before touching bytes
    fn begin_async_load(&mut self, id: BundleId) {
        let Some(record) = self.registry.get(id) else {
            return;
        };
        let parents = record.parents.clone();

        let mut waiting: SmallVec<[BundleId; 4]> = SmallVec::new();
        for parent in parents {
            match self.registry.get_mut(parent) {
                Some(p) if p.is_loaded() => p.cancel_unload(),
                Some(_) => waiting.push(parent),
                None => {}
            }
        }

        if waiting.is_empty() {
            self.start_fetch(id);
            return;
        }

        if let Some(record) = self.registry.get_mut(id) {
            record.unresolved_parents = waiting.len();
        }
        for parent in waiting {
            self.request_bundle(
                parent,
                Box::new(move |coordinator, result| {
                    coordinator.on_parent_ready(id, parent, result.map(|_| ()))
                }),
            );
        }
    }

    fn on_parent_ready(&mut self, id: BundleId, parent: BundleId, result: Result<()>) {
        let parent_name = self.bundle_name(parent);
        let Some(record) = self.registry.get_mut(id) else {
            return;
        };
        if record.state() != BundleState::WaitForLoad {
            return;
        }

        if let Err(err) = result {
            warn!(bundle = %record.name(), dependency = %parent_name, error = %err, "dependency failed");
            record.failed_parent.get_or_insert(parent_name);
        }
        record.unresolved_parents = record.unresolved_parents.saturating_sub(1);
        if record.unresolved_parents > 0 {
            return;
        }

        match record.failed_parent.take() {
            Some(dependency) => {
                let bundle = record.name().to_string();
                self.finish_load(id, Err(BundleError::DependencyFailed { bundle, dependency }));
            }
            None => self.start_fetch(id),
        }
    }

    /// Parents are loaded: decode the local copy, or download it first
    fn start_fetch(&mut self, id: BundleId) {
        let Some(record) = self.registry.get_mut(id) else {
            return;
        };
        let file_name = record.file_name().to_string();

        match self.storage.try_get_local_path(&file_name) {
            Some(path) => {
                record.state = BundleState::Loading;
                self.spawn_decode(id, DecodeSource::Local(path));
            }
            None => {
                record.state = BundleState::Downloading;
                debug!(bundle = %record.name(), file = %file_name, "no local copy; downloading");
                self.request_download(
                    id,
                    Box::new(move |coordinator, result| {
                        coordinator.on_bundle_downloaded(id, result)
                    }),
                );
            }
        }
    }

    fn on_bundle_downloaded(&mut self, id: BundleId, result: Result<Arc<Vec<u8>>>) {
        let Some(record) = self.registry.get_mut(id) else {
            return;
        };
        if record.state() != BundleState::Downloading {
            return;
        }
        match result {
            Ok(bytes) => {
                record.state = BundleState::Loading;
                self.spawn_decode(id, DecodeSource::Downloaded(bytes));
            }
            Err(err) => self.finish_load(id, Err(err)),
        }
    }

    fn spawn_decode(&mut self, id: BundleId, source: DecodeSource) {
        let Some(record) = self.registry.get(id) else {
            return;
        };
        let name = record.shared_name();
        let storage = self.storage.clone();
        let decoder = self.decoder.clone();
        let tx = self.completions_tx.clone();
        self.stats.decode_jobs += 1;

        self.spawn_job(Box::new(move || {
            let result = match source {
                DecodeSource::Local(path) => storage
                    .read_bytes(&path)
                    .map_err(|e| format!("{}: {e}", path.display()))
                    .and_then(|bytes| decoder.decode(&name, &bytes)),
                DecodeSource::Downloaded(bytes) => decoder.decode(&name, &bytes),
            };
            let _ = tx.send(Completion::Decoded { bundle: id, result });
        }));
    }

    pub(super) fn on_decoded(
        &mut self,
        id: BundleId,
        result: std::result::Result<Arc<dyn BundleImage>, String>,
    ) {
        let result = result.map_err(|reason| BundleError::DecodeFailed {
            bundle: self.bundle_name(id),
            reason,
        });
        self.finish_load(id, result);
    }

    /// LOADING → LOADED or NONE; drain every queued continuation in order
    fn finish_load(&mut self, id: BundleId, result: Result<Arc<dyn BundleImage>>) {
        let Some(record) = self.registry.get_mut(id) else {
            return;
        };

        match &result {
            Ok(image) => {
                record.install_image(image.clone());
                self.stats.bundles_loaded += 1;
                info!(bundle = %record.name(), generation = record.generation, "bundle loaded");
            }
            Err(err) => {
                record.mark_failed();
                self.stats.load_failures += 1;
                warn!(bundle = %record.name(), error = %err, "bundle load failed");
            }
        }

        let callbacks = std::mem::take(&mut record.pending_load);
        if result.is_err() {
            self.release_parents(id);
        }
        for callback in callbacks {
            callback(self, result.clone());
        }
    }

    fn on_asset_bundle_ready(
        &mut self,
        id: BundleId,
        asset: String,
        result: Result<Arc<dyn BundleImage>>,
    ) {
        match result {
            Ok(_) => self.spawn_extract(id, asset),
            Err(err) => self.fail_asset(id, &asset, err),
        }
    }

    fn spawn_extract(&mut self, id: BundleId, asset: String) {
        let Some(record) = self.registry.get(id) else {
            return;
        };
        let Some(image) = record.image().cloned() else {
            let err = BundleError::StateConflict {
                bundle: record.name().to_string(),
                state: record.state(),
                operation: "extract from",
            };
            return self.fail_asset(id, &asset, err);
        };
        let generation = record.generation;
        let tx = self.completions_tx.clone();

        self.spawn_job(Box::new(move || {
            let data = image.extract(&asset);
            let _ = tx.send(Completion::Extracted {
                bundle: id,
                generation,
                asset,
                data,
            });
        }));
    }

    pub(super) fn on_extracted(
        &mut self,
        id: BundleId,
        generation: u32,
        asset: String,
        data: Option<AssetData>,
    ) {
        let Some(record) = self.registry.get(id) else {
            return;
        };
        let bundle = record.name().to_string();

        let data = match data {
            Some(data) if record.is_loaded() && record.generation == generation => data,
            Some(_) => {
                return self.fail_asset(
                    id,
                    &asset,
                    BundleError::StaleHandle { bundle, asset: asset.clone() },
                )
            }
            None => {
                warn!(%bundle, %asset, "asset listed in manifest but absent from image");
                return self.fail_asset(
                    id,
                    &asset,
                    BundleError::AssetMissingFromImage { bundle, asset: asset.clone() },
                );
            }
        };
        self.stats.assets_extracted += 1;

        let callbacks = self.take_asset_pending(id, &asset);
        for callback in callbacks {
            let handle = self.acquire_asset(id, &asset, data.clone());
            callback(self, handle);
        }
    }

    fn fail_asset(&mut self, id: BundleId, asset: &str, err: BundleError) {
        let callbacks = self.take_asset_pending(id, asset);
        for callback in callbacks {
            callback(self, Err(err.clone()));
        }
        self.check_unload(id);
    }

    fn take_asset_pending(&mut self, id: BundleId, asset: &str) -> Vec<AssetCallback> {
        self.registry
            .get_mut(id)
            .and_then(|r| r.assets.get_mut(asset))
            .map(|a| a.take_pending())
            .unwrap_or_default()
    }
}
