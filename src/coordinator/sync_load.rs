//! Blocking load path

use std::sync::Arc;

use tracing::{info, warn};

#[cfg(feature = "profiling")]
use tracing::info_span;

use super::LoadCoordinator;
use crate::asset::AssetHandle;
use crate::bundle::{BundleId, BundleState};
use crate::error::{BundleError, Result};
use crate::io::BundleImage;

impl LoadCoordinator {
    /// Load a bundle and, depth-first, every bundle it depends on, blocking
    /// the caller until decoded.
    ///
    /// Fails without touching state if the platform cannot read local files
    /// synchronously, or if the bundle (or a dependency) is mid async load.
    pub fn load_bundle_sync(&mut self, name: &str) -> Result<Arc<dyn BundleImage>> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("bundles.load_sync", bundle = name).entered();

        let id = self.lookup(name)?;
        if !self.config.sync_loads {
            warn!(bundle = %name, "synchronous load on a platform without blocking reads");
            return Err(BundleError::SyncLoadUnsupported(name.to_string()));
        }
        self.load_bundle_sync_by_id(id)
    }

    /// Load the owning bundle synchronously if needed, then extract the asset
    pub fn load_asset_sync(&mut self, bundle: &str, asset: &str) -> Result<AssetHandle> {
        let id = self.lookup_asset(bundle, asset)?;
        let image = self.load_bundle_sync(bundle)?;

        let cached = self
            .registry
            .get(id)
            .and_then(|r| r.asset(asset))
            .and_then(|a| a.cached().cloned());
        let data = match cached {
            Some(data) => data,
            None => {
                let Some(data) = image.extract(asset) else {
                    warn!(%bundle, %asset, "asset listed in manifest but absent from image");
                    self.check_unload(id);
                    return Err(BundleError::AssetMissingFromImage {
                        bundle: bundle.to_string(),
                        asset: asset.to_string(),
                    });
                };
                self.stats.assets_extracted += 1;
                data
            }
        };
        self.acquire_asset(id, asset, data)
    }

    fn load_bundle_sync_by_id(&mut self, id: BundleId) -> Result<Arc<dyn BundleImage>> {
        let Some(record) = self.registry.get_mut(id) else {
            return Err(BundleError::UnknownBundle(format!("{id:?}")));
        };

        match record.state() {
            BundleState::Loaded => {
                if let Some(image) = record.image().cloned() {
                    record.cancel_unload();
                    return Ok(image);
                }
            }
            state if state.is_in_flight() => {
                warn!(bundle = %record.name(), ?state, "sync load requested during async load");
                return Err(BundleError::StateConflict {
                    bundle: record.name().to_string(),
                    state,
                    operation: "synchronously load",
                });
            }
            _ => {}
        }

        let name = record.name().to_string();
        let file_name = record.file_name().to_string();
        let parents = record.parents.clone();

        for parent in parents {
            if let Err(err) = self.load_bundle_sync_by_id(parent) {
                let dependency = self.bundle_name(parent);
                warn!(bundle = %name, %dependency, error = %err, "dependency failed to load");
                self.release_parents(id);
                return Err(match err {
                    BundleError::StateConflict { .. } => err,
                    _ => BundleError::DependencyFailed {
                        bundle: name,
                        dependency,
                    },
                });
            }
        }

        let Some(path) = self.storage.try_get_local_path(&file_name) else {
            warn!(bundle = %name, file = %file_name, "no local copy for sync load");
            self.release_parents(id);
            return Err(BundleError::NotLocal(name));
        };

        if let Some(record) = self.registry.get_mut(id) {
            record.state = BundleState::Loading;
        }
        self.stats.decode_jobs += 1;

        let decoded = match self.storage.read_bytes(&path) {
            Ok(bytes) => self
                .decoder
                .decode(&name, &bytes)
                .map_err(|reason| BundleError::DecodeFailed {
                    bundle: name.clone(),
                    reason,
                }),
            Err(err) => Err(BundleError::DecodeFailed {
                bundle: name.clone(),
                reason: format!("{}: {err}", path.display()),
            }),
        };

        let Some(record) = self.registry.get_mut(id) else {
            return Err(BundleError::UnknownBundle(name));
        };
        match decoded {
            Ok(image) => {
                record.install_image(image.clone());
                self.stats.bundles_loaded += 1;
                info!(bundle = %name, generation = record.generation, "bundle loaded (sync)");
                Ok(image)
            }
            Err(err) => {
                record.mark_failed();
                self.stats.load_failures += 1;
                warn!(bundle = %name, error = %err, "bundle load failed (sync)");
                self.release_parents(id);
                Err(err)
            }
        }
    }
}
