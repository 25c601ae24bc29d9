//! Reference release and debounced eviction.
//!
//! Releasing the last handle of a bundle (or a failed dependent letting go
//! of its parents) only arms a countdown. The bundle is evicted by a later
//! tick, after re-checking that nothing claimed it in the meantime.

use tracing::{debug, info, warn};

use super::LoadCoordinator;
use crate::asset::AssetHandle;
use crate::bundle::{BundleId, BundleState};
use crate::error::{BundleError, Result};

impl LoadCoordinator {
    /// Give back a handle from `load_asset_*`.
    ///
    /// The handle must come from this coordinator and belong to the bundle's
    /// current load; a handle that outlived an eviction is rejected.
    pub fn unload_asset(&mut self, handle: AssetHandle) -> Result<()> {
        let id = handle.bundle_id();
        let stale = || BundleError::StaleHandle {
            bundle: handle.bundle_name().to_string(),
            asset: handle.asset_name().to_string(),
        };

        if handle.owner() != self.id {
            warn!(
                bundle = %handle.bundle_name(),
                asset = %handle.asset_name(),
                owner = handle.owner(),
                "handle from another coordinator released"
            );
            return Err(stale());
        }

        let Some(record) = self.registry.get_mut(id) else {
            return Err(stale());
        };
        if !record.is_loaded() || record.generation != handle.generation() {
            warn!(
                bundle = %handle.bundle_name(),
                asset = %handle.asset_name(),
                "stale handle released"
            );
            return Err(stale());
        }
        let Some(asset) = record.assets.get_mut(handle.asset_name()) else {
            return Err(stale());
        };
        if !asset.is_in_use() {
            return Err(stale());
        }

        let unused = asset.release();
        debug!(
            bundle = %handle.bundle_name(),
            asset = %handle.asset_name(),
            uses = asset.use_count(),
            "asset released"
        );
        if unused {
            self.check_unload(id);
        }
        Ok(())
    }

    /// Ask for a bundle to be evicted once it is unreferenced.
    ///
    /// Arms the same countdown as releasing the last asset; an unloaded
    /// bundle is a no-op.
    pub fn unload_bundle(&mut self, name: &str) -> Result<()> {
        let id = self.lookup(name)?;
        let Some(record) = self.registry.get(id) else {
            return Err(BundleError::UnknownBundle(name.to_string()));
        };

        match record.state() {
            BundleState::None => {
                debug!(bundle = %name, "unload of a bundle that is not loaded");
                return Ok(());
            }
            state if state.is_in_flight() => {
                return Err(BundleError::StateConflict {
                    bundle: name.to_string(),
                    state,
                    operation: "unload",
                });
            }
            _ => {}
        }

        if !record.assets_idle() {
            let busy = record.assets.values().filter(|a| !a.is_idle()).count();
            return Err(BundleError::UnloadRefused {
                bundle: name.to_string(),
                reason: format!("{busy} assets still in use"),
            });
        }
        if let Some(child) = self.registry.blocking_child(id) {
            return Err(BundleError::UnloadRefused {
                bundle: name.to_string(),
                reason: format!("dependent '{}' still loaded", child.name()),
            });
        }

        self.check_unload(id);
        Ok(())
    }

    /// Arm the eviction countdown if the bundle is unreferenced and not
    /// already counting.
    pub(crate) fn check_unload(&mut self, id: BundleId) {
        if !self.registry.can_unload(id) {
            return;
        }
        let delay = self.config.unload_delay();
        if let Some(record) = self.registry.get_mut(id) {
            if record.unload_deadline.is_none() {
                record.unload_deadline = Some(delay);
                debug!(bundle = %record.name(), ?delay, "unload scheduled");
            }
        }
    }

    pub(super) fn advance_unloads(&mut self, delta: std::time::Duration) {
        let mut expired = Vec::new();
        for id in self.registry.ids().to_vec() {
            let Some(record) = self.registry.get_mut(id) else {
                continue;
            };
            let Some(remaining) = record.unload_deadline else {
                continue;
            };
            let remaining = remaining.saturating_sub(delta);
            if remaining.is_zero() {
                record.unload_deadline = None;
                expired.push(id);
            } else {
                record.unload_deadline = Some(remaining);
            }
        }

        for id in expired {
            if self.registry.can_unload(id) {
                self.evict(id);
            } else {
                debug!(bundle = %self.bundle_name(id), "unload cancelled; bundle back in use");
            }
        }
    }

    /// LOADED → NONE
    fn evict(&mut self, id: BundleId) {
        let Some(record) = self.registry.get_mut(id) else {
            return;
        };
        let image = record.release_image();
        let size = image.as_ref().map_or(0, |i| i.memory_size());
        self.stats.bundles_evicted += 1;
        info!(bundle = %record.name(), bytes = size, "bundle evicted");

        self.release_parents(id);
    }

    /// `id` no longer needs its dependencies resident
    pub(crate) fn release_parents(&mut self, id: BundleId) {
        let parents = self
            .registry
            .get(id)
            .map(|r| r.parents.clone())
            .unwrap_or_default();
        for parent in parents {
            self.check_unload(parent);
        }
    }
}
