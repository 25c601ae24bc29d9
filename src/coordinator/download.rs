//! Remote fetch of bundles with no local copy.
//!
//! At most one fetch per bundle is outstanding; its ticket is aged by
//! [`LoadCoordinator::tick`]. When the ticket expires every waiter is told
//! [`BundleError::DownloadTimedOut`] and the fetch, if it ever reports, is
//! discarded.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{DownloadCallback, LoadCoordinator};
use crate::bundle::{BundleId, DownloadTicket};
use crate::error::{BundleError, Result};
use crate::runner::Completion;

impl LoadCoordinator {
    /// Fetch a bundle's file into local storage without decoding it.
    ///
    /// A bundle that already has a readable local copy is not fetched: the
    /// callback runs immediately with the stored bytes.
    pub fn download_bundle<F>(&mut self, name: &str, callback: F)
    where
        F: FnOnce(&mut LoadCoordinator, Result<Arc<Vec<u8>>>) + 'static,
    {
        let id = match self.lookup(name) {
            Ok(id) => id,
            Err(err) => return callback(self, Err(err)),
        };
        if let Some(bytes) = self.read_local(id) {
            debug!(bundle = %name, bytes = bytes.len(), "download skipped, local copy present");
            return callback(self, Ok(Arc::new(bytes)));
        }
        self.request_download(id, Box::new(callback))
    }

    /// Bytes of the bundle's local copy, if one exists and reads cleanly
    fn read_local(&self, id: BundleId) -> Option<Vec<u8>> {
        let record = self.registry.get(id)?;
        let path = self.storage.try_get_local_path(record.file_name())?;
        match self.storage.read_bytes(&path) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(bundle = %record.name(), path = %path.display(), error = %err, "local copy unreadable, fetching");
                None
            }
        }
    }

    pub(crate) fn request_download(&mut self, id: BundleId, callback: DownloadCallback) {
        let Some(record) = self.registry.get_mut(id) else {
            return callback(self, Err(BundleError::UnknownBundle(format!("{id:?}"))));
        };

        record.pending_download.push(callback);
        if record.download.is_some() {
            debug!(
                bundle = %record.name(),
                queued = record.pending_download.len(),
                "download coalesced"
            );
            return;
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        record.download = Some(DownloadTicket {
            id: ticket,
            elapsed: Duration::ZERO,
        });

        let url = self.config.remote_url(record.file_name());
        let timeout = self.config.download_timeout();
        info!(bundle = %record.name(), %url, ticket, "download started");
        self.stats.downloads_started += 1;

        let fetcher = self.fetcher.clone();
        let tx = self.completions_tx.clone();
        self.spawn_job(Box::new(move || {
            let result = fetcher.fetch(&url, timeout);
            let _ = tx.send(Completion::Downloaded {
                bundle: id,
                ticket,
                result,
            });
        }));
    }

    pub(super) fn on_downloaded(
        &mut self,
        id: BundleId,
        ticket: u64,
        result: std::result::Result<Vec<u8>, String>,
    ) {
        let Some(record) = self.registry.get_mut(id) else {
            return;
        };
        if record.download.as_ref().map(|t| t.id) != Some(ticket) {
            warn!(bundle = %record.name(), ticket, "late download ignored");
            return;
        }
        record.download = None;

        let bundle = record.name().to_string();
        let file_name = record.file_name().to_string();
        let result = match result {
            Ok(bytes) => {
                let path = self.storage.local_path_for(&file_name);
                match self.storage.write_bytes(&path, &bytes) {
                    Ok(()) => {
                        info!(%bundle, path = %path.display(), bytes = bytes.len(), "download stored")
                    }
                    Err(err) => {
                        warn!(%bundle, path = %path.display(), error = %err, "download not persisted")
                    }
                }
                Ok(Arc::new(bytes))
            }
            Err(reason) => {
                self.stats.downloads_failed += 1;
                warn!(%bundle, %reason, "download failed");
                Err(BundleError::DownloadFailed { bundle, reason })
            }
        };
        self.drain_downloads(id, result);
    }

    /// Advance every outstanding download ticket; expire the ones past the
    /// configured timeout.
    pub(super) fn age_downloads(&mut self, delta: Duration) {
        let timeout = self.config.download_timeout();
        let mut expired = Vec::new();

        for id in self.registry.ids().to_vec() {
            let Some(ticket) = self.registry.get_mut(id).and_then(|r| r.download.as_mut()) else {
                continue;
            };
            ticket.elapsed = ticket.elapsed.saturating_add(delta);
            if ticket.elapsed >= timeout {
                expired.push(id);
            }
        }

        for id in expired {
            let Some(record) = self.registry.get_mut(id) else {
                continue;
            };
            let ticket = record.download.take().map(|t| t.id);
            self.stats.downloads_failed += 1;
            warn!(bundle = %record.name(), ?ticket, ?timeout, "download timed out");
            let err = BundleError::DownloadTimedOut(record.name().to_string());
            self.drain_downloads(id, Err(err));
        }
    }

    fn drain_downloads(&mut self, id: BundleId, result: Result<Arc<Vec<u8>>>) {
        let callbacks = self
            .registry
            .get_mut(id)
            .map(|r| std::mem::take(&mut r.pending_download))
            .unwrap_or_default();
        for callback in callbacks {
            callback(self, result.clone());
        }
    }
}
