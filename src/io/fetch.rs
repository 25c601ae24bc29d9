use crate::io::Fetcher;
use std::path::PathBuf;
use std::time::Duration;

/// Serves "remote" bundles out of a mirror directory.
///
/// URLs are resolved relative to the mirror root after stripping any
/// `scheme://host/` prefix, so a config pointing at a CDN can be redirected
/// to a local copy of the CDN tree.
pub struct MirrorFetcher {
    root: PathBuf,
}

impl MirrorFetcher {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let relative = match url.split_once("://") {
            Some((_, rest)) => rest.split_once('/').map_or("", |(_, path)| path),
            None => url,
        };
        self.root.join(relative.trim_start_matches('/'))
    }
}

impl Fetcher for MirrorFetcher {
    fn fetch(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, String> {
        let path = self.resolve(url);
        std::fs::read(&path).map_err(|e| format!("{}: {e}", path.display()))
    }
}

/// Fetcher for clients with no remote: every fetch fails
pub struct OfflineFetcher;

impl Fetcher for OfflineFetcher {
    fn fetch(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, String> {
        Err(format!("no remote configured for {url}"))
    }
}
