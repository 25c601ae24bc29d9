//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use parking_lot::Mutex;

use archetype_bundle::io::{MemoryStorage, PackedBundle, PackedBundleDecoder};
use archetype_bundle::runner::Job;
use archetype_bundle::{
    BundleDecoder, BundleImage, Fetcher, JobRunner, LoadCoordinator, LoaderConfig, Manifest,
    ManifestEntry,
};

pub const BASE_URL: &str = "https://cdn.example.test/bundles";

/// `(name, assets, dependencies)` triples to a manifest
pub fn manifest(entries: &[(&str, &[&str], &[&str])]) -> Manifest {
    Manifest::new(
        entries
            .iter()
            .map(|(name, assets, deps)| {
                ManifestEntry::new(*name)
                    .with_assets(assets.iter().copied())
                    .with_dependencies(deps.iter().copied())
            })
            .collect(),
    )
}

/// Packed bundle bytes where every asset's payload is its own name
pub fn pack(assets: &[&str]) -> Vec<u8> {
    assets
        .iter()
        .fold(PackedBundle::new(), |pack, name| {
            pack.with_asset(*name, name.as_bytes().to_vec())
        })
        .to_bytes()
        .expect("pack encodes")
}

/// Decoder that records every decode in order
#[derive(Default)]
pub struct RecordingDecoder {
    pub decoded: Mutex<Vec<String>>,
    pub fail: Mutex<Vec<String>>,
}

impl RecordingDecoder {
    pub fn count(&self, bundle: &str) -> usize {
        self.decoded.lock().iter().filter(|b| *b == bundle).count()
    }

    pub fn order(&self) -> Vec<String> {
        self.decoded.lock().clone()
    }

    pub fn fail_on(&self, bundle: &str) {
        self.fail.lock().push(bundle.to_string());
    }
}

impl BundleDecoder for RecordingDecoder {
    fn decode(&self, bundle_name: &str, bytes: &[u8]) -> Result<Arc<dyn BundleImage>, String> {
        self.decoded.lock().push(bundle_name.to_string());
        if self.fail.lock().iter().any(|b| b == bundle_name) {
            return Err(format!("corrupt bundle {bundle_name}"));
        }
        PackedBundleDecoder.decode(bundle_name, bytes)
    }
}

/// Remote that serves registered files by name and counts requests
#[derive(Default)]
pub struct ScriptedFetcher {
    pub files: Mutex<AHashMap<String, Vec<u8>>>,
    pub requests: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn serve(&self, file_name: &str, bytes: Vec<u8>) {
        self.files.lock().insert(file_name.to_string(), bytes);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, String> {
        self.requests.lock().push(url.to_string());
        let file_name = url.rsplit('/').next().unwrap_or(url);
        self.files
            .lock()
            .get(file_name)
            .cloned()
            .ok_or_else(|| format!("404 {url}"))
    }
}

/// Holds jobs until the test releases them
#[derive(Default)]
pub struct ManualRunner {
    queue: Mutex<Vec<Job>>,
    pub spawned: AtomicUsize,
}

impl ManualRunner {
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run every queued job on the calling thread
    pub fn run_all(&self) -> usize {
        let jobs = std::mem::take(&mut *self.queue.lock());
        let count = jobs.len();
        for job in jobs {
            job();
        }
        count
    }
}

impl JobRunner for ManualRunner {
    fn spawn(&self, job: Job) {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        self.queue.lock().push(job);
    }
}

/// Coordinator plus handles on all of its collaborators
pub struct Harness {
    pub loader: LoadCoordinator,
    pub storage: Arc<MemoryStorage>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub decoder: Arc<RecordingDecoder>,
}

pub fn config() -> LoaderConfig {
    LoaderConfig::default()
        .with_unload_delay(Duration::from_secs(5))
        .with_download_timeout(Duration::from_secs(30))
        .with_remote_base_url(BASE_URL)
}

/// Build a harness; `local` bundles are seeded into storage, `remote`
/// bundles are only served by the fetcher
pub fn harness(
    manifest: Manifest,
    config: LoaderConfig,
    runner: Arc<dyn JobRunner>,
    local: &[(&str, &[&str])],
    remote: &[(&str, &[&str])],
) -> Harness {
    let storage = Arc::new(MemoryStorage::new());
    let fetcher = Arc::new(ScriptedFetcher::default());
    let decoder = Arc::new(RecordingDecoder::default());

    for (bundle, assets) in local {
        storage.insert(&config.file_name(bundle), pack(assets));
    }
    for (bundle, assets) in remote {
        fetcher.serve(&config.file_name(bundle), pack(assets));
    }

    let loader = LoadCoordinator::builder(manifest)
        .config(config)
        .storage(storage.clone())
        .fetcher(fetcher.clone())
        .decoder(decoder.clone())
        .runner(runner)
        .build()
        .expect("manifest resolves");

    Harness {
        loader,
        storage,
        fetcher,
        decoder,
    }
}

/// Shared slot a callback can write its outcome into
pub fn slot<T>() -> Arc<Mutex<Option<T>>> {
    Arc::new(Mutex::new(None))
}

pub fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}
