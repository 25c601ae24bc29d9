//! Example: a host loop driving bundle loads, downloads and eviction
//!
//! Sets up a local bundle directory and a "remote" mirror directory under
//! the system temp dir, then:
//! 1. Loads an asset from `level_1`, whose dependency `shared` only exists
//!    on the remote
//! 2. Pumps frames until the asset arrives
//! 3. Releases it and keeps ticking until both bundles are evicted
//!
//! Run with `cargo run --example bundle_lifecycle --features profiling` to
//! see the loader's log output.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use archetype_bundle::prelude::*;
use archetype_bundle::JobRunner;

const FRAME: Duration = Duration::from_millis(16);

fn write_pack(dir: &Path, name: &str, assets: &[(&str, &str)]) -> std::io::Result<()> {
    let pack = assets
        .iter()
        .fold(PackedBundle::new(), |pack, (asset, text)| {
            pack.with_asset(*asset, text.as_bytes().to_vec())
        });
    let bytes = pack
        .to_bytes()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(name), bytes)
}

fn runner() -> Arc<dyn JobRunner> {
    #[cfg(feature = "parallel")]
    {
        Arc::new(ThreadPoolRunner)
    }
    #[cfg(not(feature = "parallel"))]
    {
        Arc::new(InlineRunner)
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "profiling")]
    archetype_bundle::logging::init_stdout(tracing::Level::DEBUG, false)?;

    let root = std::env::temp_dir().join("archetype_bundle_demo");
    let local = root.join("local");
    let mirror = root.join("mirror");
    let _ = std::fs::remove_dir_all(&root);

    let config = LoaderConfig::default()
        .with_bundle_suffix(".pack")
        .with_remote_base_url("https://cdn.example.com/bundles")
        .with_unload_delay(Duration::from_millis(250));

    write_pack(&local, &config.file_name("level_1"), &[("terrain", "hills")])?;
    write_pack(
        &mirror.join("bundles"),
        &config.file_name("shared"),
        &[("palette", "sunset")],
    )?;

    let manifest = Manifest::new(vec![
        ManifestEntry::new("shared").with_assets(["palette"]),
        ManifestEntry::new("level_1")
            .with_assets(["terrain"])
            .with_dependencies(["shared"]),
    ]);

    let mut loader = LoadCoordinator::builder(manifest)
        .config(config)
        .storage(Arc::new(FsStorage::new(&local)))
        .fetcher(Arc::new(MirrorFetcher::new(&mirror)))
        .runner(runner())
        .build()?;

    let terrain: Rc<RefCell<Option<AssetHandle>>> = Rc::default();
    let sink = terrain.clone();
    loader.load_asset_async("level_1", "terrain", move |loader, result| match result {
        Ok(handle) => {
            println!(
                "terrain ready: {:?}, shared is {:?}",
                handle
                    .downcast_ref::<Vec<u8>>()
                    .map(|b| String::from_utf8_lossy(b).into_owned()),
                loader.bundle_state("shared")
            );
            *sink.borrow_mut() = Some(handle);
        }
        Err(err) => eprintln!("terrain failed: {err}"),
    });

    let mut frames = 0;
    while terrain.borrow().is_none() && frames < 600 {
        loader.tick(FRAME);
        std::thread::sleep(FRAME);
        frames += 1;
    }
    println!("loaded after {frames} frames; stats {:?}", loader.stats());

    if let Some(handle) = terrain.borrow_mut().take() {
        loader.unload_asset(handle)?;
    }
    while loader.is_loaded("shared") {
        loader.tick(FRAME);
        std::thread::sleep(FRAME);
    }

    println!(
        "evicted; level_1 {:?}, shared {:?}",
        loader.bundle_state("level_1"),
        loader.bundle_state("shared")
    );
    println!("{}", serde_json::to_string_pretty(loader.stats())?);
    Ok(())
}
