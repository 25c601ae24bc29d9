mod common;

use std::sync::Arc;

use archetype_bundle::{BundleError, BundleState, InlineRunner};
use common::{config, harness, manifest, secs, Harness};

fn d_and_e() -> Harness {
    harness(
        manifest(&[("D", &["d1"], &[]), ("E", &["e1"], &["D"])]),
        config(),
        Arc::new(InlineRunner),
        &[("D", &["d1"]), ("E", &["e1"])],
        &[],
    )
}

#[test]
fn test_loaded_child_pins_parent() {
    let mut h = d_and_e();
    let e1 = h.loader.load_asset_sync("E", "e1").unwrap();
    let d1 = h.loader.load_asset_sync("D", "d1").unwrap();

    h.loader.unload_asset(d1).unwrap();
    assert_eq!(h.loader.pending_unload("D"), None);
    assert!(matches!(
        h.loader.unload_bundle("D"),
        Err(BundleError::UnloadRefused { ref reason, .. }) if reason.contains("'E'")
    ));

    h.loader.tick(secs(60.0));
    assert!(h.loader.is_loaded("D"));

    h.loader.unload_asset(e1).unwrap();
    h.loader.tick(secs(5.0));
    assert_eq!(h.loader.bundle_state("E"), Some(BundleState::None));
    assert!(h.loader.is_loaded("D"));

    h.loader.tick(secs(5.0));
    assert_eq!(h.loader.bundle_state("D"), Some(BundleState::None));
}

#[test]
fn test_unload_bundle_refuses_while_assets_held() {
    let mut h = d_and_e();
    let d1 = h.loader.load_asset_sync("D", "d1").unwrap();

    assert!(matches!(
        h.loader.unload_bundle("D"),
        Err(BundleError::UnloadRefused { .. })
    ));

    h.loader.unload_asset(d1).unwrap();
    // already counting; asking again keeps the same deadline
    h.loader.tick(secs(3.0));
    h.loader.unload_bundle("D").unwrap();
    assert_eq!(h.loader.pending_unload("D"), Some(secs(2.0)));
}

#[test]
fn test_unload_bundle_not_loaded_is_noop() {
    let mut h = d_and_e();
    h.loader.unload_bundle("D").unwrap();
    assert_eq!(h.loader.pending_unload("D"), None);
    assert!(matches!(
        h.loader.unload_bundle("Nope"),
        Err(BundleError::UnknownBundle(_))
    ));
}

#[test]
fn test_loading_child_cancels_parent_countdown() {
    let mut h = d_and_e();
    h.loader.load_bundle_sync("D").unwrap();
    h.loader.unload_bundle("D").unwrap();
    assert!(h.loader.pending_unload("D").is_some());

    h.loader.load_bundle_async("E", |_, _| {});
    assert_eq!(h.loader.pending_unload("D"), None);

    h.loader.tick(secs(10.0));
    assert!(h.loader.is_loaded("D"));
    assert!(h.loader.is_loaded("E"));
    assert_eq!(h.decoder.count("D"), 1);
}

#[test]
fn test_reacquire_before_expiry_cancels_eviction() {
    let mut h = d_and_e();
    let first = h.loader.load_asset_sync("D", "d1").unwrap();
    h.loader.unload_asset(first).unwrap();
    h.loader.tick(secs(4.9));

    let again = common::slot::<bool>();
    let sink = again.clone();
    h.loader.load_asset_async("D", "d1", move |_, result| {
        *sink.lock() = Some(result.is_ok());
    });
    h.loader.tick(secs(0.2));

    assert_eq!(*again.lock(), Some(true));
    assert!(h.loader.is_loaded("D"));
    assert_eq!(h.loader.pending_unload("D"), None);
    assert_eq!(h.loader.stats().bundles_evicted, 0);
}

#[test]
fn test_handle_from_other_loader_is_stale() {
    let mut a = d_and_e();
    let mut b = d_and_e();
    let handle = a.loader.load_asset_sync("D", "d1").unwrap();

    assert!(matches!(
        b.loader.unload_asset(handle),
        Err(BundleError::StaleHandle { ref bundle, .. }) if bundle == "D"
    ));
    assert_eq!(a.loader.asset_use_count("D", "d1"), Some(1));
}

#[test]
fn test_foreign_handle_cannot_release_matching_bundle() {
    let mut a = d_and_e();
    let mut b = d_and_e();
    // same manifest, same bundle ids, same generation
    let foreign = a.loader.load_asset_sync("D", "d1").unwrap();
    let own = b.loader.load_asset_sync("D", "d1").unwrap();
    assert_eq!(foreign.bundle_id(), own.bundle_id());
    assert_eq!(foreign.generation(), own.generation());
    assert_ne!(foreign.owner(), own.owner());

    assert!(matches!(
        b.loader.unload_asset(foreign),
        Err(BundleError::StaleHandle { .. })
    ));
    assert_eq!(b.loader.asset_use_count("D", "d1"), Some(1));
    assert_eq!(b.loader.pending_unload("D"), None);

    b.loader.tick(secs(10.0));
    assert!(b.loader.is_loaded("D"));

    b.loader.unload_asset(own).unwrap();
    assert_eq!(b.loader.pending_unload("D"), Some(secs(5.0)));
}

#[test]
fn test_handle_from_other_loader_after_reload_is_stale() {
    let mut a = d_and_e();
    let mut b = d_and_e();
    // b loads D twice so its generation moves past a's
    b.loader.load_bundle_sync("D").unwrap();
    b.loader.unload_bundle("D").unwrap();
    b.loader.tick(secs(5.0));
    let held = b.loader.load_asset_sync("D", "d1").unwrap();
    assert_eq!(held.generation(), 2);

    let old = a.loader.load_asset_sync("D", "d1").unwrap();
    assert_eq!(old.generation(), 1);
    assert!(matches!(
        b.loader.unload_asset(old),
        Err(BundleError::StaleHandle { .. })
    ));
    assert_eq!(b.loader.asset_use_count("D", "d1"), Some(1));
}

#[test]
fn test_graph_queries() {
    let h = d_and_e();
    assert_eq!(h.loader.bundle_names().collect::<Vec<_>>(), vec!["D", "E"]);
    assert_eq!(h.loader.dependencies_of("E"), Some(vec!["D"]));
    assert_eq!(h.loader.dependents_of("D"), Some(vec!["E"]));
    assert_eq!(h.loader.asset_owner("e1"), Some("E"));
    assert_eq!(h.loader.asset_owner("zz"), None);
    assert_eq!(h.loader.dependencies_of("Nope"), None);
}
