//! Contract Test: Annotation Publishing
//!
//! Constraints verified:
//! - Every configured key ends up equal to the resolved IP
//! - Patches are minimal: current keys are not rewritten
//! - Missing keys (and a missing annotation map) are added, not replaced
//! - Creating the map never clobbers a map another writer just created
//! - A failed write is cycle-local and stops the ExternalIP step

mod common;

use common::*;
use pubip_core::patch::PatchOp;
use pubip_core::traits::AddressType;
use pubip_core::{AnnotationOutcome, EngineEvent, FIELD_MANAGER, PublishEngine};
use serde_json::json;

#[tokio::test]
async fn stale_keys_are_replaced_in_key_order() {
    let store = RecordingNodeStore::with_node(node(
        "node-1",
        &[("public-ip", "198.51.100.1"), ("net/ip", "198.51.100.1")],
        Vec::new(),
    ));
    let (engine, _events) = PublishEngine::new(
        Box::new(StaticIpResolver::new("203.0.113.7")),
        Box::new(store.clone()),
        minimal_config("node-1", &["public-ip", "net/ip"]),
    )
    .expect("engine construction succeeds");

    let report = engine.run_cycle().await.expect("cycle is not fatal");

    assert_eq!(report.annotations, Ok(AnnotationOutcome::Patched { operations: 2 }));
    let patches = store.patches();
    assert_eq!(patches.len(), 1);
    assert_eq!(
        patches[0].to_json().unwrap(),
        json!([
            {"op": "replace", "path": "/metadata/annotations/public-ip", "value": "203.0.113.7"},
            {"op": "replace", "path": "/metadata/annotations/net~1ip", "value": "203.0.113.7"},
        ])
    );

    let annotations = store.node().unwrap().annotations.unwrap();
    assert_eq!(annotations["public-ip"], "203.0.113.7");
    assert_eq!(annotations["net/ip"], "203.0.113.7");
}

#[tokio::test]
async fn current_annotations_cause_no_write() {
    let store = RecordingNodeStore::with_node(node(
        "node-1",
        &[("public-ip", "203.0.113.7")],
        Vec::new(),
    ));
    let (engine, mut events) = PublishEngine::new(
        Box::new(StaticIpResolver::new("203.0.113.7")),
        Box::new(store.clone()),
        minimal_config("node-1", &["public-ip"]),
    )
    .unwrap();

    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.annotations, Ok(AnnotationOutcome::Unchanged));
    assert_eq!(store.write_count(), 0);
    assert!(drain_events(&mut events).iter().any(|e| matches!(e, EngineEvent::AnnotationsUnchanged { .. })));
}

#[tokio::test]
async fn missing_keys_are_added() {
    let store = RecordingNodeStore::with_node(node(
        "node-1",
        &[("public-ip", "198.51.100.1"), ("other", "kept")],
        Vec::new(),
    ));
    let (engine, _events) = PublishEngine::new(
        Box::new(StaticIpResolver::new("203.0.113.7")),
        Box::new(store.clone()),
        minimal_config("node-1", &["public-ip", "example.com/public-ip"]),
    )
    .unwrap();

    engine.run_cycle().await.unwrap();

    let patch = &store.patches()[0];
    let ops: Vec<_> = patch.operations().iter().map(|o| o.op).collect();
    assert_eq!(ops, vec![PatchOp::Replace, PatchOp::Add]);

    let annotations = store.node().unwrap().annotations.unwrap();
    assert_eq!(annotations["example.com/public-ip"], "203.0.113.7");
    assert_eq!(annotations["other"], "kept");
}

#[tokio::test]
async fn node_without_annotation_map_gets_one() {
    let mut bare = node("node-1", &[], Vec::new());
    bare.annotations = None;
    let store = RecordingNodeStore::with_node(bare);
    let (engine, _events) = PublishEngine::new(
        Box::new(StaticIpResolver::new("203.0.113.7")),
        Box::new(store.clone()),
        minimal_config("node-1", &["public-ip"]),
    )
    .unwrap();

    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.annotations, Ok(AnnotationOutcome::Patched { operations: 3 }));
    let annotations = store.node().unwrap().annotations.unwrap();
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations["public-ip"], "203.0.113.7");
}

#[tokio::test]
async fn annotation_map_created_concurrently_is_not_overwritten() {
    let mut bare = node("node-1", &[], Vec::new());
    bare.annotations = None;
    let store = RecordingNodeStore::with_node(bare);
    store.write_after_next_read("other.io/owner", "team-a");
    let (engine, _events) = PublishEngine::new(
        Box::new(StaticIpResolver::new("203.0.113.7")),
        Box::new(store.clone()),
        minimal_config("node-1", &["public-ip"]),
    )
    .unwrap();

    // The map appeared between the read and the patch: the guarded patch is rejected
    let report = engine.run_cycle().await.expect("rejected patch is cycle-local");
    assert!(report.annotations.is_err());
    assert!(store.patches().is_empty());
    assert_eq!(store.node().unwrap().annotations.unwrap()["other.io/owner"], "team-a");

    // The next cycle sees the map and only adds its own key
    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.annotations, Ok(AnnotationOutcome::Patched { operations: 1 }));
    let annotations = store.node().unwrap().annotations.unwrap();
    assert_eq!(annotations["other.io/owner"], "team-a");
    assert_eq!(annotations["public-ip"], "203.0.113.7");
}

#[tokio::test]
async fn patch_failure_is_not_fatal_and_skips_external_ip() {
    let store = RecordingNodeStore::with_node(node(
        "node-1",
        &[("public-ip", "198.51.100.1")],
        vec![addr(AddressType::Hostname, "node-1")],
    ));
    store.fail_patches(true);
    let (engine, mut events) = PublishEngine::new(
        Box::new(StaticIpResolver::new("203.0.113.7")),
        Box::new(store.clone()),
        minimal_config("node-1", &["public-ip"]).with_external_ip(true),
    )
    .unwrap();

    let report = engine.run_cycle().await.expect("annotation failures are cycle-local");

    assert!(report.annotations.is_err());
    assert_eq!(report.external_ip, None);
    assert_eq!(store.write_count(), 0);
    assert!(
        drain_events(&mut events)
            .iter()
            .any(|e| matches!(e, EngineEvent::AnnotationPatchFailed { .. }))
    );
}

#[tokio::test]
async fn missing_node_during_annotation_step_is_not_fatal() {
    let store = RecordingNodeStore::empty();
    let (engine, _events) = PublishEngine::new(
        Box::new(StaticIpResolver::new("203.0.113.7")),
        Box::new(store.clone()),
        minimal_config("node-1", &["public-ip"]).with_external_ip(true),
    )
    .unwrap();

    let report = engine.run_cycle().await.expect("only the external-ip step treats a missing node as fatal");

    assert!(report.annotations.is_err());
    assert_eq!(report.external_ip, None);
}

#[tokio::test]
async fn writes_identify_this_system() {
    assert_eq!(FIELD_MANAGER, "pubipd");
}
