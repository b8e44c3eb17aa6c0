//! Test doubles and common utilities for contract tests
//!
//! The node store double keeps a real in-memory node and applies patches to
//! it, so consecutive cycles observe each other's writes.

#![allow(dead_code)]

use pubip_core::error::{Error, Result};
use pubip_core::patch::{ANNOTATIONS_PATH, PatchOp, PatchSet, unescape_key};
use pubip_core::traits::{AddressType, IpResolver, NodeAddress, NodeState, NodeStore};
use pubip_core::{IpAddress, PublisherConfig};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Resolver that always returns the same address
#[derive(Clone)]
pub struct StaticIpResolver {
    ip: IpAddress,
    calls: Arc<AtomicUsize>,
}

impl StaticIpResolver {
    pub fn new(ip: &str) -> Self {
        Self {
            ip: IpAddress::new(ip).expect("valid test ip"),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of resolve() calls so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpResolver for StaticIpResolver {
    async fn resolve(&self) -> Result<IpAddress> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ip.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Resolver that answers only after a delay
pub struct SlowIpResolver {
    ip: IpAddress,
    delay: Duration,
}

impl SlowIpResolver {
    pub fn new(ip: &str, delay: Duration) -> Self {
        Self {
            ip: IpAddress::new(ip).expect("valid test ip"),
            delay,
        }
    }
}

#[async_trait::async_trait]
impl IpResolver for SlowIpResolver {
    async fn resolve(&self) -> Result<IpAddress> {
        tokio::time::sleep(self.delay).await;
        Ok(self.ip.clone())
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

/// Resolver whose every mirror is down
pub struct FailingIpResolver;

#[async_trait::async_trait]
impl IpResolver for FailingIpResolver {
    async fn resolve(&self) -> Result<IpAddress> {
        Err(Error::ip_resolution("all mirrors failed"))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

#[derive(Default)]
struct StoreState {
    node: Option<NodeState>,
    patches: Vec<PatchSet>,
    status_updates: Vec<(NodeState, NodeState)>,
}

/// In-memory node store that records every call
#[derive(Clone, Default)]
pub struct RecordingNodeStore {
    state: Arc<Mutex<StoreState>>,
    get_calls: Arc<AtomicUsize>,
    fail_patch: Arc<AtomicBool>,
    fail_patch_status: Arc<AtomicBool>,
    get_delay: Arc<Mutex<Option<Duration>>>,
    write_after_read: Arc<Mutex<Option<(String, String)>>>,
}

impl RecordingNodeStore {
    /// A store holding `node`
    pub fn with_node(node: NodeState) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().node = Some(node);
        store
    }

    /// A store that does not know any node
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fail_patches(&self, fail: bool) {
        self.fail_patch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_status_patches(&self, fail: bool) {
        self.fail_patch_status.store(fail, Ordering::SeqCst);
    }

    /// Make every get_node() call wait before answering
    pub fn delay_reads(&self, delay: Duration) {
        *self.get_delay.lock().unwrap() = Some(delay);
    }

    /// Simulate another writer: right after the next get_node() answers,
    /// store the annotation `key=value` on the node
    pub fn write_after_next_read(&self, key: &str, value: &str) {
        *self.write_after_read.lock().unwrap() = Some((key.to_string(), value.to_string()));
    }

    pub fn get_call_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Successful metadata patches, in order
    pub fn patches(&self) -> Vec<PatchSet> {
        self.state.lock().unwrap().patches.clone()
    }

    /// Successful status updates as (old, new), in order
    pub fn status_updates(&self) -> Vec<(NodeState, NodeState)> {
        self.state.lock().unwrap().status_updates.clone()
    }

    /// Total number of successful writes
    pub fn write_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.patches.len() + state.status_updates.len()
    }

    /// Current node as the store holds it
    pub fn node(&self) -> Option<NodeState> {
        self.state.lock().unwrap().node.clone()
    }
}

/// Apply an annotation patch the way a strict RFC 6902 store would
fn apply_patch(node: &mut NodeState, patch: &PatchSet) -> Result<()> {
    let mut annotations = node.annotations.clone();

    for op in patch.operations() {
        if op.path == ANNOTATIONS_PATH {
            match op.op {
                // An absent map tests equal to null
                PatchOp::Test => {
                    let current = match &annotations {
                        Some(map) => serde_json::to_value(map)?,
                        None => serde_json::Value::Null,
                    };
                    if current != op.value {
                        return Err(Error::node_store(format!("test failed at {}", op.path)));
                    }
                }
                _ => annotations = Some(BTreeMap::new()),
            }
            continue;
        }
        let segment = op
            .path
            .strip_prefix(&format!("{ANNOTATIONS_PATH}/"))
            .ok_or_else(|| Error::node_store(format!("unexpected path {}", op.path)))?;
        let key = unescape_key(segment);
        let map = annotations
            .as_mut()
            .ok_or_else(|| Error::node_store("annotations map does not exist"))?;
        if op.op == PatchOp::Replace && !map.contains_key(&key) {
            return Err(Error::node_store(format!("replace of missing key {key}")));
        }
        let value = op
            .value
            .as_str()
            .ok_or_else(|| Error::node_store("annotation value must be a string"))?;
        map.insert(key, value.to_string());
    }

    node.annotations = annotations;
    Ok(())
}

#[async_trait::async_trait]
impl NodeStore for RecordingNodeStore {
    async fn get_node(&self, name: &str) -> Result<NodeState> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.get_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        let answer = match &state.node {
            Some(node) if node.name == name => node.clone(),
            _ => return Err(Error::node_not_found(name)),
        };
        if let Some((key, value)) = self.write_after_read.lock().unwrap().take() {
            if let Some(node) = state.node.as_mut() {
                node.annotations.get_or_insert_with(BTreeMap::new).insert(key, value);
            }
        }
        Ok(answer)
    }

    async fn patch_node(&self, name: &str, patch: &PatchSet, _field_manager: &str) -> Result<()> {
        if self.fail_patch.load(Ordering::SeqCst) {
            return Err(Error::node_store("connection refused"));
        }
        let mut state = self.state.lock().unwrap();
        let node = match state.node.as_mut() {
            Some(node) if node.name == name => node,
            _ => return Err(Error::node_not_found(name)),
        };
        apply_patch(node, patch)?;
        state.patches.push(patch.clone());
        Ok(())
    }

    async fn patch_node_status(&self, name: &str, old: &NodeState, new: &NodeState) -> Result<()> {
        if self.fail_patch_status.load(Ordering::SeqCst) {
            return Err(Error::node_store("status update rejected"));
        }
        let mut state = self.state.lock().unwrap();
        let node = match state.node.as_mut() {
            Some(node) if node.name == name => node,
            _ => return Err(Error::node_not_found(name)),
        };
        node.addresses = new.addresses.clone();
        state.status_updates.push((old.clone(), new.clone()));
        Ok(())
    }
}

pub fn addr(kind: AddressType, address: &str) -> NodeAddress {
    NodeAddress::new(kind, address)
}

/// A node with the given annotations and addresses
pub fn node(name: &str, annotations: &[(&str, &str)], addresses: Vec<NodeAddress>) -> NodeState {
    NodeState {
        name: name.to_string(),
        annotations: Some(
            annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ),
        addresses,
    }
}

/// Configuration with the schedule disabled and short timeouts
pub fn minimal_config(node_name: &str, keys: &[&str]) -> PublisherConfig {
    let mut config = PublisherConfig::new(node_name, keys.iter().map(|k| k.to_string()).collect());
    config.schedule.disabled = true;
    config.engine.call_timeout_secs = 5;
    config
}

/// Drain every event currently buffered in the receiver
pub fn drain_events(
    rx: &mut tokio::sync::mpsc::Receiver<pubip_core::EngineEvent>,
) -> Vec<pubip_core::EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
