// # Node Store Trait
//
// Defines the capabilities the reconcilers need from the cluster: read a
// node, JSON-patch its metadata, and update its status addresses.
//
// ## Implementations
//
// - Kubernetes API: `pubip-kube` crate
//
// The types here are deliberately store-neutral so the core never depends
// on a particular Kubernetes client or API version.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::patch::PatchSet;

/// Kind of a node address entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AddressType {
    InternalIP,
    ExternalIP,
    Hostname,
    InternalDNS,
    ExternalDNS,
    /// Any type this crate does not know about, kept verbatim
    Other(String),
}

impl AddressType {
    pub fn as_str(&self) -> &str {
        match self {
            AddressType::InternalIP => "InternalIP",
            AddressType::ExternalIP => "ExternalIP",
            AddressType::Hostname => "Hostname",
            AddressType::InternalDNS => "InternalDNS",
            AddressType::ExternalDNS => "ExternalDNS",
            AddressType::Other(other) => other,
        }
    }
}

impl From<&str> for AddressType {
    fn from(value: &str) -> Self {
        match value {
            "InternalIP" => AddressType::InternalIP,
            "ExternalIP" => AddressType::ExternalIP,
            "Hostname" => AddressType::Hostname,
            "InternalDNS" => AddressType::InternalDNS,
            "ExternalDNS" => AddressType::ExternalDNS,
            other => AddressType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AddressType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AddressType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(AddressType::from(value.as_str()))
    }
}

/// One entry of a node's reported address list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    #[serde(rename = "type")]
    pub kind: AddressType,
    pub address: String,
}

impl NodeAddress {
    pub fn new(kind: AddressType, address: impl Into<String>) -> Self {
        Self {
            kind,
            address: address.into(),
        }
    }
}

/// Snapshot of the node fields this system reads and writes
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeState {
    /// Node name
    pub name: String,

    /// Annotation map; `None` when the node carries no map at all
    pub annotations: Option<BTreeMap<String, String>>,

    /// Status addresses, in the order the store returned them
    pub addresses: Vec<NodeAddress>,
}

/// Trait for cluster node stores
///
/// Every method is a single request against the store: no caching, no
/// retries. Callers re-read before every write to unkeyed data.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Fetch the node fresh from the store
    ///
    /// # Returns
    ///
    /// - `Ok(NodeState)`: Current snapshot
    /// - `Err(Error::NodeNotFound)`: The node does not exist
    /// - `Err(Error::NodeStore)`: Transport or API failure
    async fn get_node(&self, name: &str) -> Result<NodeState, crate::Error>;

    /// Apply a JSON patch to the node's metadata
    ///
    /// `field_manager` identifies this writer so field ownership is tracked
    /// by stores that support it. Stores that do not apply patch lists
    /// atomically may leave earlier operations applied on failure.
    async fn patch_node(
        &self,
        name: &str,
        patch: &PatchSet,
        field_manager: &str,
    ) -> Result<(), crate::Error>;

    /// Update the node's status so it matches `new`
    ///
    /// Only the status delta between `old` and `new` is submitted. The
    /// address list has no per-entry key, so a changed list is always sent
    /// whole.
    async fn patch_node_status(
        &self,
        name: &str,
        old: &NodeState,
        new: &NodeState,
    ) -> Result<(), crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_type_round_trips_known_and_unknown() {
        for name in ["InternalIP", "ExternalIP", "Hostname", "InternalDNS", "ExternalDNS", "Weird"] {
            assert_eq!(AddressType::from(name).as_str(), name);
        }
        assert_eq!(AddressType::from("Weird"), AddressType::Other("Weird".to_string()));
    }

    #[test]
    fn test_node_address_serializes_with_type_key() {
        let addr = NodeAddress::new(AddressType::ExternalIP, "203.0.113.9");
        assert_eq!(
            serde_json::to_value(&addr).unwrap(),
            serde_json::json!({"type": "ExternalIP", "address": "203.0.113.9"})
        );
    }
}
