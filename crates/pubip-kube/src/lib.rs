// # Kubernetes Node Store
//
// This crate provides the cluster-facing NodeStore for pubip.
//
// ## Writes
//
// - Annotations go through a JSON Patch (RFC 6902) on the node object,
//   tagged with a field manager
// - Status addresses go through a merge patch on the `status`
//   subresource that carries the complete address list
//
// The store keeps no cache: every read goes to the API server.

use k8s_openapi::api::core::v1::{Node, NodeAddress as K8sNodeAddress};
use kube::api::{Api, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use pubip_core::config::ClusterConfig;
use pubip_core::patch::PatchSet;
use pubip_core::traits::{AddressType, NodeAddress, NodeState, NodeStore};
use pubip_core::{Error, FIELD_MANAGER, Result};
use serde_json::json;
use tracing::{debug, info};

/// NodeStore backed by the Kubernetes API server
pub struct KubeNodeStore {
    /// Cluster-scoped Node API
    api: Api<Node>,
}

impl KubeNodeStore {
    /// Create a store on top of an existing client
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }

    /// Build a client for `cluster` and wrap it in a store
    pub async fn connect(cluster: &ClusterConfig) -> Result<Self> {
        let config = match cluster {
            ClusterConfig::InCluster => {
                info!("using in-cluster configuration");
                Config::incluster()
                    .map_err(|e| Error::config(format!("cannot load in-cluster configuration: {}", e)))?
            }
            ClusterConfig::Kubeconfig { path } => {
                info!(path = %path, "using kubeconfig");
                let kubeconfig = Kubeconfig::read_from(path)
                    .map_err(|e| Error::config(format!("cannot read kubeconfig {}: {}", path, e)))?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| Error::config(format!("invalid kubeconfig {}: {}", path, e)))?
            }
        };

        let client = Client::try_from(config)
            .map_err(|e| Error::config(format!("cannot create cluster client: {}", e)))?;
        Ok(Self::new(client))
    }
}

#[async_trait::async_trait]
impl NodeStore for KubeNodeStore {
    async fn get_node(&self, name: &str) -> Result<NodeState> {
        let node = self.api.get(name).await.map_err(|e| map_kube_error(name, e))?;
        Ok(node_state_from(&node))
    }

    async fn patch_node(&self, name: &str, patch: &PatchSet, field_manager: &str) -> Result<()> {
        let operations: json_patch::Patch = serde_json::from_value(patch.to_json()?)?;
        let params = PatchParams {
            field_manager: Some(field_manager.to_string()),
            ..PatchParams::default()
        };

        debug!(node = %name, operations = patch.len(), "sending json patch");
        self.api
            .patch(name, &params, &Patch::Json::<()>(operations))
            .await
            .map_err(|e| map_kube_error(name, e))?;
        Ok(())
    }

    async fn patch_node_status(&self, name: &str, old: &NodeState, new: &NodeState) -> Result<()> {
        if old.addresses == new.addresses {
            debug!(node = %name, "status addresses unchanged, nothing to send");
            return Ok(());
        }

        let body = status_addresses_patch(&new.addresses);
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PatchParams::default()
        };
        debug!(node = %name, addresses = new.addresses.len(), "sending status merge patch");
        self.api
            .patch_status(name, &params, &Patch::Merge(&body))
            .await
            .map_err(|e| map_kube_error(name, e))?;
        Ok(())
    }
}

/// Map a client error, keeping "not found" distinguishable
fn map_kube_error(name: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(ref response) if response.code == 404 => Error::node_not_found(name),
        other => Error::node_store(other.to_string()),
    }
}

/// Project the fields the publisher cares about out of a Node
pub fn node_state_from(node: &Node) -> NodeState {
    NodeState {
        name: node.metadata.name.clone().unwrap_or_default(),
        annotations: node.metadata.annotations.clone(),
        addresses: node
            .status
            .as_ref()
            .and_then(|status| status.addresses.as_ref())
            .map(|addresses| addresses.iter().map(address_from).collect())
            .unwrap_or_default(),
    }
}

fn address_from(address: &K8sNodeAddress) -> NodeAddress {
    NodeAddress::new(AddressType::from(address.type_.as_str()), address.address.clone())
}

fn address_to(address: &NodeAddress) -> K8sNodeAddress {
    K8sNodeAddress {
        address: address.address.clone(),
        type_: address.kind.as_str().to_string(),
    }
}

/// Merge patch that replaces the whole status address list
fn status_addresses_patch(addresses: &[NodeAddress]) -> serde_json::Value {
    let addresses: Vec<K8sNodeAddress> = addresses.iter().map(address_to).collect();
    json!({ "status": { "addresses": addresses } })
}
