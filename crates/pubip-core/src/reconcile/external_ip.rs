//! External-IP reconciler
//!
//! A node's status addresses form an unordered list with no per-entry key,
//! so the only safe mutation is: read the list fresh, find-or-append on an
//! owned copy, and submit the whole list back as a status update.

use std::time::Duration;

use tracing::info;

use super::bounded;
use crate::error::Result;
use crate::ip::IpAddress;
use crate::traits::{AddressType, NodeAddress, NodeState, NodeStore};

/// Result of applying the IP to an address list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressChange {
    /// The first `ExternalIP` entry already holds the IP
    Unchanged,
    /// The first `ExternalIP` entry was rewritten in place
    Updated {
        index: usize,
        previous: String,
        addresses: Vec<NodeAddress>,
    },
    /// No `ExternalIP` entry existed; one was appended
    Appended { addresses: Vec<NodeAddress> },
}

/// Apply `ip` to `current` without touching any other entry.
///
/// Only the first `ExternalIP` entry in list order is considered; later
/// ones are left as they are.
pub fn compute_addresses(current: &[NodeAddress], ip: &IpAddress) -> AddressChange {
    let first_external = current
        .iter()
        .position(|entry| entry.kind == AddressType::ExternalIP);

    match first_external {
        Some(index) if ip == current[index].address.as_str() => AddressChange::Unchanged,
        Some(index) => {
            let mut addresses = current.to_vec();
            let previous = std::mem::replace(&mut addresses[index].address, ip.to_string());
            AddressChange::Updated {
                index,
                previous,
                addresses,
            }
        }
        None => {
            let mut addresses = current.to_vec();
            addresses.push(NodeAddress::new(AddressType::ExternalIP, ip.as_str()));
            AddressChange::Appended { addresses }
        }
    }
}

/// What the external-IP reconciler did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalIpOutcome {
    Unchanged,
    Updated { previous: String },
    Appended,
}

/// Publish `ip` as the node's `ExternalIP` address
///
/// A missing node surfaces as `Error::NodeNotFound`, which callers treat as
/// fatal. Any other error is a failed attempt for this cycle only.
pub async fn reconcile_external_ip(
    store: &dyn NodeStore,
    node_name: &str,
    ip: &IpAddress,
    call_timeout: Duration,
) -> Result<ExternalIpOutcome> {
    let old = bounded(
        &format!("get node {node_name}"),
        call_timeout,
        store.get_node(node_name),
    )
    .await?;

    let (addresses, outcome) = match compute_addresses(&old.addresses, ip) {
        AddressChange::Unchanged => {
            info!("node's external ip already matches its public ip, skipping update");
            return Ok(ExternalIpOutcome::Unchanged);
        }
        AddressChange::Updated {
            previous,
            addresses,
            ..
        } => (addresses, ExternalIpOutcome::Updated { previous }),
        AddressChange::Appended { addresses } => (addresses, ExternalIpOutcome::Appended),
    };

    let new = NodeState {
        addresses,
        ..old.clone()
    };
    bounded(
        &format!("patch status of node {node_name}"),
        call_timeout,
        store.patch_node_status(node_name, &old, &new),
    )
    .await?;

    match &outcome {
        ExternalIpOutcome::Updated { previous } => {
            info!(previous = %previous, "updated node's external ip")
        }
        _ => info!("appended external ip to node addresses"),
    }
    Ok(outcome)
}
