//! Collaborator traits for the publisher
//!
//! This module defines the abstract interfaces the core drives.
//!
//! - [`IpResolver`]: Discover the current public IP
//! - [`NodeStore`]: Read and mutate the cluster node

pub mod ip_resolver;
pub mod node_store;

pub use ip_resolver::IpResolver;
pub use node_store::{AddressType, NodeAddress, NodeState, NodeStore};
