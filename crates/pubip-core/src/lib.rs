// # pubip-core
//
// Core library for publishing a machine's public IP onto its cluster node.
//
// ## Architecture Overview
//
// - **IpResolver**: Trait for discovering the current public IP
// - **NodeStore**: Trait for reading and patching the cluster node
// - **patch**: JSON Patch construction for annotation keys
// - **reconcile**: Annotation and ExternalIP reconcilers
// - **PublishEngine**: Runs a reconciliation cycle at startup and on schedule
//
// ## Design Principles
//
// 1. **Core-first**: Cluster and HTTP specifics live in adapter crates
// 2. **Fresh reads**: Unkeyed node data is re-read before every write
// 3. **Minimal writes**: Nothing is sent when the node is already current
// 4. **Fail per cycle**: Write failures wait for the next tick; only an
//    unknown IP or a missing node stop the process

pub mod config;
pub mod engine;
pub mod error;
pub mod ip;
pub mod patch;
pub mod reconcile;
pub mod schedule;
pub mod traits;

// Re-export core types for convenience
pub use config::{ClusterConfig, EngineConfig, PublisherConfig, ResolverConfig, ScheduleConfig};
pub use engine::{CycleReport, EngineEvent, PublishEngine};
pub use error::{Error, Result};
pub use ip::IpAddress;
pub use patch::{PatchOp, PatchOperation, PatchSet};
pub use reconcile::{AnnotationOutcome, ExternalIpOutcome, FIELD_MANAGER};
pub use schedule::Schedule;
pub use traits::{AddressType, IpResolver, NodeAddress, NodeState, NodeStore};
