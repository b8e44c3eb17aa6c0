//! Annotation reconciler
//!
//! Reads the node, plans the minimal JSON patch that makes every configured
//! annotation key equal the resolved IP, and submits it under this system's
//! field manager. Nothing is written when the node is already current.

use std::time::Duration;

use tracing::{debug, info};

use super::bounded;
use crate::error::Result;
use crate::ip::IpAddress;
use crate::patch::plan_annotations;
use crate::traits::NodeStore;

/// What the annotation reconciler did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationOutcome {
    /// A patch was submitted
    Patched {
        /// Number of operations in the submitted patch
        operations: usize,
    },
    /// Every key already carried the IP; no write
    Unchanged,
}

/// Publish `ip` into `keys` on `node_name`
///
/// Errors are returned to the caller untouched; no retry happens here.
pub async fn reconcile_annotations(
    store: &dyn NodeStore,
    node_name: &str,
    keys: &[String],
    ip: &IpAddress,
    field_manager: &str,
    call_timeout: Duration,
) -> Result<AnnotationOutcome> {
    let node = bounded(
        &format!("get node {node_name}"),
        call_timeout,
        store.get_node(node_name),
    )
    .await?;

    let patch = plan_annotations(node.annotations.as_ref(), keys, ip);
    if patch.is_empty() {
        debug!(keys = keys.len(), "annotations already up to date");
        return Ok(AnnotationOutcome::Unchanged);
    }

    debug!(operations = patch.len(), "submitting annotation patch");
    bounded(
        &format!("patch node {node_name}"),
        call_timeout,
        store.patch_node(node_name, &patch, field_manager),
    )
    .await?;

    info!(operations = patch.len(), "patched annotations");
    Ok(AnnotationOutcome::Patched {
        operations: patch.len(),
    })
}
