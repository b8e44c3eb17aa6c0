//! Node reconcilers
//!
//! - [`annotations`]: publish the IP into the configured annotation keys
//! - [`external_ip`]: publish the IP as the node's `ExternalIP` status address
//!
//! Both read the node fresh from the store before writing.

pub mod annotations;
pub mod external_ip;

pub use annotations::{AnnotationOutcome, reconcile_annotations};
pub use external_ip::{AddressChange, ExternalIpOutcome, compute_addresses, reconcile_external_ip};

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Field manager identity used for every write this system makes
pub const FIELD_MANAGER: &str = "pubipd";

/// Bound a collaborator call by `limit`, mapping expiry to [`Error::Timeout`]
pub(crate) async fn bounded<T, F>(operation: &str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(operation, limit.as_secs())),
    }
}
