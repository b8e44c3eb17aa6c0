// # IP Resolver Trait
//
// Defines the interface for discovering the machine's current public IP.
//
// ## Implementations
//
// - HTTP mirrors: `pubip-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use pubip_core::IpResolver;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let resolver = /* IpResolver implementation */;
//
//     let ip = resolver.resolve().await?;
//     println!("public ip: {ip}");
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::ip::IpAddress;

/// Trait for public IP resolver implementations
///
/// A resolver is asked once per cycle. It owns its own fallback strategy
/// (e.g. trying several mirrors in order); the engine never retries a
/// failed resolution within a cycle, it treats the failure as fatal.
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait IpResolver: Send + Sync {
    /// Resolve the current public IP address
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddress)`: The address as reported by the resolving service
    /// - `Err(Error::IpResolution)`: If no source could produce an address
    async fn resolve(&self) -> Result<IpAddress, crate::Error>;

    /// Resolver name (for logging)
    fn name(&self) -> &'static str;
}
