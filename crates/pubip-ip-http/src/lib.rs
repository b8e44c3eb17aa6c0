// # HTTP IP Resolver
//
// This crate provides an HTTP-based public IP resolver for pubip.
//
// ## Architecture
//
// Asks a list of "what is my IP" mirrors (e.g. api.ipify.org,
// checkip.amazonaws.com) in order. The first mirror that answers with a
// 2xx status and a body that parses as an IP address wins; every other
// outcome moves on to the next mirror.
//
// Nothing is cached: each cycle asks again.

use pubip_core::config::ResolverConfig;
use pubip_core::traits::IpResolver;
use pubip_core::{Error, IpAddress, Result};

use std::time::Duration;

use tracing::{debug, warn};

/// Public IP resolver backed by HTTP mirrors
pub struct HttpIpResolver {
    /// Mirror URLs, tried in order
    mirrors: Vec<String>,

    /// HTTP client (carries the per-request timeout)
    client: reqwest::Client,
}

impl HttpIpResolver {
    /// Create a new resolver
    ///
    /// # Parameters
    ///
    /// - `mirrors`: URLs returning the caller's IP as plain text
    /// - `timeout`: deadline for each individual mirror request
    pub fn new(mirrors: Vec<String>, timeout: Duration) -> Result<Self> {
        if mirrors.is_empty() {
            return Err(Error::config("at least one IP mirror is required"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pubipd/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self { mirrors, client })
    }

    /// Create a resolver from configuration
    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        Self::new(config.mirrors.clone(), Duration::from_secs(config.timeout_secs))
    }

    /// Mirrors this resolver asks, in order
    pub fn mirrors(&self) -> &[String] {
        &self.mirrors
    }

    /// Ask a single mirror
    async fn fetch_ip(&self, url: &str) -> Result<IpAddress> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::ip_resolution(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ip_resolution(format!(
                "{} answered with HTTP {}",
                url, status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::ip_resolution(format!("cannot read body from {}: {}", url, e)))?;

        IpAddress::new(body.trim())
            .map_err(|e| Error::ip_resolution(format!("{} returned no usable address: {}", url, e)))
    }
}

#[async_trait::async_trait]
impl IpResolver for HttpIpResolver {
    async fn resolve(&self) -> Result<IpAddress> {
        let mut failures = Vec::with_capacity(self.mirrors.len());

        for url in &self.mirrors {
            match self.fetch_ip(url).await {
                Ok(ip) => {
                    debug!(mirror = %url, %ip, "public ip resolved");
                    return Ok(ip);
                }
                Err(e) => {
                    warn!(mirror = %url, error = %e, "mirror failed, trying next");
                    failures.push(e.to_string());
                }
            }
        }

        Err(Error::ip_resolution(format!(
            "all {} mirrors failed: {}",
            self.mirrors.len(),
            failures.join("; ")
        )))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
