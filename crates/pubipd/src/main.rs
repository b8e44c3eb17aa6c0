// # pubipd - Public IP Publisher Daemon
//
// This is a thin integration layer: all reconciliation logic lives in
// pubip-core, the cluster and HTTP specifics in the adapter crates.
//
// The pubipd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Building the IP resolver and the node store
// 4. Running the publish engine and turning its outcome into an exit code
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Target
// - `NODE_NAME`: Node to publish for (required)
// - `KEYS`: Annotation keys, separated by commas or whitespace (required)
// - `SET_EXTERNAL_IP`: Also manage the node's ExternalIP address (default false)
//
// ### Schedule
// - `CRON`: `@every <duration>` or a cron expression with seconds (default `@every 5m`)
// - `CRON_DISABLE`: Run a single cycle at startup only (default false)
//
// ### Cluster
// - `USE_CONFIG`: Use a kubeconfig file instead of in-cluster credentials (default false)
// - `KUBE_CONFIG_PATH`: Kubeconfig path (default `$HOME/.kube/config`)
//
// ### Resolver and timeouts
// - `IP_MIRRORS`: Comma-separated mirror URLs
// - `IP_RESOLVE_TIMEOUT_SECS`: Per-mirror timeout (default 10)
// - `CALL_TIMEOUT_SECS`: Deadline for each cluster call (default 30)
//
// ### Logging
// - `LOG_LEVEL`: trace, debug, info, warn, error (default debug)
// - `LOG_FORMAT`: text or json (default text)
//
// ## Example
//
// ```bash
// export NODE_NAME=worker-1
// export KEYS="example.com/public-ip,public-ip"
// export SET_EXTERNAL_IP=true
// export CRON="@every 10m"
//
// pubipd
// ```

use anyhow::{Context, Result};
use pubip_core::{ClusterConfig, PublishEngine, PublisherConfig};
use pubip_ip_http::HttpIpResolver;
use pubip_kube::KubeNodeStore;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, debug, error, info};

/// Exit codes for different termination scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PubipExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// The public IP could not be determined
    CannotObtainIp = 1,
    /// The configured node does not exist
    CannotFindNode = 2,
    /// Configuration error or startup failure
    ConfigError = 3,
    /// Runtime error (unexpected failure)
    RuntimeError = 4,
}

impl From<PubipExitCode> for ExitCode {
    fn from(code: PubipExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

impl PubipExitCode {
    /// Classify a daemon failure
    fn for_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<pubip_core::Error>() {
            Some(pubip_core::Error::IpResolution(_)) => Self::CannotObtainIp,
            Some(pubip_core::Error::NodeNotFound(_)) => Self::CannotFindNode,
            Some(pubip_core::Error::Config(_)) | Some(pubip_core::Error::Schedule(_)) => {
                Self::ConfigError
            }
            _ => Self::RuntimeError,
        }
    }
}

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

/// Application configuration
#[derive(Debug)]
struct Config {
    publisher: PublisherConfig,
    log_level: Level,
    log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value if set
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let node_name = var("NODE_NAME").unwrap_or_default();
        let keys = var("KEYS").map(|raw| split_list(&raw)).unwrap_or_default();

        let mut publisher = PublisherConfig::new(node_name.trim(), keys)
            .with_external_ip(parse_bool("SET_EXTERNAL_IP", var("SET_EXTERNAL_IP"))?);

        if let Some(expression) = var("CRON") {
            publisher.schedule.expression = expression.trim().to_string();
        }
        publisher.schedule.disabled = parse_bool("CRON_DISABLE", var("CRON_DISABLE"))?;

        if parse_bool("USE_CONFIG", var("USE_CONFIG"))? {
            let path = var("KUBE_CONFIG_PATH").unwrap_or_else(|| default_kubeconfig_path(var("HOME")));
            publisher.cluster = ClusterConfig::Kubeconfig { path };
        }

        if let Some(mirrors) = var("IP_MIRRORS") {
            publisher.resolver.mirrors = split_list(&mirrors);
        }
        if let Some(secs) = var("IP_RESOLVE_TIMEOUT_SECS") {
            publisher.resolver.timeout_secs = parse_secs("IP_RESOLVE_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = var("CALL_TIMEOUT_SECS") {
            publisher.engine.call_timeout_secs = parse_secs("CALL_TIMEOUT_SECS", &secs)?;
        }

        let log_level = match var("LOG_LEVEL").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("debug") => Level::DEBUG,
            Some("trace") => Level::TRACE,
            Some("info") => Level::INFO,
            Some("warn") => Level::WARN,
            Some("error") => Level::ERROR,
            Some(other) => anyhow::bail!(
                "LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                other
            ),
        };

        let log_format = match var("LOG_FORMAT").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => anyhow::bail!("LOG_FORMAT '{}' is not valid. Valid formats: text, json", other),
        };

        Ok(Self {
            publisher,
            log_level,
            log_format,
        })
    }

    /// Validate the configuration
    fn validate(&mut self) -> Result<()> {
        if self.publisher.node_name.is_empty() {
            anyhow::bail!("NODE_NAME is required. Set it via: export NODE_NAME=$(hostname)");
        }
        self.publisher.validate()?;
        Ok(())
    }
}

/// Split a comma- or whitespace-separated list
fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a boolean flag; unset means false
fn parse_bool(name: &str, value: Option<String>) -> Result<bool> {
    match value.as_deref().map(str::trim) {
        None => Ok(false),
        Some("1" | "t" | "T" | "true" | "TRUE" | "True") => Ok(true),
        Some("0" | "f" | "F" | "false" | "FALSE" | "False") => Ok(false),
        Some(other) => anyhow::bail!("{} must be a boolean. Got: {}", name, other),
    }
}

fn parse_secs(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a whole number of seconds. Got: {}", name, value))
}

fn default_kubeconfig_path(home: Option<String>) -> String {
    let mut path = std::path::PathBuf::from(home.unwrap_or_default());
    path.push(".kube");
    path.push("config");
    path.to_string_lossy().into_owned()
}

fn main() -> ExitCode {
    // Load configuration from environment
    let mut config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return PubipExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return PubipExitCode::ConfigError.into();
    }

    // Initialize tracing
    let installed = match config.log_format {
        LogFormat::Text => tracing::subscriber::set_global_default(
            tracing_subscriber::fmt().with_max_level(config.log_level).finish(),
        ),
        LogFormat::Json => tracing::subscriber::set_global_default(
            tracing_subscriber::fmt()
                .with_max_level(config.log_level)
                .json()
                .finish(),
        ),
    };
    if let Err(e) = installed {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return PubipExitCode::ConfigError.into();
    }

    info!(
        node = %config.publisher.node_name,
        keys = config.publisher.annotation_keys.len(),
        set_external_ip = config.publisher.set_external_ip,
        "starting pubipd"
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return PubipExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match run_daemon(config.publisher).await {
            Ok(()) => PubipExitCode::CleanShutdown,
            Err(e) => {
                let code = PubipExitCode::for_error(&e);
                error!(exit_code = code as u8, "daemon stopped: {:#}", e);
                code
            }
        }
    });

    code.into()
}

/// Run the daemon until shutdown or a fatal error
async fn run_daemon(publisher: PublisherConfig) -> Result<()> {
    let resolver = HttpIpResolver::from_config(&publisher.resolver)?;
    info!(mirrors = ?resolver.mirrors(), "public ip resolver ready");

    let store = KubeNodeStore::connect(&publisher.cluster)
        .await
        .context("cannot connect to cluster")?;

    let (engine, mut events) = PublishEngine::new(Box::new(resolver), Box::new(store), publisher)?;

    // Nothing else consumes engine events here; keep the channel drained
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "engine event");
        }
    });

    Arc::new(engine).run().await?;
    info!("shutdown complete");
    Ok(())
}
