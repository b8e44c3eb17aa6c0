//! Core publish engine
//!
//! The PublishEngine is responsible for:
//! - Resolving the current public IP via IpResolver
//! - Publishing it into the node's annotations via NodeStore
//! - Optionally publishing it as the node's ExternalIP status address
//! - Running that cycle once at startup and then on every schedule tick
//!
//! ## Architecture
//!
//! ```text
//!  schedule tick ──┐
//!                  ▼
//!          ┌──────────────┐   resolve()   ┌─────────────┐
//!          │ PublishEngine│──────────────▶│ IpResolver  │
//!          └──────────────┘               └─────────────┘
//!                  │
//!        ┌─────────┴──────────┐
//!        ▼                    ▼
//! ┌─────────────┐     ┌──────────────┐
//! │ annotations │────▶│ external ip  │   (only if enabled and
//! │ reconciler  │     │ reconciler   │    annotations succeeded)
//! └─────────────┘     └──────────────┘
//!        │                    │
//!        └────────┬───────────┘
//!                 ▼
//!          ┌─────────────┐
//!          │  NodeStore  │
//!          └─────────────┘
//! ```
//!
//! ## Failure handling
//!
//! 1. IP resolution failure: fatal, the run loop stops with the error
//! 2. Annotation write failure: logged, cycle ends, next tick retries
//! 3. Node missing during external-IP reconciliation: fatal
//! 4. External-IP status write failure: logged, next tick retries

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::config::PublisherConfig;
use crate::error::{Error, Result};
use crate::ip::IpAddress;
use crate::reconcile::{
    self, AnnotationOutcome, ExternalIpOutcome, FIELD_MANAGER, reconcile_annotations,
    reconcile_external_ip,
};
use crate::schedule::Schedule;
use crate::traits::{IpResolver, NodeStore};

/// Events emitted by the PublishEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started { node_name: String },

    /// A reconciliation cycle began
    CycleStarted { cycle: u64 },

    /// Public IP resolved for the current cycle
    IpResolved { ip: IpAddress },

    /// Annotation patch submitted
    AnnotationsPatched { ip: IpAddress, operations: usize },

    /// Annotations already carried the IP
    AnnotationsUnchanged { ip: IpAddress },

    /// Annotation reconciliation failed (cycle-local)
    AnnotationPatchFailed { error: String },

    /// ExternalIP address already matched
    ExternalIpUnchanged { ip: IpAddress },

    /// ExternalIP address rewritten in place
    ExternalIpUpdated { ip: IpAddress, previous: String },

    /// ExternalIP address appended
    ExternalIpAppended { ip: IpAddress },

    /// External-IP reconciliation failed (cycle-local)
    ExternalIpPatchFailed { error: String },

    /// A tick fired while a cycle was still running
    CycleSkipped,

    /// Engine stopped
    Stopped { reason: String },
}

/// Summary of one completed (non-fatal) cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// The IP resolved for this cycle
    pub ip: IpAddress,

    /// Annotation reconciler result; `Err` carries the logged failure
    pub annotations: std::result::Result<AnnotationOutcome, String>,

    /// External-IP reconciler result; `None` when it did not run
    pub external_ip: Option<std::result::Result<ExternalIpOutcome, String>>,
}

/// Marks a cycle as running; clears the flag when dropped
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Core publish engine
///
/// ## Lifecycle
///
/// 1. Create with [`PublishEngine::new()`]
/// 2. Wrap in an `Arc` and start with [`PublishEngine::run()`]
/// 3. The first cycle runs immediately, later ones on each schedule tick
/// 4. Runs until SIGINT/SIGTERM (`Ok`) or a fatal cycle error (`Err`)
///
/// ## Overlap
///
/// Cycles are single-flight: a tick that arrives while a cycle is still
/// running is skipped and reported with [`EngineEvent::CycleSkipped`].
pub struct PublishEngine {
    /// Public IP resolver
    resolver: Box<dyn IpResolver>,

    /// Cluster node store
    store: Box<dyn NodeStore>,

    /// Node this process publishes for
    node_name: String,

    /// Annotation keys to publish into
    annotation_keys: Vec<String>,

    /// Whether to manage the ExternalIP status address
    set_external_ip: bool,

    /// Cycle schedule; `None` runs the startup cycle only
    schedule: Option<Schedule>,

    /// Deadline applied to each node store call
    call_timeout: Duration,

    /// Deadline for one public IP resolution across all mirrors
    resolve_timeout: Duration,

    /// Set while a cycle is running
    in_flight: Arc<AtomicBool>,

    /// Number of cycles started so far
    cycles: AtomicU64,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl PublishEngine {
    /// Create a new publish engine
    ///
    /// The configuration is validated here; an invalid configuration is
    /// returned as `Error::Config` and no engine is built.
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        resolver: Box<dyn IpResolver>,
        store: Box<dyn NodeStore>,
        mut config: PublisherConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let schedule = if config.schedule.disabled {
            None
        } else {
            Some(config.schedule.parse()?)
        };

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            resolver,
            store,
            node_name: config.node_name,
            annotation_keys: config.annotation_keys,
            set_external_ip: config.set_external_ip,
            schedule,
            call_timeout: Duration::from_secs(config.engine.call_timeout_secs),
            resolve_timeout: Duration::from_secs(config.resolver.deadline_secs()),
            in_flight: Arc::new(AtomicBool::new(false)),
            cycles: AtomicU64::new(0),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Node this engine publishes for
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Whether a cycle is currently running
    pub fn is_cycle_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run the engine until a shutdown signal or a fatal error
    pub async fn run(self: Arc<Self>) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the engine with a programmatic shutdown signal instead of OS signals
    pub async fn run_with_shutdown(self: Arc<Self>, shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        self.run_internal(Some(shutdown_rx)).await
    }

    async fn run_internal(self: Arc<Self>, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.emit_event(EngineEvent::Started {
            node_name: self.node_name.clone(),
        });
        match &self.schedule {
            Some(schedule) => info!(%schedule, "starting publish engine"),
            None => info!("starting publish engine, schedule disabled: single run"),
        }

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                    "shutdown signal"
                }
                None => wait_for_signal().await,
            }
        };
        tokio::pin!(shutdown);

        let (fatal_tx, mut fatal_rx) = mpsc::channel::<Error>(1);

        // First run without waiting for the schedule
        let mut current = self.dispatch(&fatal_tx);

        loop {
            let delay = self
                .schedule
                .as_ref()
                .and_then(|schedule| schedule.next_delay(chrono::Utc::now()));
            let tick = async move {
                match delay {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = tick => {
                    if let Some(handle) = self.dispatch(&fatal_tx) {
                        current = Some(handle);
                    }
                }

                Some(err) = fatal_rx.recv() => {
                    error!(error = %err, "fatal error, stopping engine");
                    self.emit_event(EngineEvent::Stopped {
                        reason: err.to_string(),
                    });
                    return Err(err);
                }

                reason = &mut shutdown => {
                    info!(reason, "shutdown requested, waiting for in-flight cycle");
                    if let Some(handle) = current.take() {
                        let _ = handle.await;
                    }
                    // A cycle that failed fatally while we waited still wins
                    if let Ok(err) = fatal_rx.try_recv() {
                        self.emit_event(EngineEvent::Stopped {
                            reason: err.to_string(),
                        });
                        return Err(err);
                    }
                    self.emit_event(EngineEvent::Stopped {
                        reason: reason.to_string(),
                    });
                    return Ok(());
                }
            }
        }
    }

    /// Spawn a cycle unless one is already running
    fn dispatch(self: &Arc<Self>, fatal_tx: &mpsc::Sender<Error>) -> Option<JoinHandle<()>> {
        let Some(slot) = InFlight::acquire(&self.in_flight) else {
            self.report_skip();
            return None;
        };

        let engine = Arc::clone(self);
        let fatal_tx = fatal_tx.clone();
        Some(tokio::spawn(async move {
            let _slot = slot;
            if let Err(err) = engine.run_cycle().await {
                let _ = fatal_tx.send(err).await;
            }
        }))
    }

    /// Run one cycle unless one is already running
    ///
    /// Returns `None` when the cycle was skipped.
    pub async fn try_run_cycle(&self) -> Option<Result<CycleReport>> {
        let Some(_slot) = InFlight::acquire(&self.in_flight) else {
            self.report_skip();
            return None;
        };
        Some(self.run_cycle().await)
    }

    fn report_skip(&self) {
        warn!(node_name = %self.node_name, "previous cycle still running, skipping this one");
        self.emit_event(EngineEvent::CycleSkipped);
    }

    /// Run one reconciliation cycle
    ///
    /// Only fatal errors are returned as `Err`; cycle-local failures are
    /// logged and reported inside the [`CycleReport`].
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let span = info_span!(
            "cycle",
            cycle,
            node_name = %self.node_name,
            public_ip = tracing::field::Empty,
        );
        self.cycle_in_span(cycle, span.clone()).instrument(span).await
    }

    async fn cycle_in_span(&self, cycle: u64, span: Span) -> Result<CycleReport> {
        debug!("preparing to patch");
        self.emit_event(EngineEvent::CycleStarted { cycle });

        let ip = match self.resolve().await {
            Ok(ip) => ip,
            Err(err) => {
                error!(error = %err, resolver = self.resolver.name(), "cannot obtain public ip");
                return Err(err);
            }
        };
        span.record("public_ip", tracing::field::display(&ip));
        self.emit_event(EngineEvent::IpResolved { ip: ip.clone() });

        let annotations = match reconcile_annotations(
            self.store.as_ref(),
            &self.node_name,
            &self.annotation_keys,
            &ip,
            FIELD_MANAGER,
            self.call_timeout,
        )
        .await
        {
            Ok(outcome) => {
                self.emit_event(match &outcome {
                    AnnotationOutcome::Patched { operations } => EngineEvent::AnnotationsPatched {
                        ip: ip.clone(),
                        operations: *operations,
                    },
                    AnnotationOutcome::Unchanged => {
                        EngineEvent::AnnotationsUnchanged { ip: ip.clone() }
                    }
                });
                outcome
            }
            Err(err) => {
                error!(error = %err, "cannot patch the node annotations");
                self.emit_event(EngineEvent::AnnotationPatchFailed {
                    error: err.to_string(),
                });
                return Ok(CycleReport {
                    ip,
                    annotations: Err(err.to_string()),
                    external_ip: None,
                });
            }
        };

        if !self.set_external_ip {
            return Ok(CycleReport {
                ip,
                annotations: Ok(annotations),
                external_ip: None,
            });
        }

        let external_ip = match reconcile_external_ip(
            self.store.as_ref(),
            &self.node_name,
            &ip,
            self.call_timeout,
        )
        .await
        {
            Ok(outcome) => {
                self.emit_event(match &outcome {
                    ExternalIpOutcome::Unchanged => EngineEvent::ExternalIpUnchanged { ip: ip.clone() },
                    ExternalIpOutcome::Updated { previous } => EngineEvent::ExternalIpUpdated {
                        ip: ip.clone(),
                        previous: previous.clone(),
                    },
                    ExternalIpOutcome::Appended => EngineEvent::ExternalIpAppended { ip: ip.clone() },
                });
                Ok(outcome)
            }
            Err(err @ Error::NodeNotFound(_)) => {
                error!(error = %err, "could not find the node");
                return Err(err);
            }
            Err(err) => {
                error!(error = %err, "cannot patch node's external ip");
                self.emit_event(EngineEvent::ExternalIpPatchFailed {
                    error: err.to_string(),
                });
                Err(err.to_string())
            }
        };

        Ok(CycleReport {
            ip,
            annotations: Ok(annotations),
            external_ip: Some(external_ip),
        })
    }

    /// Resolve the public IP; every failure, including a timeout, is fatal
    async fn resolve(&self) -> Result<IpAddress> {
        let operation = format!("resolve public ip via {}", self.resolver.name());
        match reconcile::bounded(&operation, self.resolve_timeout, self.resolver.resolve()).await {
            Ok(ip) => Ok(ip),
            Err(err @ Error::IpResolution(_)) => Err(err),
            Err(other) => Err(Error::ip_resolution(other.to_string())),
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "cannot install unix signal handlers, falling back to ctrl-c");
            wait_for_ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> &'static str {
    ctrl_c_outcome(tokio::signal::ctrl_c().await).await
}

/// A failed ctrl-c listener never resolves, so it cannot stop the engine
async fn ctrl_c_outcome(result: std::io::Result<()>) -> &'static str {
    if let Err(e) = result {
        error!(error = %e, "failed to wait for ctrl-c, signal shutdown is unavailable");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_slot_is_exclusive_and_released_on_drop() {
        let flag = Arc::new(AtomicBool::new(false));

        let slot = InFlight::acquire(&flag).expect("first acquire succeeds");
        assert!(InFlight::acquire(&flag).is_none());

        drop(slot);
        assert!(!flag.load(Ordering::Acquire));
        assert!(InFlight::acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn test_failed_ctrl_c_listener_does_not_trigger_shutdown() {
        let failed = Err(std::io::Error::other("no signal driver"));
        let waited = tokio::time::timeout(Duration::from_millis(100), ctrl_c_outcome(failed)).await;
        assert!(waited.is_err(), "must keep waiting instead of reporting a signal");

        assert_eq!(ctrl_c_outcome(Ok(())).await, "SIGINT");
    }

    #[test]
    fn test_engine_events_compare_by_value() {
        let ip = IpAddress::new("203.0.113.7").unwrap();
        let event = EngineEvent::ExternalIpAppended { ip: ip.clone() };
        assert_eq!(event.clone(), EngineEvent::ExternalIpAppended { ip });
    }
}
