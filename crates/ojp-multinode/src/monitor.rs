//! Periodic, best-effort health probing of proxy endpoints.

use crate::channel::ChannelCache;
use crate::config::MultinodeConfig;
use crate::events::EndpointEvent;
use crate::failover::FailureHandler;
use crate::registry::EndpointRegistry;
use ojp_core::events::EventListeners;
use ojp_core::rpc::ConnectRequest;
use ojp_core::{Endpoint, SessionInfo};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Probes known-bad endpoints for recovery and, in XA mode, known-good
/// endpoints for silent failure.
///
/// One cooperative task per multinode manager. Passes are time-gated by a
/// CAS on the last-check stamp: if another task is already probing, the
/// trigger is skipped.
pub struct HealthMonitor {
    name: String,
    registry: Arc<EndpointRegistry>,
    channels: Arc<ChannelCache>,
    failure: Arc<FailureHandler>,
    events: Arc<EventListeners<EndpointEvent>>,
    interval: Duration,
    recovery_threshold: Duration,
    probe_timeout: Duration,
    probe_url: String,
    probe_user: String,
    probe_password: String,
    xa_mode: bool,
    origin: Instant,
    last_check_nanos: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    /// Wires a monitor over the shared multinode state.
    pub fn new(
        config: &MultinodeConfig,
        registry: Arc<EndpointRegistry>,
        channels: Arc<ChannelCache>,
        failure: Arc<FailureHandler>,
        events: Arc<EventListeners<EndpointEvent>>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            registry,
            channels,
            failure,
            events,
            interval: config.health_interval,
            recovery_threshold: config.recovery_threshold,
            probe_timeout: config.probe_timeout,
            probe_url: config.probe_credentials.url.clone(),
            probe_user: config.probe_credentials.user.clone(),
            probe_password: config.probe_credentials.password.clone(),
            xa_mode: config.xa_mode,
            origin: Instant::now(),
            last_check_nanos: AtomicU64::new(0),
            task: Mutex::new(None),
        }
    }

    /// Starts the background probe task.
    pub fn start(self: &Arc<Self>) {
        let monitor = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                monitor.run_pass().await;
            }
        });
        let mut guard = self.task.lock().unwrap();
        if let Some(previous) = guard.replace(task) {
            previous.abort();
        }
    }

    /// Stops the background probe task.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
    }

    /// One monitor pass, CAS-gated so concurrent triggers collapse into a
    /// single prober.
    pub async fn run_pass(&self) {
        let now = self.origin.elapsed().as_nanos() as u64;
        let last = self.last_check_nanos.load(Ordering::Acquire);
        if now.saturating_sub(last) < self.interval.as_nanos() as u64 && last != 0 {
            return;
        }
        if self
            .last_check_nanos
            .compare_exchange(last, now.max(1), Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Another task won the stamp and is probing.
            return;
        }

        if self.xa_mode {
            for state in self.registry.healthy_states() {
                let endpoint = state.endpoint().clone();
                if !self.probe(&endpoint).await {
                    tracing::warn!(endpoint = %endpoint, "healthy endpoint failed probe");
                    self.failure.on_connection_failure(&endpoint);
                }
            }
        }

        for state in self.registry.unhealthy_states() {
            let due = self
                .registry
                .elapsed_since_failure(&state)
                .map_or(true, |elapsed| elapsed >= self.recovery_threshold);
            if !due {
                continue;
            }
            let endpoint = state.endpoint().clone();
            self.probe_for_recovery(&endpoint).await;
        }
    }

    /// Last-resort pass: probes every unhealthy endpoint immediately,
    /// ignoring the recovery threshold. Used when selection finds no
    /// healthy endpoint at all.
    pub async fn recovery_pass(&self) {
        for state in self.registry.unhealthy_states() {
            let endpoint = state.endpoint().clone();
            self.probe_for_recovery(&endpoint).await;
        }
    }

    async fn probe_for_recovery(&self, endpoint: &Endpoint) {
        if self.probe(endpoint).await {
            if self.registry.mark_healthy(endpoint) {
                tracing::info!(endpoint = %endpoint, "endpoint recovered");
                self.events.emit(&EndpointEvent::Recovered {
                    source: self.name.clone(),
                    timestamp: Instant::now(),
                    endpoint: endpoint.clone(),
                });
            }
        } else {
            self.registry.refresh_failure(endpoint);
        }
    }

    /// Probes one endpoint: a real `connect` with the probe credentials,
    /// immediately terminated. Any failure, including the probe timeout,
    /// counts as a failed probe.
    async fn probe(&self, endpoint: &Endpoint) -> bool {
        let outcome = tokio::time::timeout(self.probe_timeout, self.probe_connect(endpoint)).await;
        let healthy = matches!(outcome, Ok(true));

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "ojp_health_probes_total",
            "manager" => self.name.clone(),
            "endpoint" => endpoint.address(),
            "outcome" => if healthy { "ok" } else { "failed" }
        )
        .increment(1);

        healthy
    }

    async fn probe_connect(&self, endpoint: &Endpoint) -> bool {
        let entry = match self.channels.get_or_create(endpoint) {
            Ok(entry) => entry,
            Err(error) => {
                tracing::debug!(endpoint = %endpoint, %error, "probe channel construction failed");
                return false;
            }
        };

        let request = ConnectRequest {
            session: SessionInfo::default(),
            url: self.probe_url.clone(),
            user: self.probe_user.clone(),
            password: self.probe_password.clone(),
            properties: HashMap::new(),
        };

        match entry.stub().connect(request).await {
            Ok(reply) => {
                // Clean up the test session; a failed terminate does not
                // fail the probe.
                if reply.session.is_established() {
                    if let Err(error) = entry.stub().terminate_session(reply.session).await {
                        tracing::debug!(endpoint = %endpoint, %error, "probe session terminate failed");
                    }
                }
                true
            }
            Err(error) => {
                tracing::debug!(endpoint = %endpoint, %error, "probe connect failed");
                false
            }
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}
