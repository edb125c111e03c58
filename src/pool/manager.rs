//! Pool manager: endpoint selection, reconnection, and failover.
//!
//! The manager owns the active [`PoolClient`], wires its events to the
//! farm, and supervises the connection: every disconnect bumps a retry
//! counter, and when it reaches the configured threshold the manager
//! rotates to the next endpoint (wrapping back to the primary). Received
//! work resets the counter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::endpoint::Endpoint;
use super::work::Solution;
use super::{PoolClient, PoolEvent};
use crate::farm::FarmFacade;

/// Manager tunables.
#[derive(Debug, Clone)]
pub struct PoolManagerConfig {
    /// Consecutive failed sessions before rotating endpoints
    pub connect_retries: u32,

    /// Endpoint list bound: primary plus failovers
    pub max_endpoints: usize,

    /// How often to report the farm's hashrate upstream
    pub hashrate_interval: Duration,
}

impl Default for PoolManagerConfig {
    fn default() -> Self {
        Self {
            connect_retries: 3,
            max_endpoints: 2,
            hashrate_interval: Duration::from_secs(60),
        }
    }
}

/// Observable manager state, polled by the daemon's status line.
#[derive(Default)]
pub struct ManagerStatus {
    running: AtomicBool,
    connected: AtomicBool,
}

impl ManagerStatus {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Supervisor for one pool client over an ordered endpoint list.
pub struct PoolManager {
    client: Box<dyn PoolClient>,
    farm: Arc<dyn FarmFacade>,
    config: PoolManagerConfig,
    endpoints: Vec<Endpoint>,
    active: usize,
    events: mpsc::Receiver<PoolEvent>,
    solutions: mpsc::UnboundedReceiver<Solution>,
    status: Arc<ManagerStatus>,
    retries: u32,
    submit_time: Option<Instant>,
}

impl PoolManager {
    pub fn new(
        mut client: Box<dyn PoolClient>,
        farm: Arc<dyn FarmFacade>,
        solutions: mpsc::UnboundedReceiver<Solution>,
        config: PoolManagerConfig,
    ) -> Self {
        let events = client
            .take_event_receiver()
            .expect("pool client event receiver already taken");

        Self {
            client,
            farm,
            config,
            endpoints: Vec::new(),
            active: 0,
            events,
            solutions,
            status: Arc::new(ManagerStatus::default()),
            retries: 0,
            submit_time: None,
        }
    }

    /// Append an endpoint: index 0 is the primary, the rest are failovers.
    pub fn add_endpoint(&mut self, endpoint: Endpoint) -> anyhow::Result<()> {
        if self.endpoints.len() >= self.config.max_endpoints {
            bail!(
                "too many endpoints, maximum is {}",
                self.config.max_endpoints
            );
        }
        self.endpoints.push(endpoint);
        Ok(())
    }

    /// Handle for the daemon to observe `is_running`/`is_connected`.
    pub fn status(&self) -> Arc<ManagerStatus> {
        self.status.clone()
    }

    /// Run until cancelled. Fails fast when no endpoint was configured.
    pub async fn run(mut self, shutdown: CancellationToken) -> anyhow::Result<()> {
        if self.endpoints.is_empty() {
            bail!("pool manager started with no endpoints");
        }

        self.status.running.store(true, Ordering::Relaxed);

        let endpoint = self.endpoints[self.active].clone();
        info!(pool = %endpoint, "starting with primary endpoint");
        self.client.set_endpoint(endpoint);
        self.client.connect().await;

        // First report one interval from now; an immediate one would be zero
        let mut hashrate_timer = tokio::time::interval_at(
            Instant::now() + self.config.hashrate_interval,
            self.config.hashrate_interval,
        );

        loop {
            tokio::select! {
                Some(event) = self.events.recv() => {
                    self.handle_event(event).await;
                }

                Some(solution) = self.solutions.recv() => {
                    if solution.stale {
                        warn!("stale solution found, submitting anyway");
                    }
                    self.submit_time = Some(Instant::now());
                    self.client.submit_solution(solution).await;
                }

                _ = hashrate_timer.tick() => {
                    // Minimal-hex H/s, the form pools expect
                    let rate = format!("{:#x}", self.farm.hashrate() as u64);
                    self.client.submit_hashrate(rate).await;
                }

                _ = shutdown.cancelled() => break,
            }
        }

        info!("pool manager stopping");
        self.client.disconnect().await;
        self.farm.clear_work();
        self.status.connected.store(false, Ordering::Relaxed);
        self.status.running.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn handle_event(&mut self, event: PoolEvent) {
        match event {
            PoolEvent::Connected => {
                self.status.connected.store(true, Ordering::Relaxed);
                info!(pool = %self.endpoints[self.active], "connected");
            }

            PoolEvent::Disconnected => {
                self.status.connected.store(false, Ordering::Relaxed);
                // Any in-flight submission died with the session; its epoch
                // is over, so nothing is left to account for.
                self.submit_time = None;
                self.try_reconnect().await;
            }

            PoolEvent::WorkReceived(work) => {
                self.retries = 0;
                debug!(
                    job = %work.job,
                    difficulty = format!("{:.3}", work.difficulty()),
                    "work package received"
                );
                self.farm.set_work(work);
            }

            PoolEvent::SolutionAccepted { stale } => {
                let latency = self.elapsed_since_submit();
                info!(latency_ms = latency, stale, "solution accepted");
                self.farm.record_accepted(stale);
            }

            PoolEvent::SolutionRejected { stale } => {
                let latency = self.elapsed_since_submit();
                warn!(latency_ms = latency, stale, "solution rejected");
                self.farm.record_rejected(stale);
            }
        }
    }

    fn elapsed_since_submit(&mut self) -> u64 {
        self.submit_time
            .take()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    /// Reconnect after a session death, rotating endpoints when the retry
    /// budget for the current one is spent.
    async fn try_reconnect(&mut self) {
        // Breathe between attempts so a flapping pool doesn't spin us
        tokio::time::sleep(Duration::from_secs(3)).await;

        if self.endpoints.len() > 1 {
            self.retries += 1;
            if self.retries >= self.config.connect_retries {
                self.retries = 0;
                self.active = (self.active + 1) % self.endpoints.len();
                let endpoint = self.endpoints[self.active].clone();
                info!(pool = %endpoint, "rotating to next endpoint");
                self.client.set_endpoint(endpoint);
            }
        }

        self.client.connect().await;
    }
}
