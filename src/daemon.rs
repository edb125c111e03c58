//! Daemon lifecycle management for cinder-miner.
//!
//! Wires the pool manager to the farm, installs signal handlers, and
//! shuts everything down cooperatively. Configuration is environment
//! driven; there is no config file.
//!
//! | Variable | Meaning |
//! |---|---|
//! | `CINDER_POOL_URL` | Primary pool URI (required) |
//! | `CINDER_POOL_FAILOVER_URL` | Failover pool URI |
//! | `CINDER_POOL_RETRIES` | Session failures before endpoint rotation (default 3) |
//! | `CINDER_WORK_TIMEOUT` | Seconds without new work before reconnect (default 180) |
//! | `CINDER_EMAIL` | Email some eth-proxy pools take at login |
//! | `CINDER_REPORT_HASHRATE` | `1`/`true` to report hashrate upstream |
//! | `CINDER_ALLOW_SELFSIGNED` | `1`/`true` to skip TLS certificate verification |

use std::time::Duration;

use anyhow::Context;
use tokio::signal::unix::{self, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::tracing::prelude::*;
use crate::{
    farm::{Farm, FarmFacade},
    pool::{
        endpoint::{Endpoint, ProtocolFamily},
        manager::{PoolManager, PoolManagerConfig},
    },
    stratum::{StratumClient, StratumConfig},
};

/// The main daemon.
pub struct Daemon {
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    /// Create a new daemon instance.
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Run the daemon until shutdown is requested.
    pub async fn run(self) -> anyhow::Result<()> {
        let url = std::env::var("CINDER_POOL_URL")
            .context("CINDER_POOL_URL is not set; nothing to mine against")?;
        let mut primary = Endpoint::parse(&url)?;

        let mut failover = std::env::var("CINDER_POOL_FAILOVER_URL")
            .ok()
            .map(|url| Endpoint::parse(&url))
            .transpose()?;

        for ep in std::iter::once(&primary).chain(failover.as_ref()) {
            if ep.family() != ProtocolFamily::Stratum {
                anyhow::bail!("getwork endpoints are not supported by this build: {ep}");
            }
        }

        if env_flag("CINDER_ALLOW_SELFSIGNED") {
            primary.allow_selfsigned();
            if let Some(ep) = &mut failover {
                ep.allow_selfsigned();
            }
        }

        let stratum_config = StratumConfig {
            work_timeout: Duration::from_secs(env_u64("CINDER_WORK_TIMEOUT", 180)),
            email: std::env::var("CINDER_EMAIL").unwrap_or_default(),
            report_hashrate: env_flag("CINDER_REPORT_HASHRATE"),
            ..StratumConfig::default()
        };

        let manager_config = PoolManagerConfig {
            connect_retries: env_u64("CINDER_POOL_RETRIES", 3) as u32,
            ..PoolManagerConfig::default()
        };

        // Farm first: miners attach to it; the manager only borrows it
        let (farm, solution_rx) = Farm::new();

        let client = Box::new(StratumClient::new(stratum_config));
        let facade: std::sync::Arc<dyn FarmFacade> = farm.clone();
        let mut manager = PoolManager::new(client, facade, solution_rx, manager_config);
        manager.add_endpoint(primary)?;
        if let Some(ep) = failover {
            manager.add_endpoint(ep)?;
        }
        let status = manager.status();

        self.tracker.spawn({
            let shutdown = self.shutdown.clone();
            async move {
                if let Err(e) = manager.run(shutdown).await {
                    error!("Pool manager error: {}", e);
                }
            }
        });

        // Periodic status line, in place of a control surface
        self.tracker.spawn({
            let shutdown = self.shutdown.clone();
            let farm = farm.clone();
            let status = status.clone();
            async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(15));
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if status.is_connected() {
                                info!(
                                    hashrate_mhs = format!("{:.2}", farm.hashrate() / 1e6),
                                    shares = %farm.solution_stats(),
                                    "mining"
                                );
                            } else {
                                info!("not connected");
                            }
                        }
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        });
        self.tracker.close();

        info!("Started.");

        // Install signal handlers
        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        // Wait for shutdown signal
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            },
        }

        // Initiate shutdown and wait for all tasks to finish
        self.shutdown.cancel();
        self.tracker.wait().await;
        info!("Exiting.");

        Ok(())
    }
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
