//! Main entry point for the cinder-miner daemon.

use cinder_miner::{daemon::Daemon, tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init();

    let daemon = Daemon::new();
    daemon.run().await
}
