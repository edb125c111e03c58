//! Stratum mining pool client.
//!
//! Ethash pools speak JSON-RPC over a raw TCP connection (optionally TLS),
//! one message per line, in one of three mutually incompatible dialects:
//!
//! - **Stratum**: `mining.subscribe` / `mining.authorize`, jobs arrive as
//!   `mining.notify` with the share target inline.
//! - **EthProxy**: node-RPC style, `eth_submitLogin` then `eth_getWork`;
//!   many pools push jobs as replies to requests nobody made.
//! - **EthereumStratum/1.0.0**: NiceHash's variant, where the pool assigns
//!   an extranonce prefix and announces difficulty separately; the client
//!   derives the share target itself.
//!
//! # Architecture
//!
//! The session runs as one async task that owns the socket, the protocol
//! state, and the timers, and pushes [`crate::pool::PoolEvent`]s to its
//! consumer over a channel. External threads (the farm's miners) reach it
//! only through thread-safe command submission on the client handle. This
//! fits the [`crate::pool::PoolClient`] seam the manager supervises.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cinder_miner::pool::{PoolClient, PoolEvent};
//! use cinder_miner::stratum::{StratumClient, StratumConfig};
//!
//! let mut client = StratumClient::new(StratumConfig::default());
//! client.set_endpoint(endpoint);
//! let mut events = client.take_event_receiver().unwrap();
//! client.connect().await;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         PoolEvent::WorkReceived(work) => { /* hand to the farm */ }
//!         // ...
//!     }
//! }
//! ```

mod client;
mod connection;
mod error;
mod messages;

pub use client::{StratumClient, StratumConfig};
pub use error::{StratumError, StratumResult};
