//! cinder-miner: an Ethash-family GPU miner daemon.
//!
//! This crate is the coordination core of the miner: the pool-session
//! layer. Mining devices produce candidate nonces; a network pool dispenses
//! work and judges solutions. Everything between those two worlds lives
//! here:
//!
//! - [`stratum`]: the Stratum protocol state machine, three dialects over
//!   one line-delimited JSON-RPC transport, plaintext or TLS.
//! - [`pool`]: the client contract, the endpoint/URI model, and the
//!   manager that supervises reconnection and failover.
//! - [`farm`]: the facade mining devices attach to, with atomic work
//!   replacement in one direction and thread-safe solutions in the other.
//! - [`daemon`]: process lifecycle, signals, shutdown.
//!
//! GPU kernels, device enumeration, and the Ethash implementation itself
//! are separate components that attach through [`farm::Farm`].

pub mod daemon;
pub mod farm;
pub mod pool;
pub mod stratum;
pub mod tracing;
pub mod u256;
