//! Pool client abstraction.
//!
//! A pool client owns one session to one endpoint and reports everything of
//! interest as typed [`PoolEvent`]s over a channel, so the manager's event
//! handler is total over the event set. Two client families exist behind
//! this trait: the persistent Stratum session (implemented in
//! [`crate::stratum`]) and the HTTP getwork poller (not part of this
//! program).

pub mod endpoint;
pub mod manager;
pub mod work;

use async_trait::async_trait;
use tokio::sync::mpsc;

use endpoint::Endpoint;
use work::{Solution, WorkPackage};

/// Events emitted by a pool client.
///
/// `Disconnected` fires exactly once per session, whether or not the
/// connect phase ever completed; the manager's retry policy hangs off it.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// Socket (and TLS, if any) established
    Connected,

    /// Session over; a new connect starts a new epoch
    Disconnected,

    /// New work, replacing whatever the farm was grinding on
    WorkReceived(WorkPackage),

    /// Pool accepted a submitted solution
    SolutionAccepted { stale: bool },

    /// Pool rejected a submitted solution
    SolutionRejected { stale: bool },
}

/// The contract a pool session exposes to the manager.
#[async_trait]
pub trait PoolClient: Send {
    /// Point the client at an endpoint. Takes effect on the next connect.
    fn set_endpoint(&mut self, endpoint: Endpoint);

    /// Take the event stream. Yields `Some` once; the manager owns it.
    fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<PoolEvent>>;

    /// Ask the client to establish its session. Idempotent; returns before
    /// network I/O completes, outcome arrives as events.
    async fn connect(&mut self);

    /// Tear the session down. Idempotent.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
    fn is_subscribed(&self) -> bool;
    fn is_authorized(&self) -> bool;

    /// Fire-and-forget: the verdict arrives as a
    /// [`PoolEvent::SolutionAccepted`]/[`PoolEvent::SolutionRejected`].
    async fn submit_solution(&self, solution: Solution);

    /// Best-effort hashrate report; silently ignored when disabled or
    /// disconnected.
    async fn submit_hashrate(&self, rate: String);
}
