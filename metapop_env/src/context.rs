//! Core graph context trait for simulation agents.

use crate::error::EnvError;
use crate::graph::Handle;
use crate::types::{AgentId, LayerId, WorkerId};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// State that can live in the distributed graph.
///
/// Agent state must be serializable because relocation and remote
/// acquisition move it between workers as JSON.
pub trait AgentState: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> AgentState for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// The interface agent behaviors use to reach the distributed graph.
///
/// One value of this trait is the view of the graph from a single worker.
/// Agents owned by that worker are *local*; every other agent is *remote*
/// and is only reachable through the scoped operations below.
///
/// # Scoped holds
///
/// `lock`, `acquire` and `read` take a synchronous closure. The hold starts
/// when the closure is entered and is released on every exit path of the
/// closure (normal return, early `return`, `?` inside the closure, panic).
/// Because the closure cannot `.await`, no behavior can start a second hold
/// while one is active, so two holds are never owned at once.
///
/// # Implementations
///
/// - **In-process**: `TokioWorker` - workers are tokio tasks sharing a
///   `SharedGraph`
#[async_trait]
pub trait GraphContext<A: AgentState>: Send + Sync + 'static {
    /// Returns the worker this context executes on.
    fn worker_id(&self) -> WorkerId;

    /// Returns the number of workers in the cluster.
    fn worker_count(&self) -> usize;

    /// Adds a new agent, owned by this worker.
    fn add_agent(&self, state: A) -> Handle<A>;

    /// Resolves an agent id to a handle.
    fn get(&self, id: AgentId) -> Result<Handle<A>, EnvError>;

    /// Returns true if the agent is currently owned by this worker.
    fn is_local(&self, handle: &Handle<A>) -> bool {
        handle.owner() == self.worker_id()
    }

    /// Establishes a directed edge `from -> to` on `layer`.
    fn link(&self, from: &Handle<A>, to: &Handle<A>, layer: LayerId) -> Result<(), EnvError>;

    /// Returns the out-neighbors of `from` on `layer`, in link order.
    fn out_neighbors(&self, from: &Handle<A>, layer: LayerId) -> Vec<Handle<A>>;

    /// Exclusive hold on an agent.
    ///
    /// On a local agent the closure mutates the authoritative state. On a
    /// remote agent the closure receives a fetched working copy and writes
    /// to it are discarded on release; use [`GraphContext::acquire`] to
    /// write to remote agents.
    async fn lock<F, R>(&self, handle: &Handle<A>, f: F) -> Result<R, EnvError>
    where
        F: FnOnce(&mut A) -> R + Send,
        R: Send;

    /// Exclusive read-modify-write on a local or remote agent.
    ///
    /// Writes are committed to the owner when the closure returns and are
    /// visible to every worker after that.
    async fn acquire<F, R>(&self, handle: &Handle<A>, f: F) -> Result<R, EnvError>
    where
        F: FnOnce(&mut A) -> R + Send,
        R: Send;

    /// Shared, up-to-date read of an agent.
    async fn read<F, R>(&self, handle: &Handle<A>, f: F) -> Result<R, EnvError>
    where
        F: FnOnce(&A) -> R + Send,
        R: Send;

    /// Reads the last synchronized snapshot of an agent without blocking.
    ///
    /// May be stale until the next synchronization phase.
    fn ghost<F, R>(&self, handle: &Handle<A>, f: F) -> R
    where
        F: FnOnce(&A) -> R;
}
