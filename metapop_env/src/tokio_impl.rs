//! In-process implementation of GraphContext using Tokio.

use crate::context::{AgentState, GraphContext};
use crate::error::EnvError;
use crate::graph::{Handle, SharedGraph};
use crate::types::{AgentId, Envelope, LayerId, WorkerId};
use async_trait::async_trait;
use std::sync::{Arc, PoisonError};

/// One worker's view of a [`SharedGraph`].
///
/// Workers run as tokio tasks. Exclusive holds map to a per-agent
/// `tokio::sync::Mutex`, so contended holds suspend the task instead of
/// blocking a thread. Remote holds move the state through a JSON
/// [`Envelope`], the same path a cross-process transfer takes.
pub struct TokioWorker<A> {
    /// Rank of this worker
    id: WorkerId,

    /// Cluster-wide graph
    graph: Arc<SharedGraph<A>>,
}

impl<A: AgentState> TokioWorker<A> {
    pub(crate) fn new(id: WorkerId, graph: Arc<SharedGraph<A>>) -> Self {
        Self { id, graph }
    }

    /// Returns the shared graph behind this worker.
    pub fn graph(&self) -> &Arc<SharedGraph<A>> {
        &self.graph
    }

    fn fetch(&self, state: &A, owner: WorkerId) -> Result<A, EnvError> {
        Envelope::from_json(state, owner)?.to_json()
    }
}

impl<A> Clone for TokioWorker<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            graph: Arc::clone(&self.graph),
        }
    }
}

#[async_trait]
impl<A: AgentState> GraphContext<A> for TokioWorker<A> {
    fn worker_id(&self) -> WorkerId {
        self.id
    }

    fn worker_count(&self) -> usize {
        self.graph.worker_count()
    }

    fn add_agent(&self, state: A) -> Handle<A> {
        self.graph.insert(state, self.id)
    }

    fn get(&self, id: AgentId) -> Result<Handle<A>, EnvError> {
        self.graph.handle(id)
    }

    fn link(&self, from: &Handle<A>, to: &Handle<A>, layer: LayerId) -> Result<(), EnvError> {
        self.graph.add_edge(from.id(), to.id(), layer)
    }

    fn out_neighbors(&self, from: &Handle<A>, layer: LayerId) -> Vec<Handle<A>> {
        self.graph.neighbors(from.id(), layer)
    }

    async fn lock<F, R>(&self, handle: &Handle<A>, f: F) -> Result<R, EnvError>
    where
        F: FnOnce(&mut A) -> R + Send,
        R: Send,
    {
        let mut state = handle.node.state.lock().await;
        // Ownership only changes under this same mutex
        let owner = handle.owner();
        let local = owner == self.id;
        self.graph.stats().record_lock(local);

        if local {
            Ok(f(&mut state))
        } else {
            let mut copy = self.fetch(&state, owner)?;
            Ok(f(&mut copy))
        }
    }

    async fn acquire<F, R>(&self, handle: &Handle<A>, f: F) -> Result<R, EnvError>
    where
        F: FnOnce(&mut A) -> R + Send,
        R: Send,
    {
        let mut state = handle.node.state.lock().await;
        let owner = handle.owner();
        let local = owner == self.id;
        self.graph.stats().record_acquire(local);

        if local {
            return Ok(f(&mut state));
        }

        let mut copy = self.fetch(&state, owner)?;
        let result = f(&mut copy);

        // Commit on release
        *state = Envelope::from_json(&copy, self.id)?.to_json()?;
        Ok(result)
    }

    async fn read<F, R>(&self, handle: &Handle<A>, f: F) -> Result<R, EnvError>
    where
        F: FnOnce(&A) -> R + Send,
        R: Send,
    {
        let state = handle.node.state.lock().await;
        self.graph.stats().record_read();
        Ok(f(&state))
    }

    fn ghost<F, R>(&self, handle: &Handle<A>, f: F) -> R
    where
        F: FnOnce(&A) -> R,
    {
        let ghost = handle.node.ghost.read().unwrap_or_else(PoisonError::into_inner);
        f(&ghost)
    }
}
