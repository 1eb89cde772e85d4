//! Shared graph storage and the placement layer.
//!
//! `SharedGraph` is the cluster-wide view: it stores every agent once, knows
//! which worker owns it, and implements the operations that only the
//! placement layer may perform (relocation, synchronization).

use crate::context::AgentState;
use crate::error::EnvError;
use crate::stats::SyncStats;
use crate::tokio_impl::TokioWorker;
use crate::types::{AgentId, Envelope, LayerId, WorkerId};

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Storage for one agent.
pub(crate) struct Node<A> {
    /// Current owner rank
    owner: AtomicUsize,

    /// Authoritative state, guarded for exclusive holds
    pub(crate) state: tokio::sync::Mutex<A>,

    /// Snapshot refreshed by `synchronize`
    pub(crate) ghost: RwLock<A>,
}

impl<A> Node<A> {
    pub(crate) fn owner(&self) -> WorkerId {
        WorkerId(self.owner.load(Ordering::Acquire))
    }

    fn set_owner(&self, owner: WorkerId) {
        self.owner.store(owner.0, Ordering::Release);
    }
}

/// Opaque reference to an agent that may live on another worker.
///
/// Holding a handle grants nothing by itself: the state is only reachable
/// through `GraphContext::lock`, `acquire`, `read` or `ghost`.
pub struct Handle<A> {
    id: AgentId,
    pub(crate) node: Arc<Node<A>>,
}

impl<A> Handle<A> {
    /// Returns the agent id.
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Returns the worker currently owning the agent.
    pub fn owner(&self) -> WorkerId {
        self.node.owner()
    }
}

impl<A> Clone for Handle<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            node: Arc::clone(&self.node),
        }
    }
}

impl<A> std::fmt::Debug for Handle<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("owner", &self.owner())
            .finish()
    }
}

impl<A> PartialEq for Handle<A> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<A> Eq for Handle<A> {}

/// The distributed graph shared by all in-process workers.
pub struct SharedGraph<A> {
    /// Number of workers in the cluster
    worker_count: usize,

    /// All agents, ordered by id
    nodes: RwLock<BTreeMap<AgentId, Handle<A>>>,

    /// Adjacency: (source, layer) -> targets in link order
    edges: RwLock<HashMap<(AgentId, LayerId), Vec<AgentId>>>,

    /// Next agent id
    next_id: AtomicU64,

    /// Operation counters
    stats: Arc<SyncStats>,
}

impl<A: AgentState> SharedGraph<A> {
    /// Creates an empty graph for `worker_count` workers (at least one).
    pub fn new(worker_count: usize, stats: Arc<SyncStats>) -> Arc<Self> {
        Arc::new(Self {
            worker_count: worker_count.max(1),
            nodes: RwLock::new(BTreeMap::new()),
            edges: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            stats,
        })
    }

    /// Returns the number of workers.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Returns the operation counters.
    pub fn stats(&self) -> &Arc<SyncStats> {
        &self.stats
    }

    /// Returns the context of worker `id`.
    pub fn worker(self: &Arc<Self>, id: WorkerId) -> Result<TokioWorker<A>, EnvError> {
        if id.0 >= self.worker_count {
            return Err(EnvError::UnknownWorker(id));
        }
        Ok(TokioWorker::new(id, Arc::clone(self)))
    }

    /// Returns the contexts of all workers, by rank.
    pub fn workers(self: &Arc<Self>) -> Vec<TokioWorker<A>> {
        (0..self.worker_count)
            .map(|rank| TokioWorker::new(WorkerId(rank), Arc::clone(self)))
            .collect()
    }

    /// Returns every agent id in ascending order.
    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.read_nodes().keys().copied().collect()
    }

    /// Returns the number of agents.
    pub fn len(&self) -> usize {
        self.read_nodes().len()
    }

    /// Returns true if the graph holds no agents.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves an id to a handle.
    pub fn handle(&self, id: AgentId) -> Result<Handle<A>, EnvError> {
        self.read_nodes()
            .get(&id)
            .cloned()
            .ok_or(EnvError::UnknownAgent(id))
    }

    /// Returns the current owner of an agent.
    pub fn owner_of(&self, id: AgentId) -> Result<WorkerId, EnvError> {
        self.handle(id).map(|handle| handle.owner())
    }

    /// Returns how many agents each worker owns, indexed by rank.
    pub fn ownership_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.worker_count];
        for handle in self.read_nodes().values() {
            counts[handle.owner().0] += 1;
        }
        counts
    }

    /// Moves ownership of an agent to another worker.
    ///
    /// The state is serialized by the old owner and deserialized by the new
    /// one, exactly as a cross-process move would. Returns the number of
    /// bytes moved (0 if the agent already lived there).
    pub async fn relocate(&self, id: AgentId, to: WorkerId) -> Result<usize, EnvError> {
        if to.0 >= self.worker_count {
            return Err(EnvError::UnknownWorker(to));
        }
        let handle = self.handle(id)?;
        let mut state = handle.node.state.lock().await;
        let from = handle.node.owner();
        if from == to {
            return Ok(0);
        }

        let envelope = Envelope::from_json(&*state, from)?;
        *state = envelope.to_json()?;
        handle.node.set_owner(to);

        self.stats.record_relocation(envelope.size());
        Ok(envelope.size())
    }

    /// Refreshes every ghost snapshot from the authoritative state.
    ///
    /// Must run while no agent behavior is executing (between phases).
    pub async fn synchronize(&self) {
        let handles: Vec<Handle<A>> = self.read_nodes().values().cloned().collect();
        for handle in handles {
            let state = handle.node.state.lock().await;
            let mut ghost = handle
                .node
                .ghost
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *ghost = state.clone();
        }
        self.stats.record_sync();
    }

    pub(crate) fn insert(&self, state: A, owner: WorkerId) -> Handle<A> {
        let id = AgentId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = Handle {
            id,
            node: Arc::new(Node {
                owner: AtomicUsize::new(owner.0),
                ghost: RwLock::new(state.clone()),
                state: tokio::sync::Mutex::new(state),
            }),
        };
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handle.clone());
        handle
    }

    pub(crate) fn add_edge(&self, from: AgentId, to: AgentId, layer: LayerId) -> Result<(), EnvError> {
        {
            let nodes = self.read_nodes();
            for id in [from, to] {
                if !nodes.contains_key(&id) {
                    return Err(EnvError::UnknownAgent(id));
                }
            }
        }
        self.edges
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((from, layer))
            .or_default()
            .push(to);
        Ok(())
    }

    pub(crate) fn neighbors(&self, from: AgentId, layer: LayerId) -> Vec<Handle<A>> {
        let targets: Vec<AgentId> = self
            .edges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(from, layer))
            .cloned()
            .unwrap_or_default();

        let nodes = self.read_nodes();
        targets
            .into_iter()
            .filter_map(|id| nodes.get(&id).cloned())
            .collect()
    }

    fn read_nodes(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<AgentId, Handle<A>>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GraphContext;

    fn graph(workers: usize) -> Arc<SharedGraph<Vec<f64>>> {
        SharedGraph::new(workers, Arc::new(SyncStats::new()))
    }

    #[tokio::test]
    async fn test_relocate_preserves_state() {
        let graph = graph(3);
        let root = graph.worker(WorkerId::ROOT).unwrap();
        let handle = root.add_agent(vec![1.0, 2.0, 3.0]);

        let bytes = graph.relocate(handle.id(), WorkerId(2)).await.unwrap();
        assert!(bytes > 0);
        assert_eq!(handle.owner(), WorkerId(2));
        assert_eq!(graph.ownership_counts(), vec![0, 0, 1]);

        let state = root.read(&handle, |s| s.clone()).await.unwrap();
        assert_eq!(state, vec![1.0, 2.0, 3.0]);

        // Relocating to the current owner is a no-op
        assert_eq!(graph.relocate(handle.id(), WorkerId(2)).await.unwrap(), 0);
        assert_eq!(graph.stats().snapshot().relocations, 1);
    }

    #[tokio::test]
    async fn test_relocate_preserves_float_bits() {
        let graph = graph(2);
        let root = graph.worker(WorkerId::ROOT).unwrap();
        let values = vec![28264.96288342247, 0.0004832571563375021, 1.7316274114011239];
        let handle = root.add_agent(values.clone());

        graph.relocate(handle.id(), WorkerId(1)).await.unwrap();
        graph.relocate(handle.id(), WorkerId::ROOT).await.unwrap();

        let state = root.read(&handle, |s| s.clone()).await.unwrap();
        for (after, before) in state.iter().zip(&values) {
            assert_eq!(after.to_bits(), before.to_bits());
        }
    }

    #[tokio::test]
    async fn test_relocate_unknown_worker() {
        let graph = graph(2);
        let handle = graph.worker(WorkerId::ROOT).unwrap().add_agent(vec![]);
        let result = graph.relocate(handle.id(), WorkerId(5)).await;
        assert!(matches!(result, Err(EnvError::UnknownWorker(WorkerId(5)))));
    }

    #[tokio::test]
    async fn test_synchronize_refreshes_ghosts() {
        let graph = graph(2);
        let root = graph.worker(WorkerId::ROOT).unwrap();
        let other = graph.worker(WorkerId(1)).unwrap();
        let handle = root.add_agent(vec![1.0]);

        other.acquire(&handle, |s| s.push(2.0)).await.unwrap();

        // Ghost is stale until the synchronization phase
        assert_eq!(other.ghost(&handle, |s| s.len()), 1);
        graph.synchronize().await;
        assert_eq!(other.ghost(&handle, |s| s.len()), 2);
        assert_eq!(graph.stats().snapshot().sync_rounds, 1);
    }

    #[test]
    fn test_unknown_ids() {
        let graph = graph(1);
        assert!(matches!(graph.handle(AgentId(9)), Err(EnvError::UnknownAgent(AgentId(9)))));
        assert!(graph.worker(WorkerId(1)).is_err());
        assert!(graph.is_empty());
    }
}
