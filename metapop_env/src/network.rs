//! Inter-worker communication used for reductions.

use crate::error::EnvError;
use crate::stats::SyncStats;
use crate::types::{Envelope, WorkerId};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Point-to-point messaging and gather between workers.
///
/// # Implementations
///
/// - **In-process**: `ChannelCommunicator` - unbounded tokio channels, one
///   inbox per rank
///
/// # Gather
///
/// ```text
/// rank 1 ──┐
/// rank 2 ──┼──> root: [own, rank 1, rank 2, ...] (ordered by rank)
/// rank 3 ──┘
/// ```
#[async_trait]
pub trait Communicator: Send + Sync + 'static {
    /// Returns this worker's rank.
    fn rank(&self) -> WorkerId;

    /// Returns the number of ranks.
    fn size(&self) -> usize;

    /// Sends an envelope to `target`.
    async fn send(&self, target: WorkerId, envelope: Envelope) -> Result<(), EnvError>;

    /// Receives the next envelope addressed to this rank.
    ///
    /// Returns `None` once every sender is gone.
    async fn recv(&self) -> Option<Envelope>;

    /// Collects one envelope from every rank on `root`.
    ///
    /// Every rank must call this for the gather to complete. The root gets
    /// `Some` with all envelopes ordered by origin rank; the others get
    /// `None`.
    async fn gather(&self, envelope: Envelope, root: WorkerId) -> Result<Option<Vec<Envelope>>, EnvError>;
}

/// Typed gather: every rank contributes `value`, the root receives them all.
pub async fn gather_json<C, T>(comm: &C, value: &T, root: WorkerId) -> Result<Option<Vec<T>>, EnvError>
where
    C: Communicator + ?Sized,
    T: Serialize + DeserializeOwned + Send + Sync,
{
    let envelope = Envelope::from_json(value, comm.rank())?;
    match comm.gather(envelope, root).await? {
        Some(envelopes) => envelopes
            .iter()
            .map(Envelope::to_json)
            .collect::<Result<Vec<T>, _>>()
            .map(Some),
        None => Ok(None),
    }
}

/// Channel-backed communicator for in-process workers.
pub struct ChannelCommunicator {
    /// This rank
    rank: WorkerId,

    /// One sender per rank (including this one)
    peers: Vec<mpsc::UnboundedSender<Envelope>>,

    /// Inbox (behind tokio mutex for async)
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Envelope>>,

    /// Operation counters
    stats: Arc<SyncStats>,
}

impl ChannelCommunicator {
    /// Creates a fully connected set of `size` communicators, by rank.
    pub fn mesh(size: usize, stats: Arc<SyncStats>) -> Vec<Self> {
        let size = size.max(1);
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| mpsc::unbounded_channel()).unzip();

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Self {
                rank: WorkerId(rank),
                peers: senders.clone(),
                inbox: tokio::sync::Mutex::new(inbox),
                stats: Arc::clone(&stats),
            })
            .collect()
    }
}

#[async_trait]
impl Communicator for ChannelCommunicator {
    fn rank(&self) -> WorkerId {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    async fn send(&self, target: WorkerId, envelope: Envelope) -> Result<(), EnvError> {
        let peer = self.peers.get(target.0).ok_or(EnvError::UnknownWorker(target))?;
        peer.send(envelope).map_err(|_| EnvError::network("Channel closed"))
    }

    async fn recv(&self) -> Option<Envelope> {
        let mut inbox = self.inbox.lock().await;
        inbox.recv().await
    }

    async fn gather(&self, envelope: Envelope, root: WorkerId) -> Result<Option<Vec<Envelope>>, EnvError> {
        if root.0 >= self.size() {
            return Err(EnvError::UnknownWorker(root));
        }
        if self.rank != root {
            self.send(root, envelope).await?;
            return Ok(None);
        }

        let mut collected = Vec::with_capacity(self.size());
        collected.push(envelope);
        while collected.len() < self.size() {
            let incoming = self
                .recv()
                .await
                .ok_or_else(|| EnvError::network("Gather interrupted: inbox closed"))?;
            collected.push(incoming);
        }
        collected.sort_by_key(|e| e.origin);

        self.stats.record_gather();
        Ok(Some(collected))
    }
}
