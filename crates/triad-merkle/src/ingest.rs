//! Single-writer ingestion of on-chain commitment events.
//!
//! The tree has no internal locking and must only ever have one writer.
//! [`IngestHandle::spawn`] moves a [`TriadForest`] into a task that owns it
//! outright; producers talk to that task over a channel, so appends are
//! applied one at a time in the order they are received. Root and proof
//! queries go through the same queue and always observe a settled tree.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::forest::TriadForest;
use crate::proof::MerkleProof;
use crate::shard::LeafLocation;
use crate::{FieldElement, MerkleError, MerkleResult};

/// One on-chain event: three output commitments plus where it was emitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentEvent {
    pub commitments: [FieldElement; 3],
    pub block_number: u64,
    /// Unix timestamp (seconds) of the block.
    pub created_at: u64,
}

enum Command {
    Submit {
        event: CommitmentEvent,
        reply: oneshot::Sender<MerkleResult<LeafLocation>>,
    },
    Root {
        reply: oneshot::Sender<FieldElement>,
    },
    Proof {
        leaf_id: u64,
        reply: oneshot::Sender<MerkleResult<MerkleProof>>,
    },
    Shutdown,
}

/// Cloneable handle to the ingest task.
#[derive(Clone, Debug)]
pub struct IngestHandle {
    tx: mpsc::Sender<Command>,
}

impl IngestHandle {
    /// Start the ingest task. The returned join handle resolves to the forest
    /// once [`shutdown`](Self::shutdown) is called or every handle is dropped.
    pub fn spawn(forest: TriadForest, buffer: usize) -> (Self, JoinHandle<TriadForest>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let task = tokio::spawn(run(forest, rx));
        (Self { tx }, task)
    }

    /// Append an event's commitments. Resolves once they are in the tree.
    pub async fn submit(&self, event: CommitmentEvent) -> MerkleResult<LeafLocation> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Submit { event, reply }).await?;
        rx.await.map_err(|_| MerkleError::IngestClosed)?
    }

    /// Root of the shard currently accepting leaves.
    pub async fn root(&self) -> MerkleResult<FieldElement> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Root { reply }).await?;
        rx.await.map_err(|_| MerkleError::IngestClosed)
    }

    pub async fn proof(&self, leaf_id: u64) -> MerkleResult<MerkleProof> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Proof { leaf_id, reply }).await?;
        rx.await.map_err(|_| MerkleError::IngestClosed)?
    }

    /// Ask the task to stop after the commands already queued.
    pub async fn shutdown(&self) -> MerkleResult<()> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> MerkleResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| MerkleError::IngestClosed)
    }
}

async fn run(mut forest: TriadForest, mut rx: mpsc::Receiver<Command>) -> TriadForest {
    info!(depth = forest.depth(), leaves = forest.total_leaves(), "Ingest task started");
    let mut last_block: Option<u64> = None;

    while let Some(command) = rx.recv().await {
        match command {
            Command::Submit { event, reply } => {
                let result = apply(&mut forest, &mut last_block, &event);
                // the submitter may have given up waiting; the append stands
                let _ = reply.send(result);
            }
            Command::Root { reply } => {
                let _ = reply.send(forest.current_root());
            }
            Command::Proof { leaf_id, reply } => {
                let _ = reply.send(forest.gen_merkle_path(leaf_id));
            }
            Command::Shutdown => break,
        }
    }

    info!(leaves = forest.total_leaves(), shards = forest.tree_count(), "Ingest task stopped");
    forest
}

fn apply(
    forest: &mut TriadForest,
    last_block: &mut Option<u64>,
    event: &CommitmentEvent,
) -> MerkleResult<LeafLocation> {
    if let Some(last) = *last_block {
        if event.block_number < last {
            warn!(last, got = event.block_number, "Rejected out-of-order commitment event");
            return Err(MerkleError::OutOfOrderEvent {
                last,
                got: event.block_number,
            });
        }
    }

    let location = forest.insert_batch(&event.commitments)?;
    *last_block = Some(event.block_number);
    debug!(
        block = event.block_number,
        tree_id = location.tree_id,
        triad_id = location.triad_id,
        "Applied commitment event"
    );
    Ok(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Sum23Hasher;
    use std::sync::Arc;

    fn fe(v: u64) -> FieldElement {
        FieldElement::from(v)
    }

    fn event(n: u64, block: u64) -> CommitmentEvent {
        CommitmentEvent {
            commitments: [fe(3 * n), fe(3 * n + 1), fe(3 * n + 2)],
            block_number: block,
            created_at: 1_700_000_000 + block * 12,
        }
    }

    fn forest(depth: usize) -> TriadForest {
        TriadForest::new(depth, fe(0), Arc::new(Sum23Hasher)).unwrap()
    }

    #[tokio::test]
    async fn test_submit_and_query() {
        let (handle, task) = IngestHandle::spawn(forest(3), 8);

        let loc = handle.submit(event(0, 100)).await.unwrap();
        assert_eq!(loc, LeafLocation { tree_id: 0, triad_id: 0, position: 0 });
        let loc = handle.submit(event(1, 100)).await.unwrap();
        assert_eq!(loc.triad_id, 1);

        assert_eq!(handle.root().await.unwrap(), fe(15));
        let proof = handle.proof(4).await.unwrap();
        assert_eq!(proof.leaf, fe(4));
        assert!(proof.verify(&Sum23Hasher).unwrap());

        handle.shutdown().await.unwrap();
        let forest = task.await.unwrap();
        assert_eq!(forest.total_leaves(), 6);
    }

    #[tokio::test]
    async fn test_rejects_out_of_order_block() {
        let (handle, task) = IngestHandle::spawn(forest(3), 8);
        handle.submit(event(0, 10)).await.unwrap();

        let err = handle.submit(event(1, 9)).await.unwrap_err();
        assert!(matches!(err, MerkleError::OutOfOrderEvent { last: 10, got: 9 }));

        // same block is fine
        handle.submit(event(1, 10)).await.unwrap();

        drop(handle);
        let forest = task.await.unwrap();
        assert_eq!(forest.total_leaves(), 6);
    }

    #[tokio::test]
    async fn test_concurrent_producers_are_serialized() {
        let (handle, task) = IngestHandle::spawn(forest(4), 4);

        let mut joins = Vec::new();
        for n in 0..8u64 {
            let handle = handle.clone();
            joins.push(tokio::spawn(async move { handle.submit(event(n, 1)).await }));
        }
        let mut triad_ids = Vec::new();
        for join in joins {
            triad_ids.push(join.await.unwrap().unwrap().triad_id);
        }
        triad_ids.sort_unstable();
        assert_eq!(triad_ids, (0..8).collect::<Vec<_>>());

        handle.shutdown().await.unwrap();
        let forest = task.await.unwrap();
        assert!(forest.current_tree().is_full());
        // sum hash: the root is the sum of all 24 leaf values, whatever the order
        assert_eq!(forest.current_root(), fe((0..24).sum()));
    }

    #[tokio::test]
    async fn test_closed_handle() {
        let (handle, task) = IngestHandle::spawn(forest(2), 1);
        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(matches!(
            handle.submit(event(0, 1)).await,
            Err(MerkleError::IngestClosed)
        ));
    }
}
