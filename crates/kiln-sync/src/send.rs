//! Dependency-ordered writes of a decomposed graph.
//!
//! The graph is decomposed once. Each transport is written by its own task;
//! within a transport, chunks are written height level by height level so a
//! chunk is only stored after every chunk it references. Writes inside one
//! level run concurrently, bounded by a per-transport semaphore.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use kiln_graph::decompose;
use kiln_transport::Transport;
use kiln_types::{Node, ObjectId};

use crate::error::{joined, SyncError, SyncResult};
use crate::options::SendOptions;
use crate::progress::ProgressTracker;

/// Write levels shared by every transport task: `(id, payload)` per chunk,
/// lowest height first.
type Levels = Arc<Vec<Vec<(ObjectId, String)>>>;

/// Send `root` to every transport with default options.
pub async fn send(root: &Node, transports: &[Arc<dyn Transport>]) -> SyncResult<ObjectId> {
    send_with(root, transports, &SendOptions::default()).await
}

/// Send `root` to every transport and return its id.
///
/// Returns once every chunk is written and every transport flushed. The
/// first failing transport aborts the whole send.
pub async fn send_with(
    root: &Node,
    transports: &[Arc<dyn Transport>],
    options: &SendOptions,
) -> SyncResult<ObjectId> {
    if transports.is_empty() {
        return Err(SyncError::NoTransports);
    }
    check_cancelled(&options.cancel)?;

    let decomposition = decompose(root)?;
    let root_id = decomposition.root();
    let total = decomposition.len() as u64;
    let total_bytes = decomposition.total_bytes();
    let levels: Levels = Arc::new(
        decomposition
            .levels()
            .into_iter()
            .map(|level| level.into_iter().map(|c| (c.id(), c.payload.clone())).collect())
            .collect(),
    );

    let mut tasks = JoinSet::new();
    for transport in transports {
        let transport = Arc::clone(transport);
        let levels = Arc::clone(&levels);
        let tracker = Arc::new(ProgressTracker::new(
            transport.name(),
            total,
            options.progress.clone(),
        ));
        let concurrency = options.concurrency.max(1);
        let cancel = options.cancel.clone();
        tasks.spawn(async move { write_levels(transport, levels, tracker, concurrency, cancel).await });
    }

    // Dropping the set on error aborts the remaining transports.
    while let Some(result) = tasks.join_next().await {
        joined(result)?;
    }

    info!(
        root = %root_id.short_hex(),
        objects = total,
        bytes = total_bytes,
        transports = transports.len(),
        "send complete"
    );
    Ok(root_id)
}

/// Write every level to one transport, then flush it.
async fn write_levels(
    transport: Arc<dyn Transport>,
    levels: Levels,
    tracker: Arc<ProgressTracker>,
    concurrency: usize,
    cancel: CancellationToken,
) -> SyncResult<()> {
    let semaphore = Arc::new(Semaphore::new(concurrency));

    for (height, level) in levels.iter().enumerate() {
        let mut writes = JoinSet::new();
        for (id, payload) in level {
            // Surface failures early instead of at the end of the level.
            while let Some(result) = writes.try_join_next() {
                joined(result)?;
            }
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|_| SyncError::Cancelled)?;
            check_cancelled(&cancel)?;

            let transport = Arc::clone(&transport);
            let tracker = Arc::clone(&tracker);
            let cancel = cancel.clone();
            let (id, payload) = (*id, payload.clone());
            writes.spawn(async move {
                let _permit = permit;
                check_cancelled(&cancel)?;
                let bytes = payload.len() as u64;
                transport.put(id, payload).await?;
                tracker.record(bytes);
                debug!(transport = transport.name(), id = %id.short_hex(), bytes, "wrote chunk");
                Ok::<(), SyncError>(())
            });
        }
        while let Some(result) = writes.join_next().await {
            joined(result)?;
        }
        debug!(transport = transport.name(), height, chunks = level.len(), "level written");
    }

    check_cancelled(&cancel)?;
    transport.flush().await?;

    let (objects, bytes) = tracker.totals();
    info!(transport = transport.name(), objects, bytes, "transport flushed");
    Ok(())
}

fn check_cancelled(cancel: &CancellationToken) -> SyncResult<()> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    Ok(())
}
