use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::persistence::{backend::PersistenceBackend, snapshot::SessionSnapshot};

const DEBOUNCE: Duration = Duration::from_millis(250);
const MAX_ATTEMPTS: u32 = 4;
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);

/// Debounced, fire-and-forget persistence writer. `schedule` hands the
/// worker a fresh snapshot and returns immediately; while the worker
/// debounces, any newer snapshot supersedes the in-flight one, so only the
/// latest state reaches disk. Failures are logged and retried with
/// backoff, never propagated to the session.
pub struct FlushScheduler {
    tx: mpsc::UnboundedSender<SessionSnapshot>
}

impl FlushScheduler {
    /// Spawns the flush worker on the ambient tokio runtime.
    pub fn spawn(backend: Arc<dyn PersistenceBackend>) -> FlushScheduler {
        Self::spawn_with_debounce(backend, DEBOUNCE)
    }

    pub fn spawn_with_debounce(backend: Arc<dyn PersistenceBackend>, debounce: Duration) -> FlushScheduler {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(flush_worker(backend, rx, debounce));
        FlushScheduler { tx }
    }

    /// Never blocks and never fails from the caller's perspective; a
    /// closed worker only means the flush is skipped.
    pub fn schedule(&self, snapshot: SessionSnapshot) {
        if self.tx.send(snapshot).is_err() {
            warn!("flush worker gone, skipping persistence write");
        }
    }
}

async fn flush_worker(
    backend: Arc<dyn PersistenceBackend>,
    mut rx: mpsc::UnboundedReceiver<SessionSnapshot>,
    debounce: Duration
) {
    while let Some(mut snapshot) = rx.recv().await {
        tokio::time::sleep(debounce).await;

        // A newer snapshot obsoletes the one we were about to write
        while let Ok(newer) = rx.try_recv() {
            snapshot = newer;
        }

        let mut backoff = INITIAL_BACKOFF;
        for attempt in 1..=MAX_ATTEMPTS {
            let write_backend = Arc::clone(&backend);
            let write_snapshot = snapshot.clone();
            let result = tokio::task::spawn_blocking(move || write_backend.save_session(&write_snapshot)).await;

            match result {
                Ok(Ok(())) => {
                    debug!("session state flushed ({} ratings)", snapshot.ratings.len());
                    break;
                }
                Ok(Err(e)) if attempt < MAX_ATTEMPTS => {
                    warn!("flush attempt {} failed, retrying in {:?}: {}", attempt, backoff, e);
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Ok(Err(e)) => {
                    warn!("flush failed after {} attempts, state stays in memory: {}", attempt, e);
                }
                Err(e) => {
                    warn!("flush task panicked: {}", e);
                    break;
                }
            }
        }
    }
}
