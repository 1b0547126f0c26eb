//! The event seam between the engine and everything that drives it
//! (HTTP handlers, signal handlers, tests).

use tokio::sync::{mpsc, oneshot};

use crate::json::BufferExhausted;

#[derive(Debug)]
pub(crate) enum ControlEvent {
    /// Coalesced request to enumerate and probe new devices.
    Rescan,
    /// Write a snapshot now (SIGHUP, tests).
    Snapshot,
    /// Render the alive roster as JSON.
    ListDisks {
        reply: oneshot::Sender<Result<Vec<u8>, BufferExhausted>>,
    },
    /// Roster counters, for diagnostics.
    Stats { reply: oneshot::Sender<ManagerStats> },
    /// Begin graceful shutdown; the manager task exits once every worker
    /// has died and the final snapshot is on disk.
    Shutdown,
}

/// Roster counters as seen by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerStats {
    pub alive: usize,
    pub dead: usize,
    pub first_unused_entry: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ListDisksError {
    #[error(transparent)]
    BufferExhausted(#[from] BufferExhausted),
    #[error("disk manager unavailable")]
    Closed,
}

/// Cloneable handle for posting events into the manager task.
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    pub(crate) tx: mpsc::UnboundedSender<ControlEvent>,
}

impl ManagerHandle {
    /// Request a rescan; repeated calls while one is running coalesce.
    pub fn trigger_rescan(&self) {
        let _ = self.tx.send(ControlEvent::Rescan);
    }

    /// Request an immediate state snapshot.
    pub fn trigger_snapshot(&self) {
        let _ = self.tx.send(ControlEvent::Snapshot);
    }

    /// Serialize the alive roster; fails with `BufferExhausted` rather than
    /// truncating.
    pub async fn list_disks_json(&self) -> Result<Vec<u8>, ListDisksError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlEvent::ListDisks { reply })
            .map_err(|_| ListDisksError::Closed)?;
        match rx.await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ListDisksError::Closed),
        }
    }

    /// Roster counters; `None` once the manager has shut down.
    pub async fn stats(&self) -> Option<ManagerStats> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(ControlEvent::Stats { reply }).ok()?;
        rx.await.ok()
    }

    /// Ask the manager to shut down. Await the join handle returned by
    /// [`crate::start_manager`] for completion.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ControlEvent::Shutdown);
    }
}
