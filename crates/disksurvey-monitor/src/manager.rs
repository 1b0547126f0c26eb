//! The disk manager: owns the slot slab and the alive/dead index lists,
//! dispatches periodic work to workers, reaps deaths, and orchestrates
//! snapshots and graceful shutdown.

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use disksurvey_core::{DiskInfo, Latency};
use disksurvey_sg::Transport;
use disksurvey_snapshot::{save_to_path, DiskSnapshot, SnapshotError, SnapshotState};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::control::{ControlEvent, ManagerHandle, ManagerStats};
use crate::json::{render_disks_json, BufferExhausted, DiskView};
use crate::mono;
use crate::scan::{self, DeviceLister};
use crate::worker::{DiskShared, Worker, WorkerConfig};

/// Size of the fixed slot slab.
pub const MAX_DISKS: usize = 128;

/// List terminator.
const NIL: i32 = -1;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Snapshot target, written via temp-file-and-rename.
    pub state_file: PathBuf,
    /// Ping cadence.
    pub tur_interval: Duration,
    /// Latency-bucket roll and snapshot cadence.
    pub tick_interval: Duration,
    /// Periodic device re-enumeration cadence.
    pub rescan_interval: Duration,
    /// Minimum seconds between SMART health checks per disk.
    pub monitor_interval_secs: u64,
    /// Capacity of the `/api/disks` JSON buffer.
    pub json_buf_size: usize,
    /// Kernel-level timeout applied to every CDB.
    pub cdb_timeout_ms: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("./disksurvey.dat"),
            tur_interval: Duration::from_secs(1),
            tick_interval: Duration::from_secs(5 * 60),
            rescan_interval: Duration::from_secs(60 * 60),
            monitor_interval_secs: 3600,
            json_buf_size: 8192,
            cdb_timeout_ms: disksurvey_sg::DEF_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("final snapshot failed: {0}")]
    FinalSnapshot(#[source] SnapshotError),
}

#[derive(Debug)]
enum Internal {
    Adopt { path: String, info: DiskInfo },
    RescanDone,
}

/// Disk state kept after death so a returning device can be re-adopted
/// with its history intact.
#[derive(Debug)]
struct RetainedDisk {
    info: DiskInfo,
    latency: Latency,
}

#[derive(Debug)]
struct AliveDisk {
    sg_path: String,
    shared: Arc<DiskShared>,
}

#[derive(Debug, Default)]
enum SlotEntry {
    #[default]
    Vacant,
    Alive(AliveDisk),
    Dead(RetainedDisk),
}

#[derive(Debug)]
struct Slot {
    prev: i32,
    next: i32,
    entry: SlotEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListId {
    Alive,
    Dead,
}

/// The slot slab plus the two intrusive index lists threaded through it.
struct Roster {
    slots: Vec<Slot>,
    alive_head: i32,
    dead_head: i32,
    first_unused_entry: usize,
}

impl Roster {
    fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_DISKS);
        for _ in 0..MAX_DISKS {
            slots.push(Slot {
                prev: NIL,
                next: NIL,
                entry: SlotEntry::Vacant,
            });
        }
        Self {
            slots,
            alive_head: NIL,
            dead_head: NIL,
            first_unused_entry: 0,
        }
    }

    fn head(&self, list: ListId) -> i32 {
        match list {
            ListId::Alive => self.alive_head,
            ListId::Dead => self.dead_head,
        }
    }

    fn head_mut(&mut self, list: ListId) -> &mut i32 {
        match list {
            ListId::Alive => &mut self.alive_head,
            ListId::Dead => &mut self.dead_head,
        }
    }

    /// O(1) splice out of a list.
    fn remove(&mut self, idx: i32, list: ListId) {
        debug_assert_ne!(idx, NIL);
        let (prev, next) = {
            let slot = &self.slots[idx as usize];
            (slot.prev, slot.next)
        };

        if prev != NIL {
            self.slots[prev as usize].next = next;
        } else {
            *self.head_mut(list) = next;
        }
        if next != NIL {
            self.slots[next as usize].prev = prev;
        }

        let slot = &mut self.slots[idx as usize];
        slot.prev = NIL;
        slot.next = NIL;
    }

    /// Append at the tail, walking the list to keep insertion order.
    fn append(&mut self, idx: i32, list: ListId) {
        debug_assert_ne!(idx, NIL);
        let mut tail = NIL;
        let mut cursor = self.head(list);
        while cursor != NIL {
            tail = cursor;
            cursor = self.slots[cursor as usize].next;
        }

        let slot = &mut self.slots[idx as usize];
        slot.prev = tail;
        slot.next = NIL;
        if tail != NIL {
            self.slots[tail as usize].next = idx;
        } else {
            *self.head_mut(list) = idx;
        }
    }

    /// Slot allocation: a never-used slot if one remains, otherwise recycle
    /// the dead-list head (discarding its retained state). `NIL` when every
    /// slot holds a live disk.
    fn get_unused(&mut self) -> i32 {
        if self.first_unused_entry < MAX_DISKS {
            let idx = self.first_unused_entry as i32;
            self.first_unused_entry += 1;
            return idx;
        }

        let idx = self.dead_head;
        if idx != NIL {
            self.remove(idx, ListId::Dead);
            self.slots[idx as usize].entry = SlotEntry::Vacant;
        }
        idx
    }

    fn list(&self, list: ListId) -> Vec<i32> {
        let mut out = Vec::new();
        let mut cursor = self.head(list);
        while cursor != NIL {
            out.push(cursor);
            cursor = self.slots[cursor as usize].next;
        }
        out
    }

    fn alive(&self, idx: i32) -> Option<&AliveDisk> {
        match &self.slots[idx as usize].entry {
            SlotEntry::Alive(alive) => Some(alive),
            _ => None,
        }
    }

    fn find_alive_path(&self, path: &str) -> Option<i32> {
        self.list(ListId::Alive)
            .into_iter()
            .find(|&idx| self.alive(idx).map(|a| a.sg_path.as_str()) == Some(path))
    }

    fn find_dead_identity(&self, info: &DiskInfo) -> Option<i32> {
        self.list(ListId::Dead).into_iter().find(|&idx| {
            matches!(
                &self.slots[idx as usize].entry,
                SlotEntry::Dead(dead) if dead.info.same_identity(info)
            )
        })
    }

    fn take_entry(&mut self, idx: i32) -> SlotEntry {
        std::mem::take(&mut self.slots[idx as usize].entry)
    }

    fn set_entry(&mut self, idx: i32, entry: SlotEntry) {
        self.slots[idx as usize].entry = entry;
    }
}

struct Manager {
    cfg: ManagerConfig,
    transport: Arc<dyn Transport>,
    lister: Arc<dyn DeviceLister>,
    roster: Roster,
    system_identifier: String,
    deaths_tx: mpsc::UnboundedSender<i32>,
    deaths_rx: mpsc::UnboundedReceiver<i32>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    ctl_rx: mpsc::UnboundedReceiver<ControlEvent>,
    rescan_in_flight: bool,
}

/// Load any prior snapshot into the dead list, then spawn the manager task.
/// Drive it through the returned handle; await the join handle after
/// shutdown for the final-snapshot verdict.
pub async fn start_manager(
    cfg: ManagerConfig,
    transport: Arc<dyn Transport>,
    lister: Arc<dyn DeviceLister>,
) -> (ManagerHandle, JoinHandle<Result<(), ManagerError>>) {
    mono::init();

    let system_identifier = read_system_identifier().await;
    info!(system_identifier = %system_identifier, "disk manager starting");

    let (ctl_tx, ctl_rx) = mpsc::unbounded_channel();
    let (deaths_tx, deaths_rx) = mpsc::unbounded_channel();
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();

    let mut manager = Manager {
        cfg,
        transport,
        lister,
        roster: Roster::new(),
        system_identifier,
        deaths_tx,
        deaths_rx,
        internal_tx,
        internal_rx,
        ctl_rx,
        rescan_in_flight: false,
    };
    manager.load_snapshot().await;

    let handle = ManagerHandle { tx: ctl_tx };
    let join = tokio::spawn(manager.run());
    (handle, join)
}

async fn read_system_identifier() -> String {
    match tokio::fs::read_to_string("/etc/machine-id").await {
        Ok(id) => id.trim().to_string(),
        Err(_) => String::new(),
    }
}

impl Manager {
    /// Seed the dead list from the state file; decode trouble abandons the
    /// load and starts empty.
    async fn load_snapshot(&mut self) {
        let path = self.cfg.state_file.clone();
        let loaded =
            tokio::task::spawn_blocking(move || disksurvey_snapshot::load_from_path(&path)).await;

        let state = match loaded {
            Ok(Ok(state)) => state,
            Ok(Err(SnapshotError::Io(err))) if err.kind() == io::ErrorKind::NotFound => {
                info!("no prior state file, starting fresh");
                return;
            }
            Ok(Err(err)) => {
                warn!(error = %err, "ignoring unreadable state file");
                return;
            }
            Err(join) => {
                warn!(error = %join, "state file load task failed");
                return;
            }
        };

        if !state.system_identifier.is_empty()
            && state.system_identifier != self.system_identifier
        {
            warn!(
                snapshot = %state.system_identifier,
                host = %self.system_identifier,
                "state file was written by a different host, loading anyway"
            );
        }

        let total = state.disks.len();
        for disk in state.disks {
            let idx = self.roster.get_unused();
            if idx == NIL {
                warn!(total, "state file holds more disks than slots, rest dropped");
                break;
            }
            self.roster.set_entry(
                idx,
                SlotEntry::Dead(RetainedDisk {
                    info: disk.info,
                    latency: disk.latency,
                }),
            );
            self.roster.append(idx, ListId::Dead);
        }
        info!(disks = total, "loaded prior state");
    }

    async fn run(mut self) -> Result<(), ManagerError> {
        let mut tur = tokio::time::interval(self.cfg.tur_interval);
        tur.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Rescan fires immediately on startup; the summary tick waits a full
        // period first.
        let mut rescan = tokio::time::interval(self.cfg.rescan_interval);
        rescan.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut summary = tokio::time::interval_at(
            tokio::time::Instant::now() + self.cfg.tick_interval,
            self.cfg.tick_interval,
        );
        summary.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tur.tick() => self.dispatch_tur(),
                _ = summary.tick() => {
                    self.dispatch_tick();
                    self.spawn_snapshot();
                }
                _ = rescan.tick() => self.trigger_rescan(),
                Some(idx) = self.deaths_rx.recv() => self.reap(idx),
                Some(msg) = self.internal_rx.recv() => self.on_internal(msg),
                ev = self.ctl_rx.recv() => match ev {
                    Some(ControlEvent::Rescan) => self.trigger_rescan(),
                    Some(ControlEvent::Snapshot) => self.spawn_snapshot(),
                    Some(ControlEvent::ListDisks { reply }) => {
                        let _ = reply.send(self.render_json());
                    }
                    Some(ControlEvent::Stats { reply }) => {
                        let _ = reply.send(self.stats());
                    }
                    Some(ControlEvent::Shutdown) | None => break,
                },
            }
        }

        self.shutdown().await
    }

    fn dispatch_tur(&self) {
        for idx in self.roster.list(ListId::Alive) {
            if let Some(alive) = self.roster.alive(idx) {
                alive.shared.request_tur();
            }
        }
    }

    fn dispatch_tick(&self) {
        for idx in self.roster.list(ListId::Alive) {
            if let Some(alive) = self.roster.alive(idx) {
                alive.shared.request_tick();
            }
        }
    }

    /// Kick an asynchronous rescan; requests arriving while one runs
    /// coalesce into it.
    fn trigger_rescan(&mut self) {
        if self.rescan_in_flight {
            debug!("rescan already in flight");
            return;
        }
        self.rescan_in_flight = true;

        let known: HashSet<String> = self
            .roster
            .list(ListId::Alive)
            .into_iter()
            .filter_map(|idx| self.roster.alive(idx).map(|a| a.sg_path.clone()))
            .collect();
        let lister = Arc::clone(&self.lister);
        let transport = Arc::clone(&self.transport);
        let internal = self.internal_tx.clone();
        let timeout_ms = self.cfg.cdb_timeout_ms;

        tokio::spawn(async move {
            match lister.list().await {
                Ok(paths) => {
                    debug!(devices = paths.len(), "rescan enumerated sg devices");
                    for path in paths {
                        if known.contains(&path) {
                            continue;
                        }
                        match scan::inquiry(transport.as_ref(), &path, timeout_ms).await {
                            Ok(info) => {
                                if internal.send(Internal::Adopt { path, info }).is_err() {
                                    return;
                                }
                            }
                            Err(err) => {
                                warn!(path, error = %err, "probe failed, skipped until next rescan");
                            }
                        }
                    }
                }
                Err(err) => warn!(error = %err, "device enumeration failed"),
            }
            let _ = internal.send(Internal::RescanDone);
        });
    }

    fn on_internal(&mut self, msg: Internal) {
        match msg {
            Internal::RescanDone => self.rescan_in_flight = false,
            Internal::Adopt { path, info } => self.adopt(path, info),
        }
    }

    /// Attach a scanned device: re-adopt a matching dead slot (keeping its
    /// latency history) or allocate a fresh one, then start its worker.
    fn adopt(&mut self, path: String, info: DiskInfo) {
        if path.len() > disksurvey_core::limits::MAX_SG_PATH_LEN {
            warn!(path, "device path exceeds the recorded bound, dropped");
            return;
        }
        if self.roster.find_alive_path(&path).is_some() {
            debug!(path, "device already surveyed");
            return;
        }

        let (idx, latency) = match self.roster.find_dead_identity(&info) {
            Some(idx) => {
                self.roster.remove(idx, ListId::Dead);
                let latency = match self.roster.take_entry(idx) {
                    SlotEntry::Dead(dead) => dead.latency,
                    _ => Latency::new(),
                };
                info!(path, slot = idx, "re-adopting previously known disk");
                (idx, latency)
            }
            None => {
                let idx = self.roster.get_unused();
                if idx == NIL {
                    warn!(path, "no free disk slot, device dropped");
                    return;
                }
                info!(path, slot = idx, "adopting new disk");
                (idx, Latency::new())
            }
        };

        let shared = DiskShared::new(info, latency);
        self.roster.set_entry(
            idx,
            SlotEntry::Alive(AliveDisk {
                sg_path: path.clone(),
                shared: Arc::clone(&shared),
            }),
        );
        self.roster.append(idx, ListId::Alive);

        let worker = Worker {
            slot: idx,
            sg_path: path,
            shared,
            transport: Arc::clone(&self.transport),
            deaths: self.deaths_tx.clone(),
            cfg: WorkerConfig {
                monitor_interval_secs: self.cfg.monitor_interval_secs,
                cdb_timeout_ms: self.cfg.cdb_timeout_ms,
            },
        };
        tokio::spawn(worker.run());
    }

    /// Move a dead worker's slot to the dead list, retaining its identity
    /// and latency history for re-adoption.
    fn reap(&mut self, idx: i32) {
        let retained = match self.roster.take_entry(idx) {
            SlotEntry::Alive(alive) => {
                let record = alive.shared.record.lock().expect("disk record poisoned");
                RetainedDisk {
                    info: record.info.clone(),
                    latency: record.latency.clone(),
                }
            }
            other => {
                // Stale death notice for a slot that was already recycled.
                self.roster.set_entry(idx, other);
                debug!(slot = idx, "ignoring death notice for non-alive slot");
                return;
            }
        };

        self.roster.remove(idx, ListId::Alive);
        self.roster.set_entry(idx, SlotEntry::Dead(retained));
        self.roster.append(idx, ListId::Dead);
        info!(slot = idx, "disk moved to dead list");
    }

    fn render_json(&self) -> Result<Vec<u8>, BufferExhausted> {
        let mut views = Vec::new();
        for idx in self.roster.list(ListId::Alive) {
            if let Some(alive) = self.roster.alive(idx) {
                let record = alive.shared.record.lock().expect("disk record poisoned");
                views.push(DiskView::new(
                    &alive.sg_path,
                    &record.info,
                    record.latency.current(),
                ));
            }
        }
        render_disks_json(&views, self.cfg.json_buf_size)
    }

    fn stats(&self) -> ManagerStats {
        ManagerStats {
            alive: self.roster.list(ListId::Alive).len(),
            dead: self.roster.list(ListId::Dead).len(),
            first_unused_entry: self.roster.first_unused_entry,
        }
    }

    /// Clone every disk's records in one non-yielding section so the
    /// snapshot is a point-in-time view, alive before dead.
    fn collect_snapshot(&self) -> SnapshotState {
        let mut disks = Vec::new();
        for idx in self.roster.list(ListId::Alive) {
            if let Some(alive) = self.roster.alive(idx) {
                let record = alive.shared.record.lock().expect("disk record poisoned");
                disks.push(DiskSnapshot {
                    info: record.info.clone(),
                    latency: record.latency.clone(),
                });
            }
        }
        for idx in self.roster.list(ListId::Dead) {
            if let SlotEntry::Dead(dead) = &self.roster.slots[idx as usize].entry {
                disks.push(DiskSnapshot {
                    info: dead.info.clone(),
                    latency: dead.latency.clone(),
                });
            }
        }
        SnapshotState {
            system_identifier: self.system_identifier.clone(),
            disks,
        }
    }

    /// Periodic/triggered snapshot: encode and write off the event loop;
    /// failures are logged and the next attempt starts afresh.
    fn spawn_snapshot(&self) {
        let state = self.collect_snapshot();
        let path = self.cfg.state_file.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(err) = save_to_path(&path, &state) {
                warn!(path = %path.display(), error = %err, "snapshot save failed");
            }
        });
    }

    /// Stop every worker, reap until the alive list drains, then write the
    /// final snapshot. Only that final write can fail the daemon.
    async fn shutdown(mut self) -> Result<(), ManagerError> {
        info!("disk manager stopping");
        for idx in self.roster.list(ListId::Alive) {
            if let Some(alive) = self.roster.alive(idx) {
                alive.shared.stop();
            }
        }

        let mut poll = tokio::time::interval(Duration::from_secs(1));
        while self.roster.head(ListId::Alive) != NIL {
            tokio::select! {
                Some(idx) = self.deaths_rx.recv() => self.reap(idx),
                _ = poll.tick() => {
                    debug!(
                        remaining = self.roster.list(ListId::Alive).len(),
                        "waiting for workers to stop"
                    );
                }
            }
        }

        let state = self.collect_snapshot();
        let path = self.cfg.state_file.clone();
        let written =
            tokio::task::spawn_blocking(move || save_to_path(&path, &state)).await;
        match written {
            Ok(Ok(())) => {
                info!("final snapshot written, disk manager stopped");
                Ok(())
            }
            Ok(Err(err)) => {
                error!(error = %err, "final snapshot failed");
                Err(ManagerError::FinalSnapshot(err))
            }
            Err(join) => {
                error!(error = %join, "final snapshot task failed");
                Err(ManagerError::FinalSnapshot(SnapshotError::Io(
                    io::Error::new(io::ErrorKind::Other, join),
                )))
            }
        }
    }
}
