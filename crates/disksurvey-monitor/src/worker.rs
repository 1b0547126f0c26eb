//! Per-disk cooperative worker.
//!
//! The manager posts work by setting a request bit and waking the worker's
//! wait object; the worker owns its transport handle for its lifetime and
//! keeps at most one CDB outstanding. Transport death (or a failed open)
//! ends the task and notifies the reaper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use disksurvey_core::{DiskClass, DiskInfo, Latency};
use disksurvey_scsi::{
    ata_smart_return_status_result, cdb_ata_check_power_mode, cdb_ata_smart_return_status,
    cdb_tur, parse_sense, sense_key_name, CDB_MAX_LEN,
};
use disksurvey_sg::{DataDirection, SgError, Transport, TransportHandle};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::mono;

const SMART_BUF_LEN: usize = 512;

#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerConfig {
    pub monitor_interval_secs: u64,
    pub cdb_timeout_ms: u32,
}

/// Mutable per-disk record. Guarded by a short-lived mutex that is never
/// held across a suspension point; the worker writes it, the manager reads
/// it for JSON and snapshots.
#[derive(Debug)]
pub(crate) struct DiskRecord {
    pub info: DiskInfo,
    pub latency: Latency,
    pub last_ping_ts: u64,
    pub last_reply_ts: u64,
    pub last_monitor_ts: u64,
}

/// State shared between a worker task and the manager's slot.
#[derive(Debug)]
pub(crate) struct DiskShared {
    pub record: Mutex<DiskRecord>,
    pub request_tur: AtomicBool,
    pub request_tick: AtomicBool,
    pub active: AtomicBool,
    pub wait: Notify,
}

impl DiskShared {
    pub fn new(info: DiskInfo, latency: Latency) -> Arc<Self> {
        Arc::new(Self {
            record: Mutex::new(DiskRecord {
                info,
                latency,
                last_ping_ts: 0,
                last_reply_ts: 0,
                last_monitor_ts: 0,
            }),
            request_tur: AtomicBool::new(false),
            request_tick: AtomicBool::new(false),
            active: AtomicBool::new(true),
            wait: Notify::new(),
        })
    }

    /// Post a ping request.
    pub fn request_tur(&self) {
        self.request_tur.store(true, Ordering::Release);
        self.wait.notify_one();
    }

    /// Post a summary-tick request.
    pub fn request_tick(&self) {
        self.request_tick.store(true, Ordering::Release);
        self.wait.notify_one();
    }

    /// Idempotent, non-blocking stop; the worker exits after any in-flight
    /// command completes.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
        self.wait.notify_one();
    }

    fn is_ata(&self) -> bool {
        matches!(
            self.record.lock().expect("disk record poisoned").info.class,
            DiskClass::Ata(_)
        )
    }
}

pub(crate) struct Worker {
    pub slot: i32,
    pub sg_path: String,
    pub shared: Arc<DiskShared>,
    pub transport: Arc<dyn Transport>,
    pub deaths: mpsc::UnboundedSender<i32>,
    pub cfg: WorkerConfig,
}

impl Worker {
    pub async fn run(self) {
        let mut handle = match self.transport.open(&self.sg_path).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(path = %self.sg_path, error = %err, "cannot open disk, giving up on it");
                self.shared.active.store(false, Ordering::Release);
                let _ = self.deaths.send(self.slot);
                return;
            }
        };

        debug!(path = %self.sg_path, "worker started");
        while self.shared.active.load(Ordering::Acquire) {
            let tur = self.shared.request_tur.swap(false, Ordering::AcqRel);
            let tick = self.shared.request_tick.swap(false, Ordering::AcqRel);
            if !tur && !tick {
                self.shared.wait.notified().await;
                continue;
            }

            if tur {
                if let Err(err) = self.do_ping(handle.as_mut()).await {
                    warn!(path = %self.sg_path, error = %err, "ping transport failure, disk died");
                    self.shared.active.store(false, Ordering::Release);
                    break;
                }
            }

            if tick && self.shared.active.load(Ordering::Acquire) {
                if let Err(err) = self.do_tick(handle.as_mut()).await {
                    warn!(path = %self.sg_path, error = %err, "monitor transport failure, disk died");
                    self.shared.active.store(false, Ordering::Release);
                    break;
                }
            }
        }

        drop(handle);
        debug!(path = %self.sg_path, "worker exiting");
        let _ = self.deaths.send(self.slot);
    }

    /// Ping once and feed the round-trip latency into the current bucket.
    /// A non-zero SCSI status is a soft failure: the latency still counts.
    async fn do_ping(&self, handle: &mut dyn TransportHandle) -> Result<(), SgError> {
        let mut cdb = [0u8; CDB_MAX_LEN];
        let cdb_len = if self.shared.is_ata() {
            cdb_ata_check_power_mode(&mut cdb)
        } else {
            cdb_tur(&mut cdb)
        };

        let completion = handle
            .execute(&cdb[..cdb_len], DataDirection::None, &mut [], self.cfg.cdb_timeout_ms)
            .await?;

        let ms = completion.elapsed_ms();
        if completion.status != 0 {
            debug!(
                path = %self.sg_path,
                status = completion.status,
                sense_key = parse_sense(&completion.sense)
                    .map(|s| sense_key_name(s.sense_key))
                    .unwrap_or("no sense"),
                "ping completed with non-zero status"
            );
        }
        debug!(
            path = %self.sg_path,
            elapsed_ms = ms,
            kernel_ms = completion.duration_ms,
            "ping reply"
        );

        let mut record = self.shared.record.lock().expect("disk record poisoned");
        record.last_ping_ts = mono::seconds_at(completion.start);
        record.last_reply_ts = mono::seconds_at(completion.end);
        record.latency.add_sample(ms);
        Ok(())
    }

    /// Summary tick: roll the latency window, then run the SMART health
    /// check when its interval has elapsed.
    async fn do_tick(&self, handle: &mut dyn TransportHandle) -> Result<(), SgError> {
        let now = mono::seconds();
        let monitor_due = {
            let mut record = self.shared.record.lock().expect("disk record poisoned");
            record.latency.tick();
            let due = now - record.last_monitor_ts >= self.cfg.monitor_interval_secs;
            if due {
                record.last_monitor_ts = now;
            }
            due
        };

        if !monitor_due {
            return Ok(());
        }

        if self.shared.is_ata() {
            self.do_ata_smart(handle).await
        } else {
            // SAS informational-exceptions log sense is reserved; SAS health
            // stays whatever the last sense reported.
            Ok(())
        }
    }

    async fn do_ata_smart(&self, handle: &mut dyn TransportHandle) -> Result<(), SgError> {
        let mut cdb = [0u8; CDB_MAX_LEN];
        let cdb_len = cdb_ata_smart_return_status(&mut cdb);
        let mut buf = [0u8; SMART_BUF_LEN];

        let completion = handle
            .execute(&cdb[..cdb_len], DataDirection::FromDev, &mut buf, self.cfg.cdb_timeout_ms)
            .await?;

        if completion.status == 0 {
            // The verdict travels in the sense buffer, so a clean status
            // carries no information.
            debug!(path = %self.sg_path, "smart return status completed clean, no verdict");
            return Ok(());
        }

        match ata_smart_return_status_result(&completion.sense) {
            Some(smart_ok) => {
                let mut record = self.shared.record.lock().expect("disk record poisoned");
                if let DiskClass::Ata(ref mut ata) = record.info.class {
                    ata.smart_ok = smart_ok;
                }
                info!(path = %self.sg_path, smart_ok, "smart health updated");
            }
            None => {
                debug!(path = %self.sg_path, "smart sense carried no usable verdict");
            }
        }
        Ok(())
    }
}
