//! SG_IO transport for `/dev/sg*` character devices.
//!
//! The SG char driver is request/response over a plain fd: a CDB wrapped in
//! an `sg_io_hdr` is submitted with `write(2)` and the matching completion
//! header is collected with `read(2)` once the fd polls readable. This crate
//! surfaces that as a single `execute` suspension point per command and
//! keeps at most one command outstanding per device.

mod hdr;

#[cfg(target_os = "linux")]
mod device;

#[cfg(target_os = "linux")]
pub use device::{SgDevice, SgTransport};

use std::time::Instant;

use async_trait::async_trait;

/// Sense buffer capacity reserved for every command.
pub const SENSE_BUF_LEN: usize = 128;

/// Kernel-level timeout applied to every CDB.
pub const DEF_TIMEOUT_MS: u32 = 30_000;

/// Data transfer direction for a CDB. The survey never writes to a disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirection {
    None,
    FromDev,
}

/// One command's completion record.
#[derive(Debug, Clone)]
pub struct Completion {
    /// SCSI status byte (0 = GOOD).
    pub status: u8,
    /// Sense bytes actually written by the device, empty on success.
    pub sense: Vec<u8>,
    /// Bytes of the transfer buffer the device left unfilled.
    pub resid: i32,
    /// Command duration as measured by the kernel, in milliseconds.
    pub duration_ms: u32,
    /// Userspace submit timestamp.
    pub start: Instant,
    /// Userspace completion timestamp.
    pub end: Instant,
}

impl Completion {
    /// Userspace round-trip latency in milliseconds. This, not
    /// [`Completion::duration_ms`], feeds the latency aggregator so all
    /// devices share one clock.
    pub fn elapsed_ms(&self) -> f64 {
        self.end.duration_since(self.start).as_secs_f64() * 1000.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SgError {
    #[error("open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cdb submit failed: {0}")]
    Submit(#[source] std::io::Error),
    #[error("completion read failed: {0}")]
    Completion(#[source] std::io::Error),
    #[error("short completion header ({0} bytes)")]
    ShortHeader(usize),
}

/// Factory for transport handles. The production implementation opens real
/// SG devices; tests substitute scripted transports.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, path: &str) -> Result<Box<dyn TransportHandle>, SgError>;
}

/// An opened device. `execute` submits one CDB and awaits its completion;
/// implementations serialize commands (the `&mut self` receiver enforces it
/// for callers holding the box).
#[async_trait]
pub trait TransportHandle: Send {
    async fn execute(
        &mut self,
        cdb: &[u8],
        dir: DataDirection,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<Completion, SgError>;
}
