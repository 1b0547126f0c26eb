//! Versioned, length-framed snapshot of the survey state.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! u32 version                  (accept-set: {2})
//! u32 sysid_len, sysid bytes   (host identifier)
//! repeat until EOF:
//!   u32 info_len,  DiskInfo record
//!   u32 lat_len,   Latency record
//! ```
//!
//! Records are tag/length field streams so fields can be added without
//! breaking old decoders; unknown tags are skipped. A declared length that
//! overruns the file aborts the whole load; there are no partial loads.

mod codec;
mod file;
mod wire;

pub use codec::{decode_state, encode_state};
pub use file::{load_from_path, save_to_path};

use disksurvey_core::{DiskInfo, Latency};

/// The only header version this build reads or writes.
pub const SNAPSHOT_VERSION: u32 = 2;

pub mod limits {
    /// Cap on the host-identifier field.
    pub const MAX_SYSID_LEN: usize = 128;
    /// Cap on a single framed record; a latency record for a full window is
    /// well under this.
    pub const MAX_RECORD_LEN: usize = 8 << 20;
}

/// One disk's persisted state.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskSnapshot {
    pub info: DiskInfo,
    pub latency: Latency,
}

/// Everything a snapshot file holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotState {
    pub system_identifier: String,
    pub disks: Vec<DiskSnapshot>,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
    #[error("corrupt snapshot: {0}")]
    Corrupt(&'static str),
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
