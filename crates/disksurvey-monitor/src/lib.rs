//! The disk monitor engine: device discovery, per-disk workers, the
//! alive/dead roster, and snapshot orchestration.
//!
//! The engine is driven entirely through [`ManagerHandle`] events; the HTTP
//! surface and signal handlers in `disksurvey-server` are thin clients of
//! it. Disks are surveyed over the [`disksurvey_sg::Transport`] seam so
//! tests can substitute scripted devices.

mod control;
mod json;
mod manager;
mod mono;
mod scan;
mod worker;

pub use control::{ListDisksError, ManagerHandle, ManagerStats};
pub use json::{render_disks_json, BufferExhausted, DiskView};
pub use manager::{start_manager, ManagerConfig, ManagerError, MAX_DISKS};
pub use scan::{inquiry, DeviceLister, ScanError, SgDirLister};
