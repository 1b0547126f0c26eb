//! Device enumeration and the probe that classifies a freshly discovered
//! device.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use disksurvey_core::{AtaHealth, DiskClass, DiskInfo, SasHealth};
use disksurvey_scsi::{
    ata_identify_fw_rev, ata_identify_model, ata_identify_serial, ata_identify_smart_supported,
    cdb_ata_identify, cdb_inquiry_simple, parse_inquiry, sense_key_name, ScsiError, CDB_MAX_LEN,
};
use disksurvey_sg::{DataDirection, SgError, Transport};
use tracing::{debug, info};

/// INQUIRY/IDENTIFY responses share one transfer buffer of this size.
const SCAN_BUF_LEN: usize = 512;

/// The literal vendor string SATL bridges report for ATA disks behind a
/// SCSI front; matched verbatim, trailing spaces included.
const ATA_VENDOR_LITERAL: &str = "ATA     ";

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Transport(#[from] SgError),
    #[error(transparent)]
    Malformed(#[from] ScsiError),
    #[error("{op} failed with status {status:#04x} ({sense_key})")]
    CommandFailed {
        op: &'static str,
        status: u8,
        sense_key: &'static str,
    },
}

/// Enumerates candidate SG device paths. Production walks `/dev`; tests
/// supply fixed lists.
#[async_trait]
pub trait DeviceLister: Send + Sync {
    async fn list(&self) -> io::Result<Vec<String>>;
}

/// Lists `sg<N>` character-device nodes under a directory, off-thread
/// (directory enumeration blocks).
pub struct SgDirLister {
    dir: PathBuf,
}

impl SgDirLister {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DeviceLister for SgDirLister {
    async fn list(&self) -> io::Result<Vec<String>> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || {
            let mut paths = Vec::new();
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                let Some(suffix) = name.strip_prefix("sg") else {
                    continue;
                };
                if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
                    continue;
                }
                paths.push(dir.join(name).to_string_lossy().into_owned());
            }
            paths.sort();
            Ok(paths)
        })
        .await
        .map_err(|join| io::Error::new(io::ErrorKind::Other, join))?
    }
}

/// Probe a device: INQUIRY, then ATA IDENTIFY when the vendor heuristic
/// says the SCSI identity is a bridge facade. Returns the classified
/// identity or the first failure; the caller skips the device until the
/// next rescan.
pub async fn inquiry(
    transport: &dyn Transport,
    path: &str,
    timeout_ms: u32,
) -> Result<DiskInfo, ScanError> {
    let mut handle = transport.open(path).await?;
    let mut cdb = [0u8; CDB_MAX_LEN];
    let mut data = [0u8; SCAN_BUF_LEN];

    let cdb_len = cdb_inquiry_simple(&mut cdb, SCAN_BUF_LEN as u16);
    let completion = handle
        .execute(&cdb[..cdb_len], DataDirection::FromDev, &mut data, timeout_ms)
        .await?;
    if completion.status != 0 {
        return Err(command_failed("INQUIRY", &completion));
    }

    let valid = SCAN_BUF_LEN.saturating_sub(completion.resid.max(0) as usize);
    let inq = parse_inquiry(&data[..valid])?;
    debug!(
        path,
        vendor = %inq.vendor,
        model = %inq.model,
        serial = %inq.serial,
        elapsed_ms = completion.elapsed_ms(),
        "inquiry reply"
    );

    let mut disk_info = DiskInfo {
        vendor: inq.vendor.clone(),
        model: inq.model.clone(),
        serial: inq.serial.clone(),
        fw_rev: inq.fw_rev.clone(),
        device_type: inq.device_type,
        class: DiskClass::Unknown,
    };

    if inq.vendor_padded() == ATA_VENDOR_LITERAL || inq.serial.is_empty() {
        // The SCSI identity is the bridge's; ask the drive itself.
        let cdb_len = cdb_ata_identify(&mut cdb);
        let completion = handle
            .execute(&cdb[..cdb_len], DataDirection::FromDev, &mut data, timeout_ms)
            .await?;
        if completion.status != 0 {
            return Err(command_failed("ATA IDENTIFY", &completion));
        }

        let model_field =
            ata_identify_model(&data).ok_or(ScsiError::Truncated(SCAN_BUF_LEN))?;
        match model_field.split_once(' ') {
            Some((vendor, model)) => {
                disk_info.vendor = vendor.to_string();
                disk_info.model = model.trim_start().to_string();
            }
            None => {
                disk_info.vendor = "ATA".to_string();
                disk_info.model = model_field;
            }
        }
        if let Some(serial) = ata_identify_serial(&data) {
            disk_info.serial = serial;
        }
        if let Some(fw_rev) = ata_identify_fw_rev(&data) {
            disk_info.fw_rev = fw_rev;
        }
        disk_info.class = DiskClass::Ata(AtaHealth {
            smart_supported: ata_identify_smart_supported(&data).unwrap_or(false),
            smart_ok: true,
        });
    } else {
        disk_info.class = DiskClass::Sas(SasHealth::default());
    }

    disk_info.truncate_to_limits();
    info!(
        path,
        vendor = %disk_info.vendor,
        model = %disk_info.model,
        serial = %disk_info.serial,
        kind = kind_name(&disk_info),
        "disk identified"
    );
    Ok(disk_info)
}

fn kind_name(info: &DiskInfo) -> &'static str {
    match info.class {
        DiskClass::Unknown => "unknown",
        DiskClass::Ata(_) => "ata",
        DiskClass::Sas(_) => "sas",
    }
}

fn command_failed(op: &'static str, completion: &disksurvey_sg::Completion) -> ScanError {
    let sense_key = disksurvey_scsi::parse_sense(&completion.sense)
        .map(|s| sense_key_name(s.sense_key))
        .unwrap_or("no sense");
    ScanError::CommandFailed {
        op,
        status: completion.status,
        sense_key,
    }
}
