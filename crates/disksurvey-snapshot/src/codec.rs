use disksurvey_core::{
    limits as model_limits, AtaHealth, DiskClass, DiskInfo, Latency, LatencySummary, SasHealth,
    HIST_BUCKETS, LATENCY_ENTRIES, NUM_TOP_LATENCIES,
};
use tracing::warn;

use crate::wire::{Reader, Writer};
use crate::{limits, DiskSnapshot, Result, SnapshotError, SnapshotState, SNAPSHOT_VERSION};

// DiskInfo record field tags.
const TAG_VENDOR: u8 = 1;
const TAG_MODEL: u8 = 2;
const TAG_SERIAL: u8 = 3;
const TAG_FW_REV: u8 = 4;
const TAG_DEVICE_TYPE: u8 = 5;
const TAG_ATA: u8 = 6;
const TAG_SAS: u8 = 7;

// Latency record field tags.
const TAG_CUR_ENTRY: u8 = 1;
const TAG_ENTRY: u8 = 2;

/// Encode a full snapshot.
pub fn encode_state(state: &SnapshotState) -> Result<Vec<u8>> {
    if state.system_identifier.len() > limits::MAX_SYSID_LEN {
        return Err(SnapshotError::Corrupt("system identifier too long"));
    }

    let mut out = Writer::new();
    out.u32(SNAPSHOT_VERSION);
    out.u32(state.system_identifier.len() as u32);
    out.bytes(state.system_identifier.as_bytes());

    for disk in &state.disks {
        let info = encode_disk_info(&disk.info)?;
        let latency = encode_latency(&disk.latency);
        out.u32(info.len() as u32);
        out.bytes(&info);
        out.u32(latency.len() as u32);
        out.bytes(&latency);
    }
    Ok(out.into_inner())
}

/// Decode a snapshot. A buffer shorter than the version header loads as an
/// empty state; any structural damage past the header is an error and
/// nothing is returned (no partial loads).
pub fn decode_state(bytes: &[u8]) -> Result<SnapshotState> {
    let mut r = Reader::new(bytes);
    if r.remaining() < 4 {
        return Ok(SnapshotState::default());
    }

    let version = r.u32("truncated version")?;
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }

    let sysid_len = r.u32("truncated system identifier length")? as usize;
    if sysid_len > limits::MAX_SYSID_LEN {
        return Err(SnapshotError::Corrupt("system identifier too long"));
    }
    let system_identifier = utf8_field(
        r.take(sysid_len, "system identifier overruns file")?,
        "system identifier: invalid utf-8",
    )?;

    let mut disks = Vec::new();
    while !r.is_empty() {
        let info_bytes = framed_record(&mut r)?;
        let lat_bytes = framed_record(&mut r)?;

        match decode_disk_info(info_bytes)? {
            Some(info) => disks.push(DiskSnapshot {
                info,
                latency: decode_latency(lat_bytes)?,
            }),
            // The record itself was well-formed but unusable; skip the pair.
            None => continue,
        }
    }

    Ok(SnapshotState {
        system_identifier,
        disks,
    })
}

fn framed_record<'a>(r: &mut Reader<'a>) -> Result<&'a [u8]> {
    let len = r.u32("truncated record length")? as usize;
    if len > limits::MAX_RECORD_LEN {
        return Err(SnapshotError::Corrupt("record length exceeds cap"));
    }
    r.take(len, "record length overruns file")
}

fn utf8_field(bytes: &[u8], err: &'static str) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| SnapshotError::Corrupt(err))
}

fn encode_disk_info(info: &DiskInfo) -> Result<Vec<u8>> {
    bounded(&info.vendor, model_limits::MAX_VENDOR_LEN, "vendor too long")?;
    bounded(&info.model, model_limits::MAX_MODEL_LEN, "model too long")?;
    bounded(&info.serial, model_limits::MAX_SERIAL_LEN, "serial too long")?;
    bounded(&info.fw_rev, model_limits::MAX_FW_REV_LEN, "fw_rev too long")?;

    let mut w = Writer::new();
    w.field(TAG_VENDOR, info.vendor.as_bytes());
    w.field(TAG_MODEL, info.model.as_bytes());
    w.field(TAG_SERIAL, info.serial.as_bytes());
    w.field(TAG_FW_REV, info.fw_rev.as_bytes());
    w.field(TAG_DEVICE_TYPE, &u32::from(info.device_type).to_be_bytes());
    match info.class {
        DiskClass::Unknown => {}
        DiskClass::Ata(ata) => {
            w.field(
                TAG_ATA,
                &[u8::from(ata.smart_supported), u8::from(ata.smart_ok)],
            );
        }
        DiskClass::Sas(sas) => {
            let mut payload = Vec::with_capacity(8);
            payload.extend_from_slice(&u32::from(sas.smart_asc).to_be_bytes());
            payload.extend_from_slice(&u32::from(sas.smart_ascq).to_be_bytes());
            w.field(TAG_SAS, &payload);
        }
    }
    Ok(w.into_inner())
}

fn bounded(s: &str, max: usize, err: &'static str) -> Result<()> {
    if s.len() > max {
        return Err(SnapshotError::Corrupt(err));
    }
    Ok(())
}

/// `Ok(None)` means the record was structurally fine but semantically
/// unusable (both or neither of the kind sub-records); the caller skips it.
fn decode_disk_info(bytes: &[u8]) -> Result<Option<DiskInfo>> {
    let mut info = DiskInfo::default();
    let mut ata: Option<AtaHealth> = None;
    let mut sas: Option<SasHealth> = None;

    let mut r = Reader::new(bytes);
    while let Some((tag, payload)) = r.field()? {
        match tag {
            TAG_VENDOR => {
                bounded_payload(payload, model_limits::MAX_VENDOR_LEN, "vendor too long")?;
                info.vendor = utf8_field(payload, "vendor: invalid utf-8")?;
            }
            TAG_MODEL => {
                bounded_payload(payload, model_limits::MAX_MODEL_LEN, "model too long")?;
                info.model = utf8_field(payload, "model: invalid utf-8")?;
            }
            TAG_SERIAL => {
                bounded_payload(payload, model_limits::MAX_SERIAL_LEN, "serial too long")?;
                info.serial = utf8_field(payload, "serial: invalid utf-8")?;
            }
            TAG_FW_REV => {
                bounded_payload(payload, model_limits::MAX_FW_REV_LEN, "fw_rev too long")?;
                info.fw_rev = utf8_field(payload, "fw_rev: invalid utf-8")?;
            }
            TAG_DEVICE_TYPE => {
                let value = payload_u32(payload, "device type field malformed")?;
                info.device_type = u8::try_from(value)
                    .map_err(|_| SnapshotError::Corrupt("device type out of range"))?;
            }
            TAG_ATA => {
                if payload.len() < 2 {
                    return Err(SnapshotError::Corrupt("ata sub-record truncated"));
                }
                ata = Some(AtaHealth {
                    smart_supported: payload[0] != 0,
                    smart_ok: payload[1] != 0,
                });
            }
            TAG_SAS => {
                if payload.len() < 8 {
                    return Err(SnapshotError::Corrupt("sas sub-record truncated"));
                }
                let asc = payload_u32(&payload[0..4], "sas sub-record malformed")?;
                let ascq = payload_u32(&payload[4..8], "sas sub-record malformed")?;
                sas = Some(SasHealth {
                    smart_asc: asc as u8,
                    smart_ascq: ascq as u8,
                });
            }
            _ => {} // forward compatibility: unknown fields are skipped
        }
    }

    info.class = match (ata, sas) {
        (Some(ata), None) => DiskClass::Ata(ata),
        (None, Some(sas)) => DiskClass::Sas(sas),
        _ => {
            // Exactly one kind sub-record is required; anything else is a
            // record we cannot trust, so the pair is dropped.
            warn!(
                vendor = %info.vendor,
                model = %info.model,
                both = ata.is_some(),
                "skipping snapshot record without exactly one kind sub-record"
            );
            return Ok(None);
        }
    };

    Ok(Some(info))
}

fn bounded_payload(payload: &[u8], max: usize, err: &'static str) -> Result<()> {
    if payload.len() > max {
        return Err(SnapshotError::Corrupt(err));
    }
    Ok(())
}

fn payload_u32(payload: &[u8], err: &'static str) -> Result<u32> {
    let bytes: [u8; 4] = payload
        .try_into()
        .map_err(|_| SnapshotError::Corrupt(err))?;
    Ok(u32::from_be_bytes(bytes))
}

fn encode_latency(latency: &Latency) -> Vec<u8> {
    let mut w = Writer::new();
    w.field(
        TAG_CUR_ENTRY,
        &(latency.cur_entry() as u32).to_be_bytes(),
    );
    for entry in latency.entries() {
        let mut payload = Writer::new();
        payload.u8(NUM_TOP_LATENCIES as u8);
        for &ms in &entry.top_latencies {
            payload.f64(ms);
        }
        payload.u8(HIST_BUCKETS as u8);
        for &count in &entry.hist {
            payload.u32(count);
        }
        w.field(TAG_ENTRY, &payload.into_inner());
    }
    w.into_inner()
}

fn decode_latency(bytes: &[u8]) -> Result<Latency> {
    let mut cur_entry = 0usize;
    let mut entries = Vec::new();

    let mut r = Reader::new(bytes);
    while let Some((tag, payload)) = r.field()? {
        match tag {
            TAG_CUR_ENTRY => {
                cur_entry = payload_u32(payload, "current entry field malformed")? as usize;
            }
            TAG_ENTRY => {
                if entries.len() < LATENCY_ENTRIES {
                    entries.push(decode_latency_entry(payload)?);
                }
                // Entries past the window length are tolerated and dropped.
            }
            _ => {}
        }
    }

    Ok(Latency::from_parts(entries, cur_entry))
}

fn decode_latency_entry(payload: &[u8]) -> Result<LatencySummary> {
    let mut entry = LatencySummary::default();
    let mut r = Reader::new(payload);

    // Lists longer than the compiled-in shapes are read fully but clamped;
    // shorter ones leave the remainder zeroed.
    let top_count = r.u8("latency entry truncated")? as usize;
    for i in 0..top_count {
        let ms = r.f64("latency entry truncated")?;
        if i < NUM_TOP_LATENCIES {
            entry.top_latencies[i] = ms;
        }
    }
    let hist_count = r.u8("latency entry truncated")? as usize;
    for i in 0..hist_count {
        let count = r.u32("latency entry truncated")?;
        if i < HIST_BUCKETS {
            entry.hist[i] = count;
        }
    }
    Ok(entry)
}
