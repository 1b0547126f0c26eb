//! Bounded JSON rendering of the alive roster.

use std::io::{self, Write};

use disksurvey_core::{DiskInfo, LatencySummary, HIST_BUCKETS, NUM_TOP_LATENCIES};
use serde::Serialize;

/// The JSON buffer limit was hit; the response is withheld rather than
/// truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("insufficient buffer space")]
pub struct BufferExhausted;

/// One disk as it appears on `/api/disks`. Field order is the wire order.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiskView {
    pub dev: String,
    pub vendor: String,
    pub model: String,
    pub serial: String,
    pub fw_rev: String,
    pub smart_ok: &'static str,
    pub last_top_latency: [f64; NUM_TOP_LATENCIES],
    pub last_histogram: [u32; HIST_BUCKETS],
}

impl DiskView {
    pub(crate) fn new(dev: &str, info: &DiskInfo, current: &LatencySummary) -> Self {
        Self {
            dev: dev.to_string(),
            vendor: info.vendor.clone(),
            model: info.model.clone(),
            serial: info.serial.clone(),
            fw_rev: info.fw_rev.clone(),
            smart_ok: if info.smart_healthy() { "true" } else { "false" },
            last_top_latency: current.top_latencies,
            last_histogram: current.hist,
        }
    }
}

struct BoundedWriter {
    buf: Vec<u8>,
    cap: usize,
}

impl Write for BoundedWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.buf.len() + data.len() > self.cap {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "json buffer exhausted",
            ));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Serialize the roster as a JSON array of at most `cap` bytes.
pub fn render_disks_json(disks: &[DiskView], cap: usize) -> Result<Vec<u8>, BufferExhausted> {
    let mut writer = BoundedWriter {
        buf: Vec::with_capacity(cap.min(4096)),
        cap,
    };
    serde_json::to_writer(&mut writer, disks).map_err(|_| BufferExhausted)?;
    Ok(writer.buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use disksurvey_core::{AtaHealth, DiskClass};

    fn view() -> DiskView {
        let info = DiskInfo {
            vendor: "ATA".into(),
            model: "Example".into(),
            serial: "A1".into(),
            fw_rev: "1.0".into(),
            device_type: 0,
            class: DiskClass::Ata(AtaHealth {
                smart_supported: true,
                smart_ok: true,
            }),
        };
        let mut summary = LatencySummary::default();
        summary.hist[0] = 3;
        summary.top_latencies[NUM_TOP_LATENCIES - 1] = 0.25;
        DiskView::new("/dev/sg1", &info, &summary)
    }

    #[test]
    fn key_order_matches_the_wire_contract() {
        let bytes = render_disks_json(&[view()], 8192).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let positions: Vec<_> = [
            "\"dev\"",
            "\"vendor\"",
            "\"model\"",
            "\"serial\"",
            "\"fw_rev\"",
            "\"smart_ok\"",
            "\"last_top_latency\"",
            "\"last_histogram\"",
        ]
        .iter()
        .map(|k| text.find(k).expect(k))
        .collect();
        assert!(positions.windows(2).all(|p| p[0] < p[1]));
        assert!(text.contains("\"smart_ok\":\"true\""));
    }

    #[test]
    fn empty_roster_is_an_empty_array() {
        assert_eq!(render_disks_json(&[], 8192).unwrap(), b"[]");
    }

    #[test]
    fn exhaustion_is_an_error_not_a_truncation() {
        let err = render_disks_json(&[view()], 16).unwrap_err();
        assert_eq!(err, BufferExhausted);
    }

    #[test]
    fn exactly_fitting_output_succeeds() {
        let fit = render_disks_json(&[], 8192).unwrap().len();
        assert!(render_disks_json(&[], fit).is_ok());
        assert!(render_disks_json(&[], fit - 1).is_err());
    }
}
