//! Minimal scripted SAS transport so router tests can run a real manager
//! without hardware.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use disksurvey_monitor::{DeviceLister, ManagerConfig};
use disksurvey_sg::{Completion, DataDirection, SgError, Transport, TransportHandle};

#[derive(Debug, Clone)]
pub struct FakeSas {
    pub vendor: String,
    pub serial: String,
}

#[derive(Default)]
pub struct FakeSasTransport {
    devices: Mutex<HashMap<String, FakeSas>>,
}

impl FakeSasTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, path: &str, vendor: &str, serial: &str) {
        self.devices.lock().unwrap().insert(
            path.to_string(),
            FakeSas {
                vendor: vendor.to_string(),
                serial: serial.to_string(),
            },
        );
    }
}

#[async_trait]
impl Transport for FakeSasTransport {
    async fn open(&self, path: &str) -> Result<Box<dyn TransportHandle>, SgError> {
        let device = self
            .devices
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| SgError::Open {
                path: path.to_string(),
                source: io::Error::from(io::ErrorKind::NotFound),
            })?;
        Ok(Box::new(FakeSasHandle { device }))
    }
}

struct FakeSasHandle {
    device: FakeSas,
}

#[async_trait]
impl TransportHandle for FakeSasHandle {
    async fn execute(
        &mut self,
        cdb: &[u8],
        _dir: DataDirection,
        buf: &mut [u8],
        _timeout_ms: u32,
    ) -> Result<Completion, SgError> {
        if cdb[0] == 0x12 {
            let mut data = vec![0u8; 64];
            data[8..16].copy_from_slice(&pad(&self.device.vendor, 8));
            data[16..32].copy_from_slice(&pad("ST2000NM0001", 16));
            data[32..36].copy_from_slice(&pad("0002", 4));
            data[36..44].copy_from_slice(&pad(&self.device.serial, 8));
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            return Ok(completion((buf.len() - n) as i32));
        }
        Ok(completion(0))
    }
}

fn pad(s: &str, width: usize) -> Vec<u8> {
    let mut out = s.as_bytes().to_vec();
    out.resize(width, b' ');
    out.truncate(width);
    out
}

fn completion(resid: i32) -> Completion {
    let end = Instant::now();
    let start = end
        .checked_sub(Duration::from_micros(200))
        .unwrap_or(end);
    Completion {
        status: 0,
        sense: Vec::new(),
        resid,
        duration_ms: 0,
        start,
        end,
    }
}

pub struct FixedLister {
    paths: Vec<String>,
}

impl FixedLister {
    pub fn new(paths: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            paths: paths.iter().map(|p| p.to_string()).collect(),
        })
    }
}

#[async_trait]
impl DeviceLister for FixedLister {
    async fn list(&self) -> io::Result<Vec<String>> {
        Ok(self.paths.clone())
    }
}

pub fn test_manager_config(dir: &tempfile::TempDir, json_buf_size: usize) -> ManagerConfig {
    ManagerConfig {
        state_file: dir.path().join("disksurvey.dat"),
        tur_interval: Duration::from_millis(20),
        tick_interval: Duration::from_secs(3600),
        rescan_interval: Duration::from_secs(3600),
        monitor_interval_secs: 3600,
        json_buf_size,
        ..ManagerConfig::default()
    }
}

/// Poll until `probe` is true or panic at the deadline.
pub async fn wait_until<F, Fut>(what: &str, timeout: Duration, mut probe: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if probe().await {
            return;
        }
        if Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
