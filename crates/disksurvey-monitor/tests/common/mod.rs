//! Scripted transport and lister for driving the engine without hardware.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use disksurvey_monitor::DeviceLister;
use disksurvey_sg::{Completion, DataDirection, SgError, Transport, TransportHandle};

/// What a scripted device does once its ping durations run out.
#[derive(Debug, Clone, Copy)]
pub enum OnExhausted {
    /// Keep answering pings with this duration.
    Repeat(f64),
    /// Fail the command: the transport is dead.
    Die,
    /// Never complete; the command stays in flight.
    Stall,
}

#[derive(Debug, Clone)]
pub enum DeviceKind {
    Sas {
        vendor: String,
        model: String,
        fw_rev: String,
        serial: String,
    },
    Ata {
        /// The 40-char IDENTIFY model field, e.g. `"WDC WD4003FZEX-00Z4SA0"`.
        model_field: String,
        serial: String,
        fw_rev: String,
        smart_supported: bool,
        /// Verdict SMART RETURN STATUS reports; `None` completes clean
        /// (status 0, no sense).
        smart_verdict: Option<bool>,
    },
}

#[derive(Debug, Clone)]
pub struct ScriptedDevice {
    pub kind: DeviceKind,
    pub fail_open: bool,
    pub ping_durations_ms: VecDeque<f64>,
    pub on_exhausted: OnExhausted,
}

impl ScriptedDevice {
    pub fn sas(vendor: &str, serial: &str) -> Self {
        Self {
            kind: DeviceKind::Sas {
                vendor: vendor.to_string(),
                model: "ST2000NM0001".to_string(),
                fw_rev: "0002".to_string(),
                serial: serial.to_string(),
            },
            fail_open: false,
            ping_durations_ms: VecDeque::new(),
            on_exhausted: OnExhausted::Repeat(0.2),
        }
    }

    pub fn ata(serial: &str) -> Self {
        Self {
            kind: DeviceKind::Ata {
                model_field: "WDC WD4003FZEX-00Z4SA0".to_string(),
                serial: serial.to_string(),
                fw_rev: "01.01A01".to_string(),
                smart_supported: true,
                smart_verdict: Some(true),
            },
            fail_open: false,
            ping_durations_ms: VecDeque::new(),
            on_exhausted: OnExhausted::Repeat(0.2),
        }
    }

    pub fn pings(mut self, durations: &[f64], then: OnExhausted) -> Self {
        self.ping_durations_ms = durations.iter().copied().collect();
        self.on_exhausted = then;
        self
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    devices: Mutex<HashMap<String, Arc<Mutex<ScriptedDevice>>>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_device(&self, path: &str, device: ScriptedDevice) {
        self.devices
            .lock()
            .unwrap()
            .insert(path.to_string(), Arc::new(Mutex::new(device)));
    }

    pub fn remove_device(&self, path: &str) {
        self.devices.lock().unwrap().remove(path);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
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
        if device.lock().unwrap().fail_open {
            return Err(SgError::Open {
                path: path.to_string(),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            });
        }
        Ok(Box::new(ScriptedHandle { device }))
    }
}

enum Action {
    Data(Vec<u8>, f64),
    Ping(f64),
    Smart(Option<bool>),
    Die,
    Stall,
}

pub struct ScriptedHandle {
    device: Arc<Mutex<ScriptedDevice>>,
}

#[async_trait]
impl TransportHandle for ScriptedHandle {
    async fn execute(
        &mut self,
        cdb: &[u8],
        _dir: DataDirection,
        buf: &mut [u8],
        _timeout_ms: u32,
    ) -> Result<Completion, SgError> {
        // Decide under the lock, act after releasing it.
        let action = {
            let mut device = self.device.lock().unwrap();
            match classify(cdb) {
                Op::Inquiry => Action::Data(inquiry_bytes(&device.kind), 0.1),
                Op::AtaIdentify => Action::Data(identify_bytes(&device.kind), 0.1),
                Op::SmartReturnStatus => {
                    let verdict = match &device.kind {
                        DeviceKind::Ata { smart_verdict, .. } => *smart_verdict,
                        DeviceKind::Sas { .. } => None,
                    };
                    Action::Smart(verdict)
                }
                Op::Ping => match device.ping_durations_ms.pop_front() {
                    Some(ms) => Action::Ping(ms),
                    None => match device.on_exhausted {
                        OnExhausted::Repeat(ms) => Action::Ping(ms),
                        OnExhausted::Die => Action::Die,
                        OnExhausted::Stall => Action::Stall,
                    },
                },
            }
        };

        match action {
            Action::Data(data, ms) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(completion(0, Vec::new(), (buf.len() - n) as i32, ms))
            }
            Action::Ping(ms) => Ok(completion(0, Vec::new(), 0, ms)),
            Action::Smart(Some(ok)) => Ok(completion(2, smart_sense(ok), 0, 0.5)),
            Action::Smart(None) => Ok(completion(0, Vec::new(), 0, 0.5)),
            Action::Die => Err(SgError::Submit(io::Error::from(
                io::ErrorKind::BrokenPipe,
            ))),
            Action::Stall => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

enum Op {
    Inquiry,
    AtaIdentify,
    SmartReturnStatus,
    Ping,
}

fn classify(cdb: &[u8]) -> Op {
    match cdb[0] {
        0x12 => Op::Inquiry,
        0x85 if cdb[14] == 0xEC => Op::AtaIdentify,
        0x85 if cdb[14] == 0xB0 => Op::SmartReturnStatus,
        _ => Op::Ping, // TEST UNIT READY or ATA CHECK POWER MODE
    }
}

fn completion(status: u8, sense: Vec<u8>, resid: i32, elapsed_ms: f64) -> Completion {
    let end = Instant::now();
    let start = end
        .checked_sub(Duration::from_secs_f64(elapsed_ms / 1000.0))
        .unwrap_or(end);
    Completion {
        status,
        sense,
        resid,
        duration_ms: elapsed_ms as u32,
        start,
        end,
    }
}

fn pad(s: &str, width: usize) -> Vec<u8> {
    let mut out = s.as_bytes().to_vec();
    out.resize(width, b' ');
    out.truncate(width);
    out
}

fn inquiry_bytes(kind: &DeviceKind) -> Vec<u8> {
    let mut data = vec![0u8; 64];
    match kind {
        DeviceKind::Sas {
            vendor,
            model,
            fw_rev,
            serial,
        } => {
            data[8..16].copy_from_slice(&pad(vendor, 8));
            data[16..32].copy_from_slice(&pad(model, 16));
            data[32..36].copy_from_slice(&pad(fw_rev, 4));
            data[36..44].copy_from_slice(&pad(serial, 8));
        }
        DeviceKind::Ata { .. } => {
            // A SATL bridge: the literal vendor, no serial.
            data[8..16].copy_from_slice(b"ATA     ");
            data[16..32].copy_from_slice(&pad("bridged", 16));
            data[32..36].copy_from_slice(&pad("0001", 4));
        }
    }
    data
}

fn identify_bytes(kind: &DeviceKind) -> Vec<u8> {
    let mut sector = vec![0u8; 512];
    let DeviceKind::Ata {
        model_field,
        serial,
        fw_rev,
        smart_supported,
        ..
    } = kind
    else {
        return sector;
    };

    let put = |sector: &mut [u8], words: std::ops::Range<usize>, s: &str| {
        let width = words.len() * 2;
        let mut padded = s.as_bytes().to_vec();
        padded.resize(width, b' ');
        for (i, word) in words.enumerate() {
            sector[word * 2] = padded[i * 2 + 1];
            sector[word * 2 + 1] = padded[i * 2];
        }
    };
    put(&mut sector, 27..47, model_field);
    put(&mut sector, 10..20, serial);
    put(&mut sector, 23..27, fw_rev);
    if *smart_supported {
        sector[82 * 2] = 0x01;
    }
    sector
}

fn smart_sense(healthy: bool) -> Vec<u8> {
    let (lba_mid, lba_high) = if healthy { (0x4F, 0xC2) } else { (0xF4, 0x2C) };
    let mut sense = vec![0u8; 8 + 14];
    sense[0] = 0x72;
    sense[7] = 14;
    sense[8] = 0x09;
    sense[9] = 0x0C;
    sense[8 + 2 + 7] = lba_mid;
    sense[8 + 2 + 9] = lba_high;
    sense
}

pub struct ScriptedLister {
    paths: Mutex<Vec<String>>,
}

impl ScriptedLister {
    pub fn new(paths: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            paths: Mutex::new(paths.iter().map(|p| p.to_string()).collect()),
        })
    }

    pub fn set(&self, paths: &[&str]) {
        *self.paths.lock().unwrap() = paths.iter().map(|p| p.to_string()).collect();
    }
}

#[async_trait]
impl DeviceLister for ScriptedLister {
    async fn list(&self) -> io::Result<Vec<String>> {
        Ok(self.paths.lock().unwrap().clone())
    }
}

/// Poll `probe` until it returns true or the deadline passes.
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
