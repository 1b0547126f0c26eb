use std::ffi::{c_void, CString};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::unix::AsyncFd;
use tracing::{debug, trace, warn};

use crate::hdr::{pack_request, SgIoHdr, SG_DXFER_FROM_DEV, SG_DXFER_NONE};
use crate::{Completion, DataDirection, SgError, Transport, TransportHandle, SENSE_BUF_LEN};

const HDR_LEN: usize = mem::size_of::<SgIoHdr>();

/// Distinguishes completions when the driver replays a stale request after
/// reopen; shared across all devices in the process.
static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

/// An opened SG character device.
pub struct SgDevice {
    fd: AsyncFd<OwnedFd>,
    path: String,
}

impl SgDevice {
    /// Open the device non-blocking. The `open(2)` itself can stall on a
    /// wedged HBA, so callers on an event loop should wrap this in
    /// `spawn_blocking`; [`SgTransport`] does.
    pub fn open(path: &str) -> Result<Self, SgError> {
        let c_path = CString::new(path).map_err(|_| SgError::Open {
            path: path.to_string(),
            source: io::Error::from(io::ErrorKind::InvalidInput),
        })?;
        let raw = unsafe {
            libc::open(
                c_path.as_ptr(),
                libc::O_RDWR | libc::O_NONBLOCK | libc::O_CLOEXEC,
            )
        };
        if raw < 0 {
            return Err(SgError::Open {
                path: path.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        let owned = unsafe { OwnedFd::from_raw_fd(raw) };
        let fd = AsyncFd::new(owned).map_err(|source| SgError::Open {
            path: path.to_string(),
            source,
        })?;
        Ok(Self {
            fd,
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Submit one CDB and await its completion.
    ///
    /// Submit is a non-blocking `write`; a would-block submit is treated as
    /// accepted and left for the poll side, matching the driver's contract.
    /// Any other submit or read failure is fatal for this device.
    pub async fn execute(
        &mut self,
        cdb: &[u8],
        dir: DataDirection,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<Completion, SgError> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let mut sense = [0u8; SENSE_BUF_LEN];

        let (dxfer_direction, data) = match dir {
            DataDirection::None => (SG_DXFER_NONE, None),
            DataDirection::FromDev => (
                SG_DXFER_FROM_DEV,
                Some((buf.as_mut_ptr() as *mut c_void, buf.len() as u32)),
            ),
        };
        let start = Instant::now();
        {
            let hdr = pack_request(cdb, dxfer_direction, data, &mut sense, timeout_ms, req_id);
            self.submit(&hdr)?;
        }
        // `cdb`, `buf` and `sense` stay borrowed until the completion read:
        // the driver resolves their addresses when it copies data out.
        let completed = self.await_completion(req_id).await?;
        let end = Instant::now();

        let sb_len = (completed.sb_len_wr as usize).min(SENSE_BUF_LEN);
        Ok(Completion {
            status: completed.status,
            sense: sense[..sb_len].to_vec(),
            resid: completed.resid,
            duration_ms: completed.duration,
            start,
            end,
        })
    }

    fn submit(&self, hdr: &SgIoHdr) -> Result<(), SgError> {
        let fd = self.fd.get_ref().as_raw_fd();
        loop {
            let ret =
                unsafe { libc::write(fd, hdr as *const SgIoHdr as *const c_void, HDR_LEN) };
            if ret == HDR_LEN as isize {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock => {
                    trace!(path = %self.path, "sg submit would block, deferring to poll side");
                    return Ok(());
                }
                _ => return Err(SgError::Submit(err)),
            }
        }
    }

    async fn await_completion(&mut self, req_id: u64) -> Result<SgIoHdr, SgError> {
        loop {
            let mut guard = self
                .fd
                .readable()
                .await
                .map_err(SgError::Completion)?;

            let mut hdr = SgIoHdr::zeroed();
            let result = guard.try_io(|inner| {
                let ret = unsafe {
                    libc::read(
                        inner.get_ref().as_raw_fd(),
                        &mut hdr as *mut SgIoHdr as *mut c_void,
                        HDR_LEN,
                    )
                };
                if ret < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(ret as usize)
                }
            });

            match result {
                Ok(Ok(n)) if n == HDR_LEN => {
                    if hdr.usr_ptr as u64 != req_id {
                        warn!(
                            path = %self.path,
                            got = hdr.usr_ptr as u64,
                            want = req_id,
                            "discarding completion for a different request"
                        );
                        continue;
                    }
                    debug!(
                        path = %self.path,
                        status = hdr.status,
                        duration_ms = hdr.duration,
                        resid = hdr.resid,
                        "sg completion"
                    );
                    return Ok(hdr);
                }
                Ok(Ok(n)) => return Err(SgError::ShortHeader(n)),
                Ok(Err(err)) if err.kind() == io::ErrorKind::Interrupted => continue,
                Ok(Err(err)) => return Err(SgError::Completion(err)),
                Err(_would_block) => continue,
            }
        }
    }
}

/// The production [`Transport`]: opens real `/dev/sg*` nodes, pushing the
/// blocking `open(2)` onto the runtime's blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct SgTransport;

#[async_trait]
impl Transport for SgTransport {
    async fn open(&self, path: &str) -> Result<Box<dyn TransportHandle>, SgError> {
        let owned = path.to_string();
        let dev = tokio::task::spawn_blocking(move || SgDevice::open(&owned))
            .await
            .map_err(|join| SgError::Open {
                path: path.to_string(),
                source: io::Error::new(io::ErrorKind::Other, join),
            })??;
        Ok(Box::new(dev))
    }
}

#[async_trait]
impl TransportHandle for SgDevice {
    async fn execute(
        &mut self,
        cdb: &[u8],
        dir: DataDirection,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<Completion, SgError> {
        SgDevice::execute(self, cdb, dir, buf, timeout_ms).await
    }
}
