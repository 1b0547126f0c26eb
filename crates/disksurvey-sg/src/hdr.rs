//! `sg_io_hdr` layout and packing, mirroring `<scsi/sg.h>`.

use std::ffi::c_void;
use std::ptr;

pub(crate) const SG_INTERFACE_ID: i32 = 'S' as i32;

pub(crate) const SG_DXFER_NONE: i32 = -1;
pub(crate) const SG_DXFER_FROM_DEV: i32 = -3;

pub(crate) const SG_FLAG_LUN_INHIBIT: u32 = 2;

#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct SgIoHdr {
    pub interface_id: i32,
    pub dxfer_direction: i32,
    pub cmd_len: u8,
    pub mx_sb_len: u8,
    pub iovec_count: u16,
    pub dxfer_len: u32,
    pub dxferp: *mut c_void,
    pub cmdp: *const u8,
    pub sbp: *mut u8,
    pub timeout: u32,
    pub flags: u32,
    pub pack_id: i32,
    pub usr_ptr: *mut c_void,
    pub status: u8,
    pub masked_status: u8,
    pub msg_status: u8,
    pub sb_len_wr: u8,
    pub host_status: u16,
    pub driver_status: u16,
    pub resid: i32,
    pub duration: u32,
    pub info: u32,
}

impl SgIoHdr {
    pub(crate) fn zeroed() -> Self {
        Self {
            interface_id: 0,
            dxfer_direction: 0,
            cmd_len: 0,
            mx_sb_len: 0,
            iovec_count: 0,
            dxfer_len: 0,
            dxferp: ptr::null_mut(),
            cmdp: ptr::null(),
            sbp: ptr::null_mut(),
            timeout: 0,
            flags: 0,
            pack_id: 0,
            usr_ptr: ptr::null_mut(),
            status: 0,
            masked_status: 0,
            msg_status: 0,
            sb_len_wr: 0,
            host_status: 0,
            driver_status: 0,
            resid: 0,
            duration: 0,
            info: 0,
        }
    }
}

/// Pack a request header. The caller keeps `cdb`, `sense`, and the data
/// buffer alive until the completion has been read back; the kernel holds
/// their addresses until then.
pub(crate) fn pack_request(
    cdb: &[u8],
    dxfer_direction: i32,
    data: Option<(*mut c_void, u32)>,
    sense: &mut [u8],
    timeout_ms: u32,
    req_id: u64,
) -> SgIoHdr {
    let mut hdr = SgIoHdr::zeroed();
    hdr.interface_id = SG_INTERFACE_ID;
    hdr.dxfer_direction = dxfer_direction;
    hdr.cmd_len = cdb.len() as u8;
    hdr.mx_sb_len = sense.len() as u8;
    if let Some((ptr, len)) = data {
        hdr.dxferp = ptr;
        hdr.dxfer_len = len;
    }
    hdr.cmdp = cdb.as_ptr();
    hdr.sbp = sense.as_mut_ptr();
    hdr.timeout = timeout_ms;
    hdr.flags = SG_FLAG_LUN_INHIBIT;
    hdr.usr_ptr = req_id as *mut c_void;
    hdr
}
