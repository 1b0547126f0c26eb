use crate::limits;

/// ATA health flags. `smart_ok` defaults to healthy until the first SMART
/// RETURN STATUS completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtaHealth {
    pub smart_supported: bool,
    pub smart_ok: bool,
}

impl Default for AtaHealth {
    fn default() -> Self {
        Self {
            smart_supported: false,
            smart_ok: true,
        }
    }
}

/// SAS health: last informational-exceptions sense pair. Both zero means
/// healthy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SasHealth {
    pub smart_asc: u8,
    pub smart_ascq: u8,
}

/// Device classification with its kind-specific health payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiskClass {
    #[default]
    Unknown,
    Ata(AtaHealth),
    Sas(SasHealth),
}

/// Identity and classification of one surveyed device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskInfo {
    pub vendor: String,
    pub model: String,
    pub serial: String,
    pub fw_rev: String,
    /// Peripheral device type from INQUIRY byte 0, low five bits
    /// (0 = direct-access block device).
    pub device_type: u8,
    pub class: DiskClass,
}

impl DiskInfo {
    /// Clamp the identity strings to their recorded bounds.
    pub fn truncate_to_limits(&mut self) {
        truncate(&mut self.vendor, limits::MAX_VENDOR_LEN);
        truncate(&mut self.model, limits::MAX_MODEL_LEN);
        truncate(&mut self.serial, limits::MAX_SERIAL_LEN);
        truncate(&mut self.fw_rev, limits::MAX_FW_REV_LEN);
    }

    /// Identity match used for re-adopting a previously seen disk.
    pub fn same_identity(&self, other: &DiskInfo) -> bool {
        self.vendor == other.vendor && self.model == other.model && self.serial == other.serial
    }

    /// The pass/fail health summary exposed over the JSON surface.
    pub fn smart_healthy(&self) -> bool {
        match self.class {
            DiskClass::Ata(ata) => !ata.smart_supported || ata.smart_ok,
            DiskClass::Sas(sas) => sas.smart_asc == 0 && sas.smart_ascq == 0,
            DiskClass::Unknown => true,
        }
    }
}

fn truncate(s: &mut String, max: usize) {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
    }
}
