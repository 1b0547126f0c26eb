//! CDB builders and response parsers for the SCSI/ATA commands the survey
//! issues. Everything here is a pure function over byte slices; the SG
//! transport lives in `disksurvey-sg`.

mod ata;
mod cdb;
mod inquiry;
mod sense;

pub use ata::{
    ata_identify_fw_rev, ata_identify_model, ata_identify_serial, ata_identify_smart_supported,
    ata_smart_return_status_result,
};
pub use cdb::{
    cdb_ata_check_power_mode, cdb_ata_identify, cdb_ata_smart_return_status, cdb_inquiry_simple,
    cdb_tur, CDB_MAX_LEN,
};
pub use inquiry::{parse_inquiry, InquiryData};
pub use sense::{parse_sense, sense_key_name, SenseInfo};

/// SCSI status byte for CHECK CONDITION.
pub const STATUS_CHECK_CONDITION: u8 = 0x02;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScsiError {
    #[error("response truncated ({0} bytes)")]
    Truncated(usize),
    #[error("malformed response: {0}")]
    Malformed(&'static str),
}
