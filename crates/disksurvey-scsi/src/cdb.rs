//! CDB builders. Each writes into the caller's buffer and returns the
//! command length in bytes.

/// Largest CDB any builder here emits.
pub const CDB_MAX_LEN: usize = 16;

const OP_TEST_UNIT_READY: u8 = 0x00;
const OP_INQUIRY: u8 = 0x12;
const OP_ATA_PASS_THROUGH_16: u8 = 0x85;

// ATA PASS-THROUGH(16) byte 1: protocol in bits 1..4.
const ATA_PROTO_NON_DATA: u8 = 3 << 1;
const ATA_PROTO_PIO_DATA_IN: u8 = 4 << 1;

// ATA PASS-THROUGH(16) byte 2 flags.
const ATA_CK_COND: u8 = 1 << 5;
const ATA_T_DIR_FROM_DEV: u8 = 1 << 3;
const ATA_BYT_BLOK: u8 = 1 << 2;
const ATA_T_LENGTH_IN_COUNT: u8 = 0x02;

// ATA command opcodes.
const ATA_CMD_IDENTIFY_DEVICE: u8 = 0xEC;
const ATA_CMD_CHECK_POWER_MODE: u8 = 0xE5;
const ATA_CMD_SMART: u8 = 0xB0;

// SMART feature register values and the magic LBA mid/high signature.
const SMART_RETURN_STATUS: u8 = 0xDA;
const SMART_LBA_MID: u8 = 0x4F;
const SMART_LBA_HIGH: u8 = 0xC2;

/// Standard INQUIRY (6), EVPD off.
pub fn cdb_inquiry_simple(cdb: &mut [u8], alloc_len: u16) -> usize {
    cdb[..6].fill(0);
    cdb[0] = OP_INQUIRY;
    cdb[3] = (alloc_len >> 8) as u8;
    cdb[4] = alloc_len as u8;
    6
}

/// TEST UNIT READY.
pub fn cdb_tur(cdb: &mut [u8]) -> usize {
    cdb[..6].fill(0);
    cdb[0] = OP_TEST_UNIT_READY;
    6
}

/// IDENTIFY DEVICE wrapped in ATA PASS-THROUGH(16), PIO data-in, one
/// sector delivered through the transfer buffer.
pub fn cdb_ata_identify(cdb: &mut [u8]) -> usize {
    cdb[..16].fill(0);
    cdb[0] = OP_ATA_PASS_THROUGH_16;
    cdb[1] = ATA_PROTO_PIO_DATA_IN;
    cdb[2] = ATA_T_DIR_FROM_DEV | ATA_BYT_BLOK | ATA_T_LENGTH_IN_COUNT;
    cdb[6] = 1; // sector count
    cdb[14] = ATA_CMD_IDENTIFY_DEVICE;
    16
}

/// CHECK POWER MODE wrapped in ATA PASS-THROUGH(16), non-data. Used as the
/// ping for ATA disks so a drive in standby is not spun up by the survey.
pub fn cdb_ata_check_power_mode(cdb: &mut [u8]) -> usize {
    cdb[..16].fill(0);
    cdb[0] = OP_ATA_PASS_THROUGH_16;
    cdb[1] = ATA_PROTO_NON_DATA;
    cdb[2] = ATA_CK_COND;
    cdb[14] = ATA_CMD_CHECK_POWER_MODE;
    16
}

/// SMART RETURN STATUS wrapped in ATA PASS-THROUGH(16), non-data with
/// CK_COND set.
///
/// The health verdict comes back in the ATA registers, so the command is
/// *expected* to complete with CHECK CONDITION and an ATA status-return
/// sense descriptor; a zero SCSI status means the SATL gave us nothing to
/// parse. See [`crate::ata_smart_return_status_result`].
pub fn cdb_ata_smart_return_status(cdb: &mut [u8]) -> usize {
    cdb[..16].fill(0);
    cdb[0] = OP_ATA_PASS_THROUGH_16;
    cdb[1] = ATA_PROTO_NON_DATA;
    cdb[2] = ATA_CK_COND;
    cdb[4] = SMART_RETURN_STATUS; // features (7:0)
    cdb[10] = SMART_LBA_MID;
    cdb[12] = SMART_LBA_HIGH;
    cdb[14] = ATA_CMD_SMART;
    16
}
