//! ATA IDENTIFY DEVICE field extraction and SMART sense interpretation.
//!
//! IDENTIFY strings are stored byte-swapped within each 16-bit word; the
//! extractors undo the swab and trim the space padding.

use crate::sense::descriptor_payload;

const IDENTIFY_LEN: usize = 512;

// Word ranges of the identity strings, per ACS.
const SERIAL_WORDS: core::ops::Range<usize> = 10..20;
const FW_REV_WORDS: core::ops::Range<usize> = 23..27;
const MODEL_WORDS: core::ops::Range<usize> = 27..47;

const SMART_SUPPORT_WORD: usize = 82;

fn swabbed_string(identify: &[u8], words: core::ops::Range<usize>) -> String {
    let mut out = String::with_capacity(words.len() * 2);
    for word in words {
        let lo = identify[word * 2];
        let hi = identify[word * 2 + 1];
        for b in [hi, lo] {
            if b.is_ascii_graphic() || b == b' ' {
                out.push(b as char);
            } else {
                out.push(' ');
            }
        }
    }
    out.trim().to_string()
}

fn word(identify: &[u8], idx: usize) -> u16 {
    u16::from_le_bytes([identify[idx * 2], identify[idx * 2 + 1]])
}

/// The 40-character model string (words 27..46), swabbed and trimmed.
/// Returns `None` when the sector is short.
pub fn ata_identify_model(identify: &[u8]) -> Option<String> {
    (identify.len() >= IDENTIFY_LEN).then(|| swabbed_string(identify, MODEL_WORDS))
}

/// The 20-character serial number (words 10..19).
pub fn ata_identify_serial(identify: &[u8]) -> Option<String> {
    (identify.len() >= IDENTIFY_LEN).then(|| swabbed_string(identify, SERIAL_WORDS))
}

/// The 8-character firmware revision (words 23..26).
pub fn ata_identify_fw_rev(identify: &[u8]) -> Option<String> {
    (identify.len() >= IDENTIFY_LEN).then(|| swabbed_string(identify, FW_REV_WORDS))
}

/// Whether the SMART feature set is supported (word 82 bit 0).
pub fn ata_identify_smart_supported(identify: &[u8]) -> Option<bool> {
    (identify.len() >= IDENTIFY_LEN).then(|| word(identify, SMART_SUPPORT_WORD) & 0x0001 != 0)
}

// SMART RETURN STATUS verdict signatures in the LBA mid/high registers.
const SMART_GOOD: (u8, u8) = (0x4F, 0xC2);
const SMART_THRESHOLD_EXCEEDED: (u8, u8) = (0xF4, 0x2C);

/// Decode the health verdict of SMART RETURN STATUS from the sense buffer.
///
/// The SATL reports the returned ATA registers through a status-return
/// descriptor (code 09h) in descriptor-format sense, so CHECK CONDITION is
/// the *success* path here. Returns `Some(true)` for healthy, `Some(false)`
/// for threshold exceeded, `None` when the sense carries no usable verdict.
pub fn ata_smart_return_status_result(sense: &[u8]) -> Option<bool> {
    let desc = descriptor_payload(sense, 0x09)?;
    if desc.len() < 12 {
        return None;
    }
    // Descriptor payload after the code/length header: byte 7 is LBA mid
    // (7:0), byte 9 is LBA high (7:0).
    let lba_mid = desc[7];
    let lba_high = desc[9];
    match (lba_mid, lba_high) {
        SMART_GOOD => Some(true),
        SMART_THRESHOLD_EXCEEDED => Some(false),
        _ => None,
    }
}
