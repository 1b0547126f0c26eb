use crate::ScsiError;

/// Identity fields extracted from a standard INQUIRY response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InquiryData {
    pub device_type: u8,
    pub vendor: String,
    pub model: String,
    pub fw_rev: String,
    pub serial: String,
}

const STANDARD_INQUIRY_MIN_LEN: usize = 36;

fn ascii_field(buf: &[u8]) -> String {
    // INQUIRY identity fields are fixed-width, space padded, and not
    // guaranteed to be printable on broken bridges.
    buf.iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                ' '
            }
        })
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Parse a standard INQUIRY response.
///
/// `buf` must be the valid portion of the response, i.e. the transfer
/// buffer minus the residual. The vendor field keeps its trailing-space
/// padding trimmed; callers that need the verbatim 8-byte vendor (the ATA
/// classification heuristic does) should use [`InquiryData::vendor_padded`].
pub fn parse_inquiry(buf: &[u8]) -> Result<InquiryData, ScsiError> {
    if buf.len() < STANDARD_INQUIRY_MIN_LEN {
        return Err(ScsiError::Truncated(buf.len()));
    }

    let device_type = buf[0] & 0x1F;
    let vendor = ascii_field(&buf[8..16]);
    let model = ascii_field(&buf[16..32]);
    let fw_rev = ascii_field(&buf[32..36]);
    // Bytes 36..44 are the vendor-specific drive serial in the devices this
    // daemon cares about; absent on short responses.
    let serial = if buf.len() >= 44 {
        ascii_field(&buf[36..44])
    } else {
        String::new()
    };

    Ok(InquiryData {
        device_type,
        vendor,
        model,
        fw_rev,
        serial,
    })
}

impl InquiryData {
    /// The vendor field re-padded to its 8-byte wire width. USB/SATA
    /// bridges report the literal `"ATA     "` here and that exact string
    /// is what the classification heuristic matches.
    pub fn vendor_padded(&self) -> String {
        format!("{:<8}", self.vendor)
    }
}
